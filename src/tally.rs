//! Encrypted ballots and tallies, and their decrypted counterparts.

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use crate::serde::ElementHelper;
use crate::{decryption::SelectionShare, group::Group, Ciphertext};

/// Encrypted contest: selection ciphertexts keyed by selection ID.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CiphertextContest<G: Group> {
    /// Contest ID.
    pub object_id: String,
    /// Encrypted selections keyed by selection ID.
    pub selections: BTreeMap<String, Ciphertext<G>>,
}

impl<G: Group> CiphertextContest<G> {
    fn zero(object_id: String, selection_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            object_id,
            selections: selection_ids
                .into_iter()
                .map(|id| (id, Ciphertext::zero()))
                .collect(),
        }
    }
}

/// Encrypted tally: contests keyed by contest ID. Also used for individual
/// spoiled ballots, which are decrypted the same way as the tally.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CiphertextTally<G: Group> {
    /// Tally ID (or ballot ID for spoiled ballots).
    pub object_id: String,
    /// Encrypted contests keyed by contest ID.
    pub contests: BTreeMap<String, CiphertextContest<G>>,
}

impl<G: Group> CiphertextTally<G> {
    /// Returns the number of selections in all contests.
    pub fn selection_count(&self) -> usize {
        self.contests
            .values()
            .map(|contest| contest.selections.len())
            .sum()
    }
}

/// State of a submitted ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BallotState {
    /// Ballot is counted in the tally.
    Cast,
    /// Ballot is not counted; it is decrypted individually and published.
    Spoiled,
}

/// Submitted encrypted ballot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CiphertextBallot<G: Group> {
    /// Ballot ID.
    pub object_id: String,
    /// Ballot state.
    pub state: BallotState,
    /// Encrypted contests keyed by contest ID.
    pub contests: BTreeMap<String, CiphertextContest<G>>,
}

impl<G: Group> CiphertextBallot<G> {
    /// Converts this ballot into a tally-shaped record.
    pub fn into_tally(self) -> CiphertextTally<G> {
        CiphertextTally {
            object_id: self.object_id,
            contests: self.contests,
        }
    }
}

/// Errors that can occur when accumulating ballots into a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Ballot with the same ID was already appended.
    DuplicateBallot(String),
    /// Ballot contains a contest not present in the tally.
    UnknownContest {
        /// Ballot ID.
        ballot_id: String,
        /// Contest ID.
        contest_id: String,
    },
    /// Ballot contest has selections differing from the tally contest.
    SelectionMismatch {
        /// Ballot ID.
        ballot_id: String,
        /// Contest ID.
        contest_id: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateBallot(id) => write!(formatter, "ballot `{id}` is already appended"),
            Self::UnknownContest {
                ballot_id,
                contest_id,
            } => write!(
                formatter,
                "ballot `{ballot_id}` contains unknown contest `{contest_id}`"
            ),
            Self::SelectionMismatch {
                ballot_id,
                contest_id,
            } => write!(
                formatter,
                "selections of contest `{contest_id}` in ballot `{ballot_id}` do not match \
                 the tally"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Accumulates cast ballots into a [`CiphertextTally`] and sets aside spoiled ones.
#[derive(Debug)]
pub struct TallyBuilder<G: Group> {
    tally: CiphertextTally<G>,
    cast_ballot_ids: BTreeSet<String>,
    spoiled_ballots: BTreeMap<String, CiphertextTally<G>>,
}

impl<G: Group> TallyBuilder<G> {
    /// Creates a builder for the tally with the specified ID and shape: contest IDs
    /// together with selection IDs in each contest.
    pub fn new<C, S>(object_id: impl Into<String>, contests: C) -> Self
    where
        C: IntoIterator<Item = (String, S)>,
        S: IntoIterator<Item = String>,
    {
        let contests = contests
            .into_iter()
            .map(|(contest_id, selection_ids)| {
                let contest = CiphertextContest::zero(contest_id.clone(), selection_ids);
                (contest_id, contest)
            })
            .collect();
        Self {
            tally: CiphertextTally {
                object_id: object_id.into(),
                contests,
            },
            cast_ballot_ids: BTreeSet::new(),
            spoiled_ballots: BTreeMap::new(),
        }
    }

    /// Returns the number of cast ballots accumulated so far.
    pub fn cast_count(&self) -> usize {
        self.cast_ballot_ids.len()
    }

    /// Returns the number of spoiled ballots set aside so far.
    pub fn spoiled_count(&self) -> usize {
        self.spoiled_ballots.len()
    }

    fn contains(&self, ballot_id: &str) -> bool {
        self.cast_ballot_ids.contains(ballot_id) || self.spoiled_ballots.contains_key(ballot_id)
    }

    fn check_shape(&self, ballot: &CiphertextBallot<G>) -> Result<(), Error> {
        for (contest_id, contest) in &ballot.contests {
            let tally_contest = self.tally.contests.get(contest_id).ok_or_else(|| {
                Error::UnknownContest {
                    ballot_id: ballot.object_id.clone(),
                    contest_id: contest_id.clone(),
                }
            })?;
            let selections_match = contest.selections.len() == tally_contest.selections.len()
                && contest
                    .selections
                    .keys()
                    .all(|id| tally_contest.selections.contains_key(id));
            if !selections_match {
                return Err(Error::SelectionMismatch {
                    ballot_id: ballot.object_id.clone(),
                    contest_id: contest_id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check(&self, ballot: &CiphertextBallot<G>) -> Result<(), Error> {
        if self.contains(&ballot.object_id) {
            return Err(Error::DuplicateBallot(ballot.object_id.clone()));
        }
        self.check_shape(ballot)
    }

    /// Appends a single ballot. Cast ballots are added to the tally homomorphically;
    /// spoiled ballots are set aside for individual decryption.
    ///
    /// # Errors
    ///
    /// Returns an error if a ballot with the same ID was already appended, or if the ballot
    /// does not fit the tally shape.
    pub fn append(&mut self, ballot: CiphertextBallot<G>) -> Result<(), Error> {
        self.check(&ballot)?;
        match ballot.state {
            BallotState::Cast => {
                for (contest_id, contest) in &ballot.contests {
                    let tally_contest = self
                        .tally
                        .contests
                        .get_mut(contest_id)
                        .ok_or_else(|| Error::UnknownContest {
                            ballot_id: ballot.object_id.clone(),
                            contest_id: contest_id.clone(),
                        })?;
                    for (selection_id, ciphertext) in &contest.selections {
                        if let Some(total) = tally_contest.selections.get_mut(selection_id) {
                            *total += *ciphertext;
                        }
                    }
                }
                self.cast_ballot_ids.insert(ballot.object_id);
            }
            BallotState::Spoiled => {
                self.spoiled_ballots
                    .insert(ballot.object_id.clone(), ballot.into_tally());
            }
        }
        Ok(())
    }

    /// Appends a batch of ballots. Ballots that are duplicated or do not fit the tally shape
    /// are skipped; other ballots are accumulated in parallel across selections.
    ///
    /// Returns the number of appended ballots.
    pub fn batch_append<I>(&mut self, ballots: I) -> usize
    where
        I: IntoIterator<Item = CiphertextBallot<G>>,
    {
        let mut cast = vec![];
        let mut batch_ids = BTreeSet::new();
        let mut appended = 0;
        for ballot in ballots {
            if let Err(err) = self.check(&ballot) {
                warn!(%err, "skipping ballot");
                continue;
            }
            if !batch_ids.insert(ballot.object_id.clone()) {
                warn!(ballot_id = %ballot.object_id, "skipping ballot duplicated in batch");
                continue;
            }
            appended += 1;
            match ballot.state {
                BallotState::Cast => cast.push(ballot),
                BallotState::Spoiled => {
                    self.spoiled_ballots
                        .insert(ballot.object_id.clone(), ballot.into_tally());
                }
            }
        }

        self.tally
            .contests
            .par_iter_mut()
            .for_each(|(contest_id, contest)| {
                contest
                    .selections
                    .par_iter_mut()
                    .for_each(|(selection_id, total)| {
                        let sum: Ciphertext<G> = cast
                            .iter()
                            .filter_map(|ballot| ballot.contests.get(contest_id))
                            .filter_map(|contest| contest.selections.get(selection_id))
                            .copied()
                            .sum();
                        *total += sum;
                    });
            });
        self.cast_ballot_ids
            .extend(cast.into_iter().map(|ballot| ballot.object_id));
        debug!(appended, "appended ballot batch");
        appended
    }

    /// Finishes accumulation, returning the tally of cast ballots and spoiled ballots
    /// in the tally shape, ordered by ballot ID.
    pub fn build(self) -> (CiphertextTally<G>, Vec<CiphertextTally<G>>) {
        (self.tally, self.spoiled_ballots.into_values().collect())
    }
}

/// Decrypted selection together with the shares it was decrypted with.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct PlaintextSelection<G: Group> {
    /// Selection ID.
    pub object_id: String,
    /// Decrypted count.
    pub tally: u64,
    /// Decrypted group element, `[tally]G`.
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    pub value: G::Element,
    /// Ciphertext that was decrypted.
    pub message: Ciphertext<G>,
    /// Shares of all guardians, ordered by guardian ID.
    pub shares: Vec<SelectionShare<G>>,
}

/// Decrypted contest.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct PlaintextContest<G: Group> {
    /// Contest ID.
    pub object_id: String,
    /// Decrypted selections keyed by selection ID.
    pub selections: BTreeMap<String, PlaintextSelection<G>>,
}

/// Decrypted tally or spoiled ballot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct PlaintextTally<G: Group> {
    /// Tally or ballot ID.
    pub object_id: String,
    /// Decrypted contests keyed by contest ID.
    pub contests: BTreeMap<String, PlaintextContest<G>>,
}

impl<G: Group> PlaintextTally<G> {
    /// Returns the decrypted count for the specified selection.
    pub fn count(&self, contest_id: &str, selection_id: &str) -> Option<u64> {
        let selection = self.contests.get(contest_id)?.selections.get(selection_id)?;
        Some(selection.tally)
    }
}
