//! Decryption shares and the operations on them: computation, verification, Lagrange
//! reconstruction of missing shares and combination into plaintext.

use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use super::{DecryptingGuardian, Error};
#[cfg(feature = "serde")]
use crate::serde::ElementHelper;
use crate::{
    group::Group,
    proofs::ProofKind,
    tally::{CiphertextTally, PlaintextContest, PlaintextSelection, PlaintextTally},
    ChaumPedersenProof, DiscreteLogTable, PublicKey,
};

/// Share of a single guardian for a single selection.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct SelectionShare<G: Group> {
    /// Selection ID.
    pub object_id: String,
    /// ID of the guardian the share belongs to.
    pub guardian_id: String,
    /// Partial decryption `M = [s]A`.
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    pub share: G::Element,
    /// Proof of correctness of the share.
    pub proof: ShareProof<G>,
}

/// Proof accompanying a [`SelectionShare`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = "", rename_all = "snake_case"))]
pub enum ShareProof<G: Group> {
    /// Share computed by the guardian itself.
    Direct(ChaumPedersenProof<G>),
    /// Share of a missing guardian reconstructed from compensated shares of available
    /// guardians, keyed by the ID of the compensating guardian.
    Reconstructed(BTreeMap<String, CompensatedSelectionShare<G>>),
}

/// Share of an available guardian computed on behalf of a missing guardian
/// for a single selection.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CompensatedSelectionShare<G: Group> {
    /// Selection ID.
    pub object_id: String,
    /// ID of the compensating guardian.
    pub guardian_id: String,
    /// ID of the missing guardian.
    pub missing_guardian_id: String,
    /// Partial decryption with the backup of the missing guardian.
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    pub share: G::Element,
    /// Public key matching the backup.
    pub recovery_key: PublicKey<G>,
    /// Proof of correctness of the share w.r.t. `recovery_key`.
    pub proof: ChaumPedersenProof<G>,
}

/// Shares of a single guardian for a contest.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct ContestShare<G: Group> {
    /// Contest ID.
    pub object_id: String,
    /// Shares keyed by selection ID.
    pub selections: BTreeMap<String, SelectionShare<G>>,
}

/// Shares of a single guardian for an entire tally or spoiled ballot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct DecryptionShare<G: Group> {
    /// Tally or ballot ID.
    pub object_id: String,
    /// Guardian ID.
    pub guardian_id: String,
    /// Election public key of the guardian.
    pub public_key: PublicKey<G>,
    /// Shares keyed by contest ID.
    pub contests: BTreeMap<String, ContestShare<G>>,
}

/// Compensated shares of a single guardian for a contest.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CompensatedContestShare<G: Group> {
    /// Contest ID.
    pub object_id: String,
    /// Compensated shares keyed by selection ID.
    pub selections: BTreeMap<String, CompensatedSelectionShare<G>>,
}

/// Compensated shares of an available guardian on behalf of a missing guardian
/// for an entire tally or spoiled ballot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct CompensatedDecryptionShare<G: Group> {
    /// Tally or ballot ID.
    pub object_id: String,
    /// ID of the compensating guardian.
    pub guardian_id: String,
    /// ID of the missing guardian.
    pub missing_guardian_id: String,
    /// Recovery public key used in the proofs.
    pub recovery_key: PublicKey<G>,
    /// Compensated shares keyed by contest ID.
    pub contests: BTreeMap<String, CompensatedContestShare<G>>,
}

impl<G: Group> DecryptionShare<G> {
    /// Computes shares of `guardian` for all selections in `record`.
    pub(crate) fn compute(
        guardian: &dyn DecryptingGuardian<G>,
        record: &CiphertextTally<G>,
        extended_base_hash: &G::Scalar,
    ) -> Self {
        let guardian_id = guardian.id();
        let contests = record
            .contests
            .par_iter()
            .map(|(contest_id, contest)| {
                let selections = contest
                    .selections
                    .par_iter()
                    .map(|(selection_id, ciphertext)| {
                        let (share, proof) =
                            guardian.partial_decrypt(ciphertext, extended_base_hash, None);
                        let share = SelectionShare {
                            object_id: selection_id.clone(),
                            guardian_id: guardian_id.to_owned(),
                            share,
                            proof: ShareProof::Direct(proof),
                        };
                        (selection_id.clone(), share)
                    })
                    .collect();
                let contest_share = ContestShare {
                    object_id: contest_id.clone(),
                    selections,
                };
                (contest_id.clone(), contest_share)
            })
            .collect();

        Self {
            object_id: record.object_id.clone(),
            guardian_id: guardian_id.to_owned(),
            public_key: guardian.election_public_key(),
            contests,
        }
    }

    fn selection(
        &self,
        contest_id: &str,
        selection_id: &str,
    ) -> Result<&SelectionShare<G>, Error> {
        self.contests
            .get(contest_id)
            .and_then(|contest| contest.selections.get(selection_id))
            .ok_or_else(|| Error::MissingShare {
                guardian_id: self.guardian_id.clone(),
                contest_id: contest_id.to_owned(),
                selection_id: selection_id.to_owned(),
            })
    }

    /// Verifies direct shares against `public_key` for every selection in `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if a share is missing, is not direct, or its proof does not verify.
    pub fn verify(
        &self,
        record: &CiphertextTally<G>,
        public_key: &PublicKey<G>,
        extended_base_hash: &G::Scalar,
    ) -> Result<(), Error> {
        record.contests.par_iter().try_for_each(|(contest_id, contest)| {
            contest
                .selections
                .par_iter()
                .try_for_each(|(selection_id, ciphertext)| -> Result<(), Error> {
                    let selection = self.selection(contest_id, selection_id)?;
                    let ShareProof::Direct(proof) = &selection.proof else {
                        return Err(Error::MissingShare {
                            guardian_id: self.guardian_id.clone(),
                            contest_id: contest_id.clone(),
                            selection_id: selection_id.clone(),
                        });
                    };
                    proof
                        .verify(
                            ProofKind::Direct,
                            extended_base_hash,
                            public_key,
                            ciphertext,
                            &selection.share,
                        )
                        .map_err(|source| Error::InvalidShare {
                            guardian_id: self.guardian_id.clone(),
                            object_id: record.object_id.clone(),
                            contest_id: contest_id.clone(),
                            selection_id: selection_id.clone(),
                            source,
                        })
                })
        })
    }
}

impl<G: Group> CompensatedDecryptionShare<G> {
    /// Computes compensated shares of `guardian` on behalf of the missing guardian
    /// for all selections in `record`.
    pub(crate) fn compute(
        guardian: &dyn DecryptingGuardian<G>,
        missing_guardian_id: &str,
        record: &CiphertextTally<G>,
        extended_base_hash: &G::Scalar,
    ) -> Result<Self, Error> {
        let guardian_id = guardian.id();
        let recovery_key = guardian.recover_public_key(missing_guardian_id)?;
        let contests = record
            .contests
            .par_iter()
            .map(|(contest_id, contest)| -> Result<_, Error> {
                let selections = contest
                    .selections
                    .par_iter()
                    .map(|(selection_id, ciphertext)| -> Result<_, Error> {
                        let (share, proof) = guardian.compensated_decrypt(
                            missing_guardian_id,
                            ciphertext,
                            extended_base_hash,
                            None,
                        )?;
                        let share = CompensatedSelectionShare {
                            object_id: selection_id.clone(),
                            guardian_id: guardian_id.to_owned(),
                            missing_guardian_id: missing_guardian_id.to_owned(),
                            share,
                            recovery_key: recovery_key.clone(),
                            proof,
                        };
                        Ok((selection_id.clone(), share))
                    })
                    .collect::<Result<BTreeMap<_, _>, Error>>()?;
                let contest_share = CompensatedContestShare {
                    object_id: contest_id.clone(),
                    selections,
                };
                Ok((contest_id.clone(), contest_share))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        Ok(Self {
            object_id: record.object_id.clone(),
            guardian_id: guardian_id.to_owned(),
            missing_guardian_id: missing_guardian_id.to_owned(),
            recovery_key,
            contests,
        })
    }

    fn selection(
        &self,
        contest_id: &str,
        selection_id: &str,
    ) -> Result<&CompensatedSelectionShare<G>, Error> {
        self.contests
            .get(contest_id)
            .and_then(|contest| contest.selections.get(selection_id))
            .ok_or_else(|| Error::MissingShare {
                guardian_id: self.guardian_id.clone(),
                contest_id: contest_id.to_owned(),
                selection_id: selection_id.to_owned(),
            })
    }

    /// Verifies compensated shares for every selection in `record` against
    /// the `expected_recovery_key`, which the verifier computes independently from
    /// public commitments of the missing guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the recovery key differs from the expected one, if a share
    /// is missing, or if its proof does not verify.
    pub fn verify(
        &self,
        record: &CiphertextTally<G>,
        expected_recovery_key: &PublicKey<G>,
        extended_base_hash: &G::Scalar,
    ) -> Result<(), Error> {
        if self.recovery_key != *expected_recovery_key {
            return Err(Error::RecoveryKeyMismatch {
                guardian_id: self.guardian_id.clone(),
                missing_guardian_id: self.missing_guardian_id.clone(),
            });
        }

        record.contests.par_iter().try_for_each(|(contest_id, contest)| {
            contest
                .selections
                .par_iter()
                .try_for_each(|(selection_id, ciphertext)| -> Result<(), Error> {
                    let selection = self.selection(contest_id, selection_id)?;
                    if selection.recovery_key != *expected_recovery_key {
                        return Err(Error::RecoveryKeyMismatch {
                            guardian_id: self.guardian_id.clone(),
                            missing_guardian_id: self.missing_guardian_id.clone(),
                        });
                    }
                    selection
                        .proof
                        .verify(
                            ProofKind::Compensated,
                            extended_base_hash,
                            expected_recovery_key,
                            ciphertext,
                            &selection.share,
                        )
                        .map_err(|source| Error::InvalidCompensatedShare {
                            guardian_id: self.guardian_id.clone(),
                            missing_guardian_id: self.missing_guardian_id.clone(),
                            contest_id: contest_id.clone(),
                            selection_id: selection_id.clone(),
                            source,
                        })
                })
        })
    }
}

/// Reconstructs the share of a missing guardian as `Σ w_l M_l` over compensated shares
/// `M_l` of available guardians with Lagrange coefficients `w_l`.
///
/// `parts` and `lagrange_coefficients` must be keyed by the same guardian IDs.
pub(crate) fn reconstruct_share<G: Group>(
    missing_guardian_id: &str,
    missing_public_key: PublicKey<G>,
    record: &CiphertextTally<G>,
    parts: &BTreeMap<String, CompensatedDecryptionShare<G>>,
    lagrange_coefficients: &BTreeMap<String, G::Scalar>,
) -> Result<DecryptionShare<G>, Error> {
    let coefficients: Vec<_> = parts
        .keys()
        .map(|guardian_id| {
            lagrange_coefficients
                .get(guardian_id)
                .copied()
                .ok_or_else(|| Error::UnknownGuardian(guardian_id.clone()))
        })
        .collect::<Result<_, _>>()?;

    let contests = record
        .contests
        .par_iter()
        .map(|(contest_id, contest)| -> Result<_, Error> {
            let selections = contest
                .selections
                .par_iter()
                .map(|(selection_id, _)| -> Result<_, Error> {
                    let selection_parts: BTreeMap<_, _> = parts
                        .iter()
                        .map(|(guardian_id, part)| -> Result<_, Error> {
                            let selection = part.selection(contest_id, selection_id)?;
                            Ok((guardian_id.clone(), selection.clone()))
                        })
                        .collect::<Result<BTreeMap<_, _>, Error>>()?;
                    let share = G::vartime_multi_mul(
                        &coefficients,
                        selection_parts.values().map(|part| part.share),
                    );
                    let share = SelectionShare {
                        object_id: selection_id.clone(),
                        guardian_id: missing_guardian_id.to_owned(),
                        share,
                        proof: ShareProof::Reconstructed(selection_parts),
                    };
                    Ok((selection_id.clone(), share))
                })
                .collect::<Result<BTreeMap<_, _>, Error>>()?;
            let contest_share = ContestShare {
                object_id: contest_id.clone(),
                selections,
            };
            Ok((contest_id.clone(), contest_share))
        })
        .collect::<Result<BTreeMap<_, _>, Error>>()?;

    Ok(DecryptionShare {
        object_id: record.object_id.clone(),
        guardian_id: missing_guardian_id.to_owned(),
        public_key: missing_public_key,
        contests,
    })
}

/// Combines shares of all `guardian_ids` and decrypts every selection in `record`.
pub(crate) fn decrypt_with_shares<G: Group>(
    record: &CiphertextTally<G>,
    guardian_ids: &[&str],
    shares: &BTreeMap<String, DecryptionShare<G>>,
    lookup_table: &DiscreteLogTable<G>,
) -> Result<PlaintextTally<G>, Error> {
    let contests = record
        .contests
        .par_iter()
        .map(|(contest_id, contest)| -> Result<_, Error> {
            let selections = contest
                .selections
                .par_iter()
                .map(|(selection_id, ciphertext)| -> Result<_, Error> {
                    let selection_shares: Vec<_> = guardian_ids
                        .iter()
                        .map(|&guardian_id| {
                            let share = shares.get(guardian_id).ok_or_else(|| {
                                Error::MissingShare {
                                    guardian_id: guardian_id.to_owned(),
                                    contest_id: contest_id.clone(),
                                    selection_id: selection_id.clone(),
                                }
                            })?;
                            share.selection(contest_id, selection_id).cloned()
                        })
                        .collect::<Result<_, _>>()?;
                    let value =
                        ciphertext.decrypt_with_shares(selection_shares.iter().map(|s| s.share));
                    let tally = lookup_table.get(&value).ok_or_else(|| {
                        Error::UnknownTallyValue {
                            contest_id: contest_id.clone(),
                            selection_id: selection_id.clone(),
                        }
                    })?;
                    let selection = PlaintextSelection {
                        object_id: selection_id.clone(),
                        tally,
                        value,
                        message: *ciphertext,
                        shares: selection_shares,
                    };
                    Ok((selection_id.clone(), selection))
                })
                .collect::<Result<BTreeMap<_, _>, Error>>()?;
            let contest = PlaintextContest {
                object_id: contest_id.clone(),
                selections,
            };
            Ok((contest_id.clone(), contest))
        })
        .collect::<Result<BTreeMap<_, _>, Error>>()?;

    Ok(PlaintextTally {
        object_id: record.object_id.clone(),
        contests,
    })
}
