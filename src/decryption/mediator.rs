//! Mediator collecting decryption shares from guardians.

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use core::fmt;
use std::collections::BTreeMap;

use super::{
    shares::{decrypt_with_shares, reconstruct_share},
    CompensatedDecryptionShare, DecryptingGuardian, DecryptionShare, Error,
};
use crate::{
    group::Group,
    polynomial::lagrange_coefficients,
    tally::{CiphertextTally, PlaintextTally},
    DiscreteLogTable, ElectionContext, GuardianRecord,
};

/// Untrusted party decrypting a tally and spoiled ballots with the help of guardians.
///
/// Guardians [announce](Self::announce()) themselves; for each announced guardian,
/// the mediator immediately computes and verifies its shares for the tally and all spoiled
/// ballots. Once at least a quorum of guardians is available, the tally can be decrypted;
/// shares of missing guardians are reconstructed from compensated shares of available ones.
pub struct DecryptionMediator<'a, G: Group> {
    context: &'a ElectionContext<G>,
    tally: &'a CiphertextTally<G>,
    spoiled_ballots: &'a [CiphertextTally<G>],
    lookup_table: &'a DiscreteLogTable<G>,
    available: BTreeMap<String, &'a dyn DecryptingGuardian<G>>,
    tally_shares: BTreeMap<String, DecryptionShare<G>>,
    /// Direct shares keyed by ballot ID, then by guardian ID.
    ballot_shares: BTreeMap<String, BTreeMap<String, DecryptionShare<G>>>,
    lagrange_coefficients: Option<BTreeMap<String, G::Scalar>>,
}

impl<G: Group> fmt::Debug for DecryptionMediator<'_, G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DecryptionMediator")
            .field("tally", &self.tally.object_id)
            .field("spoiled_ballots", &self.spoiled_ballots.len())
            .field("available", &self.available.keys())
            .finish_non_exhaustive()
    }
}

impl<'a, G: Group> DecryptionMediator<'a, G> {
    /// Creates a mediator for the specified tally and spoiled ballots.
    ///
    /// `lookup_table` must cover all possible counts, e.g. `0..=ballot_count`.
    pub fn new(
        context: &'a ElectionContext<G>,
        tally: &'a CiphertextTally<G>,
        spoiled_ballots: &'a [CiphertextTally<G>],
        lookup_table: &'a DiscreteLogTable<G>,
    ) -> Self {
        Self {
            context,
            tally,
            spoiled_ballots,
            lookup_table,
            available: BTreeMap::new(),
            tally_shares: BTreeMap::new(),
            ballot_shares: BTreeMap::new(),
            lagrange_coefficients: None,
        }
    }

    /// Iterates over IDs of announced guardians.
    pub fn available_guardians(&self) -> impl Iterator<Item = &str> + '_ {
        self.available.keys().map(String::as_str)
    }

    /// Iterates over IDs of guardians that have not announced themselves.
    pub fn missing_guardians(&self) -> impl Iterator<Item = &str> + '_ {
        self.context
            .guardians()
            .map(GuardianRecord::guardian_id)
            .filter(|id| !self.available.contains_key(*id))
    }

    /// Returns verified direct shares of the announced guardians for the tally.
    pub fn tally_shares(&self) -> &BTreeMap<String, DecryptionShare<G>> {
        &self.tally_shares
    }

    /// Announces a guardian. Shares of the guardian for the tally and every spoiled ballot
    /// are computed and verified; if any share fails verification, the announcement
    /// is rejected and the guardian remains missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the guardian is not a part of the election, was already
    /// announced, does not match its public record, or provides an invalid share.
    #[instrument(level = "info", skip_all, err)]
    pub fn announce(&mut self, guardian: &'a dyn DecryptingGuardian<G>) -> Result<(), Error> {
        let guardian_id = guardian.id();
        let record = self
            .context
            .guardian(guardian_id)
            .ok_or_else(|| Error::UnknownGuardian(guardian_id.to_owned()))?;
        if self.available.contains_key(guardian_id) {
            return Err(Error::DuplicateAnnouncement(guardian_id.to_owned()));
        }
        let public_key = record.election_public_key();
        if guardian.x_coordinate() != record.x_coordinate()
            || guardian.election_public_key() != public_key
        {
            return Err(Error::GuardianMismatch(guardian_id.to_owned()));
        }

        let extended_base_hash = self.context.extended_base_hash();
        let tally_share = DecryptionShare::compute(guardian, self.tally, extended_base_hash);
        let ballot_shares = self
            .spoiled_ballots
            .par_iter()
            .map(|ballot| -> Result<_, Error> {
                let share = DecryptionShare::compute(guardian, ballot, extended_base_hash);
                share.verify(ballot, &public_key, extended_base_hash)?;
                Ok((ballot.object_id.clone(), share))
            })
            .collect::<Result<Vec<_>, Error>>();
        let ballot_shares = tally_share
            .verify(self.tally, &public_key, extended_base_hash)
            .and(ballot_shares)
            .map_err(|err| {
                warn!(guardian = guardian_id, %err, "rejected guardian announcement");
                err
            })?;

        self.tally_shares.insert(guardian_id.to_owned(), tally_share);
        for (ballot_id, share) in ballot_shares {
            self.ballot_shares
                .entry(ballot_id)
                .or_default()
                .insert(guardian_id.to_owned(), share);
        }
        self.available.insert(guardian_id.to_owned(), guardian);
        self.lagrange_coefficients = None;
        info!(
            guardian = guardian_id,
            available = self.available.len(),
            quorum = self.context.params().quorum,
            "announced guardian"
        );
        Ok(())
    }

    fn check_quorum(&self) -> Result<(), Error> {
        let quorum = self.context.params().quorum;
        if self.available.len() < quorum {
            return Err(Error::InsufficientGuardians {
                available: self.available.len(),
                quorum,
            });
        }
        Ok(())
    }

    /// Returns Lagrange coefficients at zero for available guardians, caching them until
    /// the next announcement.
    fn lagrange_coefficients(&mut self) -> BTreeMap<String, G::Scalar> {
        let available = &self.available;
        self.lagrange_coefficients
            .get_or_insert_with(|| {
                let coordinates: Vec<_> = available
                    .values()
                    .map(|guardian| guardian.x_coordinate())
                    .collect();
                let coefficients = lagrange_coefficients::<G>(&coordinates);
                available.keys().cloned().zip(coefficients).collect()
            })
            .clone()
    }

    /// Reconstructs the share of a missing guardian for `record` from compensated shares
    /// of all available guardians.
    fn compensate(
        &self,
        missing_guardian_id: &str,
        record: &CiphertextTally<G>,
        lagrange_coefficients: &BTreeMap<String, G::Scalar>,
    ) -> Result<DecryptionShare<G>, Error> {
        let missing_record = self
            .context
            .guardian(missing_guardian_id)
            .ok_or_else(|| Error::UnknownGuardian(missing_guardian_id.to_owned()))?;
        let extended_base_hash = self.context.extended_base_hash();

        let recovery_keys: BTreeMap<_, _> = self
            .available
            .iter()
            .map(|(id, guardian)| {
                let key = missing_record.recovery_public_key(guardian.x_coordinate());
                (id.as_str(), key)
            })
            .collect();
        let interpolated_key = G::vartime_multi_mul(
            lagrange_coefficients.values(),
            recovery_keys.values().map(|key| key.as_element()),
        );
        let missing_public_key = missing_record.election_public_key();
        if interpolated_key != missing_public_key.as_element() {
            return Err(Error::CompensationFailed {
                missing_guardian_id: missing_guardian_id.to_owned(),
            });
        }

        let parts = self
            .available
            .par_iter()
            .map(|(guardian_id, &guardian)| -> Result<_, Error> {
                let share = CompensatedDecryptionShare::compute(
                    guardian,
                    missing_guardian_id,
                    record,
                    extended_base_hash,
                )?;
                let expected_key = &recovery_keys[guardian_id.as_str()];
                share.verify(record, expected_key, extended_base_hash)?;
                Ok((guardian_id.clone(), share))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>()
            .map_err(|err| {
                warn!(
                    missing_guardian = missing_guardian_id,
                    object_id = %record.object_id,
                    %err,
                    "failed to compensate for missing guardian"
                );
                err
            })?;

        reconstruct_share(
            missing_guardian_id,
            missing_public_key,
            record,
            &parts,
            lagrange_coefficients,
        )
    }

    fn decrypt_record(
        &self,
        record: &CiphertextTally<G>,
        direct_shares: Option<&BTreeMap<String, DecryptionShare<G>>>,
        lagrange_coefficients: &BTreeMap<String, G::Scalar>,
    ) -> Result<PlaintextTally<G>, Error> {
        let mut shares = direct_shares.cloned().unwrap_or_default();
        let missing_ids: Vec<_> = self.missing_guardians().collect();
        for missing_id in missing_ids {
            let share = self.compensate(missing_id, record, lagrange_coefficients)?;
            debug!(
                missing_guardian = missing_id,
                object_id = %record.object_id,
                "reconstructed missing share"
            );
            shares.insert(missing_id.to_owned(), share);
        }

        let guardian_ids: Vec<_> = self
            .context
            .guardians()
            .map(GuardianRecord::guardian_id)
            .collect();
        decrypt_with_shares(record, &guardian_ids, &shares, self.lookup_table)
    }

    /// Decrypts the tally.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than a quorum of guardians are available, if compensation
    /// for a missing guardian fails, or if a decrypted value is outside the lookup table.
    #[instrument(level = "info", skip_all, err)]
    pub fn get_plaintext_tally(&mut self) -> Result<PlaintextTally<G>, Error> {
        self.check_quorum()?;
        let lagrange_coefficients = self.lagrange_coefficients();
        let plaintext =
            self.decrypt_record(self.tally, Some(&self.tally_shares), &lagrange_coefficients)?;
        info!(
            object_id = %plaintext.object_id,
            missing = self.missing_guardians().count(),
            "decrypted tally"
        );
        Ok(plaintext)
    }

    /// Decrypts each spoiled ballot independently. A failure to decrypt a ballot
    /// does not influence other ballots.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than a quorum of guardians are available.
    /// Per-ballot errors are returned in the output map keyed by ballot ID.
    #[allow(clippy::type_complexity)]
    pub fn get_plaintext_ballots(
        &mut self,
    ) -> Result<BTreeMap<String, Result<PlaintextTally<G>, Error>>, Error> {
        self.check_quorum()?;
        let lagrange_coefficients = self.lagrange_coefficients();
        let this = &*self;
        let ballots = this
            .spoiled_ballots
            .par_iter()
            .map(|ballot| {
                let shares = this.ballot_shares.get(&ballot.object_id);
                let plaintext = this.decrypt_record(ballot, shares, &lagrange_coefficients);
                (ballot.object_id.clone(), plaintext)
            })
            .collect();
        Ok(ballots)
    }

    /// Decrypts spoiled ballots, returning the successfully decrypted ones ordered
    /// by ballot ID. Ballots that failed to decrypt are logged.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than a quorum of guardians are available.
    #[instrument(level = "info", skip_all, err)]
    pub fn decrypt_spoiled_ballots(&mut self) -> Result<Vec<PlaintextTally<G>>, Error> {
        let ballots = self.get_plaintext_ballots()?;
        let total = ballots.len();
        let decrypted: Vec<_> = ballots
            .into_iter()
            .filter_map(|(ballot_id, result)| match result {
                Ok(plaintext) => Some(plaintext),
                Err(err) => {
                    warn!(ballot_id = %ballot_id, %err, "failed to decrypt spoiled ballot");
                    None
                }
            })
            .collect();
        info!(total, decrypted = decrypted.len(), "decrypted spoiled ballots");
        Ok(decrypted)
    }
}
