//! Mediator relaying messages among guardians during the key ceremony.

use tracing::{error, info, instrument, warn};

use std::collections::{BTreeMap, BTreeSet};

use super::{
    verify_challenge_response, Error, KeyCeremonyGuardian, Params, PartialKeyVerification,
    PublicKeySet,
};
use crate::{group::Group, ElectionContext, GuardianRecord};

/// Untrusted party running the key ceremony among guardians.
///
/// The mediator only sees public data: public key sets, encrypted backups, verification
/// results and (for challenged backups) the revealed backup values.
pub struct KeyCeremonyMediator<'a, G: Group> {
    params: Params,
    guardians: Vec<Box<dyn KeyCeremonyGuardian<G> + 'a>>,
    public_key_sets: BTreeMap<String, PublicKeySet<G>>,
    verifications: Vec<PartialKeyVerification>,
}

impl<G: Group> core::fmt::Debug for KeyCeremonyMediator<'_, G> {
    fn fmt(&self, formatter: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        formatter
            .debug_struct("KeyCeremonyMediator")
            .field("params", &self.params)
            .field("guardians", &self.guardian_ids())
            .field("public_key_sets", &self.public_key_sets.keys())
            .field("verifications", &self.verifications)
            .finish()
    }
}

impl<'a, G: Group> KeyCeremonyMediator<'a, G> {
    /// Creates a mediator for the specified guardians.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of guardians differs from `params`, if guardian IDs
    /// or coordinates are not unique, or if a guardian uses another quorum.
    pub fn new(
        params: Params,
        guardians: Vec<Box<dyn KeyCeremonyGuardian<G> + 'a>>,
    ) -> Result<Self, Error> {
        Params::try_new(params.guardians, params.quorum)?;
        if guardians.len() != params.guardians {
            return Err(Error::GuardianCountMismatch {
                expected: params.guardians,
                actual: guardians.len(),
            });
        }

        let mut ids = BTreeSet::new();
        let mut coordinates = BTreeSet::new();
        for guardian in &guardians {
            if !ids.insert(guardian.id()) {
                return Err(Error::DuplicateGuardian(guardian.id().to_owned()));
            }
            if !coordinates.insert(guardian.x_coordinate()) {
                return Err(Error::DuplicateCoordinate(guardian.x_coordinate()));
            }
            if guardian.quorum() != params.quorum {
                return Err(Error::QuorumMismatch {
                    guardian_id: guardian.id().to_owned(),
                    expected: params.quorum,
                    actual: guardian.quorum(),
                });
            }
        }

        Ok(Self {
            params,
            guardians,
            public_key_sets: BTreeMap::new(),
            verifications: Vec::new(),
        })
    }

    fn guardian_ids(&self) -> Vec<&str> {
        self.guardians.iter().map(|guardian| guardian.id()).collect()
    }

    /// Returns verifications of all backups collected during the ceremony, including
    /// the verifications of challenge responses.
    pub fn verifications(&self) -> &[PartialKeyVerification] {
        &self.verifications
    }

    /// Round 1: collects public keys from every guardian, checks them and distributes
    /// them to all other guardians.
    fn exchange_public_keys(&mut self) -> Result<(), Error> {
        for guardian in &self.guardians {
            let keys = guardian.send_public_keys();
            let is_consistent = keys.owner_id() == guardian.id()
                && keys.x_coordinate() == guardian.x_coordinate();
            if !is_consistent {
                error!(
                    guardian = guardian.id(),
                    "guardian announced keys of another guardian"
                );
                return Err(Error::UnknownGuardian(keys.owner_id().to_owned()));
            }
            keys.verify(self.params.quorum)?;
            self.public_key_sets.insert(keys.owner_id().to_owned(), keys);
        }

        for guardian in &mut self.guardians {
            for (owner_id, keys) in &self.public_key_sets {
                if owner_id != guardian.id() {
                    guardian.receive_public_keys(keys.clone())?;
                }
            }
        }
        info!(guardians = self.guardians.len(), "public keys exchanged");
        Ok(())
    }

    /// Rounds 2 and 3: relays a backup between every ordered pair of guardians
    /// and collects verifications. Returns failed verifications.
    fn exchange_backups(&mut self) -> Result<Vec<PartialKeyVerification>, Error> {
        let mut failures = vec![];
        let guardian_count = self.guardians.len();
        for generating in 0..guardian_count {
            for designated in 0..guardian_count {
                if generating == designated {
                    continue;
                }
                let designated_id = self.guardians[designated].id().to_owned();
                let backup = self.guardians[generating].send_partial_key_backup(&designated_id)?;
                if backup.designated_guardian_id != designated_id
                    || backup.generating_guardian_id != self.guardians[generating].id()
                {
                    return Err(Error::WrongRecipient {
                        expected: designated_id,
                        actual: backup.designated_guardian_id,
                    });
                }

                let verification =
                    self.guardians[designated].verify_partial_key_backup(&backup)?;
                if !verification.verified {
                    warn!(
                        generating = %verification.generating_guardian_id,
                        designated = %verification.designated_guardian_id,
                        error = verification.error.as_deref().unwrap_or_default(),
                        "backup verification failed"
                    );
                    failures.push(verification.clone());
                }
                self.verifications.push(verification);
            }
        }
        Ok(failures)
    }

    /// Round 4: challenges each failed backup. The generating guardian must reveal
    /// the backup value; if it does not check out, the ceremony is aborted.
    fn resolve_challenges(&mut self, failures: &[PartialKeyVerification]) -> Result<(), Error> {
        for failure in failures {
            let challenge_failed = || Error::ChallengeFailed {
                generating_guardian_id: failure.generating_guardian_id.clone(),
                designated_guardian_id: failure.designated_guardian_id.clone(),
            };

            let generating = self.guardian_index(&failure.generating_guardian_id)?;
            let response = self.guardians[generating]
                .send_backup_challenge(&failure.designated_guardian_id)?;
            let keys = &self.public_key_sets[&failure.generating_guardian_id];
            let verification = verify_challenge_response("mediator", &response, keys);
            if !verification.verified
                || response.designated_guardian_id != failure.designated_guardian_id
            {
                error!(
                    generating = %failure.generating_guardian_id,
                    designated = %failure.designated_guardian_id,
                    "challenge response does not verify"
                );
                return Err(challenge_failed());
            }

            let designated = self.guardian_index(&failure.designated_guardian_id)?;
            let designated_verification =
                self.guardians[designated].receive_challenge_response(&response)?;
            if !designated_verification.verified {
                return Err(challenge_failed());
            }
            info!(
                generating = %failure.generating_guardian_id,
                designated = %failure.designated_guardian_id,
                "challenge resolved in favor of generating guardian"
            );
            self.verifications.push(verification);
        }
        Ok(())
    }

    fn guardian_index(&self, id: &str) -> Result<usize, Error> {
        self.guardians
            .iter()
            .position(|guardian| guardian.id() == id)
            .ok_or_else(|| Error::UnknownGuardian(id.to_owned()))
    }

    /// Runs the entire ceremony and returns the public election context.
    ///
    /// `manifest_hash` is the hash of the election manifest; it is bound into
    /// the extended base hash of the context.
    ///
    /// # Errors
    ///
    /// Returns an error if any guardian misbehaves in a way that cannot be resolved
    /// via challenges, or if guardians disagree on the joint public key.
    #[instrument(level = "info", skip_all, err)]
    pub fn run(&mut self, manifest_hash: &[u8]) -> Result<ElectionContext<G>, Error> {
        self.exchange_public_keys()?;
        let failures = self.exchange_backups()?;
        if !failures.is_empty() {
            warn!(count = failures.len(), "challenging failed backups");
        }
        self.resolve_challenges(&failures)?;

        let mut joint_key = None;
        for guardian in &self.guardians {
            let key = guardian.send_joint_public_key()?;
            match &joint_key {
                None => joint_key = Some(key),
                Some(expected) if *expected == key => {}
                Some(_) => {
                    error!(guardian = guardian.id(), "joint public key mismatch");
                    return Err(Error::JointKeyMismatch {
                        guardian_id: guardian.id().to_owned(),
                    });
                }
            }
        }

        let records = self.public_key_sets.values().map(GuardianRecord::from);
        let context = ElectionContext::new(self.params, records, manifest_hash)?;
        if joint_key.as_ref() != Some(context.joint_public_key()) {
            return Err(Error::JointKeyMismatch {
                guardian_id: self.guardians[0].id().to_owned(),
            });
        }
        info!(
            guardians = self.params.guardians,
            quorum = self.params.quorum,
            "key ceremony completed"
        );
        Ok(context)
    }
}
