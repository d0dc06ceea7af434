//! Guardian state during the key ceremony.

use rand_chacha::ChaChaRng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use tracing::{debug, instrument, warn};

use core::fmt;
use std::collections::BTreeMap;

use super::{
    check_coordinate, verify_challenge_response, Error, Params, PartialKeyBackup,
    PartialKeyChallengeResponse, PartialKeyVerification, PublicKeySet,
};
use crate::{
    auxiliary::{AuxiliaryEncryption, AuxiliaryRegistry, HashedElGamal},
    decryption::DecryptingTrustee,
    group::{scalar_to_bytes, Group},
    polynomial::{verify_point, ElectionPolynomial},
    Keypair, PublicKey, SecretKey,
};

/// Guardian participating in the key ceremony.
///
/// The trustee owns the guardian's secrets: the election polynomial and the auxiliary
/// secret key. Other parties interact with it via [`KeyCeremonyGuardian`] methods
/// (see [`KeyCeremonyTrusteeProxy`]), which never expose these secrets.
///
/// [`KeyCeremonyGuardian`]: super::KeyCeremonyGuardian
/// [`KeyCeremonyTrusteeProxy`]: super::KeyCeremonyTrusteeProxy
pub struct KeyCeremonyTrustee<G: Group> {
    id: String,
    x_coordinate: u32,
    params: Params,
    polynomial: ElectionPolynomial<G>,
    auxiliary_keypair: Keypair<G>,
    auxiliary_scheme: Box<dyn AuxiliaryEncryption<G>>,
    registry: AuxiliaryRegistry<G>,
    rng: ChaChaRng,
    // Public keys of all guardians including this one, keyed by guardian ID.
    public_key_sets: BTreeMap<String, PublicKeySet<G>>,
    sent_backups: BTreeMap<String, PartialKeyBackup>,
    // Verified backups designated for this guardian, keyed by the generating guardian ID.
    received_backups: BTreeMap<String, PartialKeyBackup>,
}

impl<G: Group> fmt::Debug for KeyCeremonyTrustee<G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KeyCeremonyTrustee")
            .field("id", &self.id)
            .field("x_coordinate", &self.x_coordinate)
            .field("params", &self.params)
            .field("auxiliary_public_key", self.auxiliary_keypair.public())
            .field("auxiliary_scheme", &self.auxiliary_scheme.name())
            .field("known_guardians", &self.public_key_sets.keys())
            .field("received_backups", &self.received_backups.keys())
            .finish_non_exhaustive()
    }
}

impl<G: Group> KeyCeremonyTrustee<G> {
    /// Creates a trustee with a random polynomial and the [`HashedElGamal`] auxiliary scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if `x_coordinate` is outside `1..256`, or if `params` are invalid.
    pub fn new<R: CryptoRng + RngCore>(
        id: impl Into<String>,
        x_coordinate: u32,
        params: Params,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let params = Params::try_new(params.guardians, params.quorum)?;
        let polynomial = ElectionPolynomial::generate(params.quorum, rng);
        Self::with_polynomial(id, x_coordinate, params, polynomial, rng)
    }

    /// Creates a trustee with the specified polynomial, e.g. one obtained with
    /// [`ElectionPolynomial::from_seed()`].
    ///
    /// # Errors
    ///
    /// Returns an error if `x_coordinate` is outside `1..256`, or if the polynomial size
    /// does not match the quorum.
    pub fn with_polynomial<R: CryptoRng + RngCore>(
        id: impl Into<String>,
        x_coordinate: u32,
        params: Params,
        polynomial: ElectionPolynomial<G>,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let registry = AuxiliaryRegistry::with_builtin();
        Self::from_parts(
            id.into(),
            x_coordinate,
            params,
            polynomial,
            registry,
            HashedElGamal::NAME,
            rng,
        )
    }

    /// Creates a trustee with a random polynomial and the auxiliary scheme registered
    /// in `registry` under `scheme_name`. The registry is also used to encrypt backups
    /// for guardians announcing other schemes.
    ///
    /// # Errors
    ///
    /// Returns an error if `x_coordinate` is outside `1..256`, or if `scheme_name` is not
    /// registered.
    pub fn with_auxiliary_scheme<R: CryptoRng + RngCore>(
        id: impl Into<String>,
        x_coordinate: u32,
        params: Params,
        registry: AuxiliaryRegistry<G>,
        scheme_name: &str,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let params = Params::try_new(params.guardians, params.quorum)?;
        let polynomial = ElectionPolynomial::generate(params.quorum, rng);
        Self::from_parts(
            id.into(),
            x_coordinate,
            params,
            polynomial,
            registry,
            scheme_name,
            rng,
        )
    }

    fn from_parts<R: CryptoRng + RngCore>(
        id: String,
        x_coordinate: u32,
        params: Params,
        polynomial: ElectionPolynomial<G>,
        registry: AuxiliaryRegistry<G>,
        scheme_name: &str,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let params = Params::try_new(params.guardians, params.quorum)?;
        check_coordinate(x_coordinate)?;
        if polynomial.quorum() != params.quorum {
            return Err(Error::QuorumMismatch {
                guardian_id: id,
                expected: params.quorum,
                actual: polynomial.quorum(),
            });
        }
        let auxiliary_scheme = registry.create(scheme_name)?;
        let auxiliary_keypair = Keypair::generate(rng);
        let mut seed = <ChaChaRng as SeedableRng>::Seed::default();
        rng.fill_bytes(&mut seed);

        let mut this = Self {
            id,
            x_coordinate,
            params,
            polynomial,
            auxiliary_keypair,
            auxiliary_scheme,
            registry,
            rng: ChaChaRng::from_seed(seed),
            public_key_sets: BTreeMap::new(),
            sent_backups: BTreeMap::new(),
            received_backups: BTreeMap::new(),
        };
        let own_keys = this.share_public_keys();
        this.public_key_sets.insert(this.id.clone(), own_keys);
        Ok(this)
    }

    /// Returns the guardian ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the guardian coordinate.
    pub fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    /// Returns ceremony parameters.
    pub fn params(&self) -> Params {
        self.params
    }

    /// Returns the election public key of this guardian.
    pub fn election_public_key(&self) -> PublicKey<G> {
        self.polynomial.election_public_key()
    }

    /// Returns public keys of this guardian.
    pub fn share_public_keys(&self) -> PublicKeySet<G> {
        PublicKeySet::new(
            self.id.clone(),
            self.x_coordinate,
            self.auxiliary_keypair.public().clone(),
            self.auxiliary_scheme.name().to_owned(),
            self.polynomial.coefficient_commitments().to_vec(),
            self.polynomial.coefficient_proofs().to_vec(),
        )
    }

    /// Returns IDs of guardians whose public keys are known to this trustee,
    /// including its own ID.
    pub fn known_guardians(&self) -> impl Iterator<Item = &str> + '_ {
        self.public_key_sets.keys().map(String::as_str)
    }

    /// Checks whether public keys of all guardians were received.
    pub fn all_public_keys_received(&self) -> bool {
        self.public_key_sets.len() == self.params.guardians
    }

    /// Checks whether verified backups from all other guardians were received.
    pub fn all_backups_received(&self) -> bool {
        self.received_backups.len() + 1 == self.params.guardians
    }

    /// Verifies and stores public keys of another guardian. Receiving keys of the same
    /// guardian again replaces the previous keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys are this guardian's own, are not valid, clash
    /// with the coordinate of another guardian, or exceed the number of guardians.
    #[instrument(
        level = "debug",
        skip_all,
        err,
        fields(guardian = %self.id, owner = %keys.owner_id())
    )]
    pub fn receive_public_keys(&mut self, keys: PublicKeySet<G>) -> Result<(), Error> {
        let owner_id = keys.owner_id();
        if owner_id == self.id {
            return Err(Error::SelfAddressed(self.id.clone()));
        }
        keys.verify(self.params.quorum)?;
        let coordinate_clash = self.public_key_sets.values().any(|other| {
            other.owner_id() != owner_id && other.x_coordinate() == keys.x_coordinate()
        });
        if coordinate_clash {
            return Err(Error::DuplicateCoordinate(keys.x_coordinate()));
        }
        if !self.public_key_sets.contains_key(owner_id) && self.all_public_keys_received() {
            return Err(Error::GuardianCountMismatch {
                expected: self.params.guardians,
                actual: self.params.guardians + 1,
            });
        }

        debug!(x_coordinate = keys.x_coordinate(), "received public keys");
        self.public_key_sets.insert(owner_id.to_owned(), keys);
        Ok(())
    }

    /// Creates a backup of this guardian's polynomial for the designated guardian.
    /// Repeated calls for the same guardian return the same backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the designated guardian is this guardian, is unknown,
    /// or announced an unknown auxiliary scheme.
    pub fn send_partial_key_backup(
        &mut self,
        designated_id: &str,
    ) -> Result<PartialKeyBackup, Error> {
        if designated_id == self.id {
            return Err(Error::SelfAddressed(self.id.clone()));
        }
        if let Some(backup) = self.sent_backups.get(designated_id) {
            return Ok(backup.clone());
        }
        let recipient = self
            .public_key_sets
            .get(designated_id)
            .ok_or_else(|| Error::UnknownGuardian(designated_id.to_owned()))?;

        let scheme = self.registry.create(recipient.auxiliary_scheme())?;
        let value = self.polynomial.evaluate(recipient.x_coordinate());
        let plaintext = zeroize::Zeroizing::new(scalar_to_bytes::<G>(value.expose_scalar()));
        let encrypted_coordinate =
            scheme.encrypt(&plaintext, recipient.auxiliary_public_key(), &mut self.rng);

        let backup = PartialKeyBackup {
            generating_guardian_id: self.id.clone(),
            designated_guardian_id: designated_id.to_owned(),
            designated_x_coordinate: recipient.x_coordinate(),
            encrypted_coordinate,
        };
        debug!(guardian = %self.id, designated = designated_id, "created backup");
        self.sent_backups
            .insert(designated_id.to_owned(), backup.clone());
        Ok(backup)
    }

    fn decrypt_backup(&self, backup: &PartialKeyBackup) -> Result<SecretKey<G>, &'static str> {
        let bytes = self
            .auxiliary_scheme
            .decrypt(&backup.encrypted_coordinate, self.auxiliary_keypair.secret())
            .ok_or("backup cannot be decrypted")?;
        let bytes = zeroize::Zeroizing::new(bytes);
        SecretKey::from_bytes(&bytes).ok_or("backup does not contain a scalar")
    }

    /// Decrypts a backup designated for this guardian and checks it against the commitments
    /// of the generating guardian. A backup that checks out is stored for the decryption
    /// phase.
    ///
    /// Cryptographic failures are reported in the returned verification rather than
    /// as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup is designated for another guardian, or if public keys
    /// of the generating guardian were not received.
    pub fn verify_partial_key_backup(
        &mut self,
        backup: &PartialKeyBackup,
    ) -> Result<PartialKeyVerification, Error> {
        if backup.designated_guardian_id != self.id {
            return Err(Error::WrongRecipient {
                expected: backup.designated_guardian_id.clone(),
                actual: self.id.clone(),
            });
        }
        let generating_id = backup.generating_guardian_id.as_str();
        let generator_keys = self.public_key_sets.get(generating_id).ok_or_else(|| {
            Error::MissingPublicKeys {
                guardian_id: generating_id.to_owned(),
            }
        })?;

        let check = self.decrypt_backup(backup).and_then(|value| {
            if backup.designated_x_coordinate != self.x_coordinate {
                Err("backup is made for another coordinate")
            } else if verify_point(
                &value,
                self.x_coordinate,
                generator_keys.coefficient_commitments(),
            ) {
                Ok(())
            } else {
                Err("backup value does not match commitments")
            }
        });

        Ok(match check {
            Ok(()) => {
                self.received_backups
                    .insert(generating_id.to_owned(), backup.clone());
                PartialKeyVerification::success(generating_id, &self.id, &self.id)
            }
            Err(reason) => {
                warn!(
                    guardian = %self.id,
                    generating = generating_id,
                    reason,
                    "backup failed verification"
                );
                PartialKeyVerification::failure(generating_id, &self.id, &self.id, reason)
            }
        })
    }

    /// Reveals the value of this guardian's polynomial at the coordinate of the designated
    /// guardian in response to a challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the designated guardian is this guardian or is unknown.
    pub fn send_backup_challenge(
        &self,
        designated_id: &str,
    ) -> Result<PartialKeyChallengeResponse<G>, Error> {
        if designated_id == self.id {
            return Err(Error::SelfAddressed(self.id.clone()));
        }
        let designated = self
            .public_key_sets
            .get(designated_id)
            .ok_or_else(|| Error::UnknownGuardian(designated_id.to_owned()))?;
        let x_coordinate = designated.x_coordinate();
        Ok(PartialKeyChallengeResponse {
            generating_guardian_id: self.id.clone(),
            designated_guardian_id: designated_id.to_owned(),
            designated_x_coordinate: x_coordinate,
            coordinate: *self.polynomial.evaluate(x_coordinate).expose_scalar(),
            coefficient_commitments: self.polynomial.coefficient_commitments().to_vec(),
        })
    }

    /// Accepts a publicly revealed backup for this guardian after a challenge.
    /// If the response checks out, it replaces the backup from the generating guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is designated for another guardian, or if public
    /// keys of the generating guardian were not received.
    pub fn receive_challenge_response(
        &mut self,
        response: &PartialKeyChallengeResponse<G>,
    ) -> Result<PartialKeyVerification, Error> {
        if response.designated_guardian_id != self.id {
            return Err(Error::WrongRecipient {
                expected: response.designated_guardian_id.clone(),
                actual: self.id.clone(),
            });
        }
        let generating_id = response.generating_guardian_id.as_str();
        let generator_keys = self.public_key_sets.get(generating_id).ok_or_else(|| {
            Error::MissingPublicKeys {
                guardian_id: generating_id.to_owned(),
            }
        })?;

        let mut verification = verify_challenge_response(&self.id, response, generator_keys);
        if verification.verified && response.designated_x_coordinate != self.x_coordinate {
            verification = PartialKeyVerification::failure(
                generating_id,
                &self.id,
                &self.id,
                "response is made for another coordinate",
            );
        }
        if verification.verified {
            // Re-encrypt the revealed value for ourselves so that all backups are stored
            // uniformly.
            let plaintext = zeroize::Zeroizing::new(scalar_to_bytes::<G>(&response.coordinate));
            let encrypted_coordinate = self.auxiliary_scheme.encrypt(
                &plaintext,
                self.auxiliary_keypair.public(),
                &mut self.rng,
            );
            let backup = PartialKeyBackup {
                generating_guardian_id: generating_id.to_owned(),
                designated_guardian_id: self.id.clone(),
                designated_x_coordinate: self.x_coordinate,
                encrypted_coordinate,
            };
            self.received_backups.insert(generating_id.to_owned(), backup);
        }
        Ok(verification)
    }

    /// Computes the joint public key from the election public keys of all guardians.
    ///
    /// # Errors
    ///
    /// Returns an error if public keys of some guardians were not received.
    pub fn publish_joint_key(&self) -> Result<PublicKey<G>, Error> {
        if !self.all_public_keys_received() {
            return Err(Error::GuardianCountMismatch {
                expected: self.params.guardians,
                actual: self.public_key_sets.len(),
            });
        }
        let keys: Vec<_> = self
            .public_key_sets
            .values()
            .map(PublicKeySet::election_public_key)
            .collect();
        PublicKey::combine(&keys).ok_or(Error::DegenerateJointKey)
    }

    /// Finishes the ceremony for this guardian, transforming it into a trustee able
    /// to decrypt tallies.
    ///
    /// # Errors
    ///
    /// Returns an error if public keys of some guardian or verified backups from some
    /// guardian were not received.
    pub fn into_decrypting_trustee(self) -> Result<DecryptingTrustee<G>, Error> {
        if !self.all_public_keys_received() {
            return Err(Error::GuardianCountMismatch {
                expected: self.params.guardians,
                actual: self.public_key_sets.len(),
            });
        }
        if let Some(missing_id) = self
            .public_key_sets
            .keys()
            .find(|&id| *id != self.id && !self.received_backups.contains_key(id))
        {
            return Err(Error::MissingBackup {
                generating_guardian_id: missing_id.clone(),
            });
        }

        let guardian_commitments = self
            .public_key_sets
            .iter()
            .map(|(id, keys)| (id.clone(), keys.coefficient_commitments().to_vec()))
            .collect();
        Ok(DecryptingTrustee::from_ceremony(
            self.id,
            self.x_coordinate,
            self.polynomial.election_keypair(),
            self.auxiliary_keypair,
            self.auxiliary_scheme,
            self.received_backups,
            guardian_commitments,
        ))
    }
}
