//! Guardian state during decryption.

use zeroize::Zeroizing;

use core::fmt;
use std::collections::BTreeMap;

use super::Error;
use crate::{
    auxiliary::AuxiliaryEncryption,
    group::Group,
    key_ceremony::PartialKeyBackup,
    polynomial::recovery_public_key,
    proofs::ProofKind,
    ChaumPedersenProof, Ciphertext, Keypair, PublicKey, SecretKey,
};

/// Operations of a guardian available to the [`DecryptionMediator`].
///
/// Methods take `&self`, so that the mediator can request shares for different
/// selections in parallel.
///
/// [`DecryptionMediator`]: super::DecryptionMediator
pub trait DecryptingGuardian<G: Group>: Send + Sync {
    /// Returns the guardian ID.
    fn id(&self) -> &str;

    /// Returns the guardian coordinate.
    fn x_coordinate(&self) -> u32;

    /// Returns the election public key of the guardian.
    fn election_public_key(&self) -> PublicKey<G>;

    /// Computes the share of the guardian for `ciphertext` together with a proof
    /// of its correctness.
    ///
    /// If `nonce_seed` is provided, the proof nonce is derived from it deterministically;
    /// otherwise, it is random.
    fn partial_decrypt(
        &self,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> (G::Element, ChaumPedersenProof<G>);

    /// Computes the share of a missing guardian's backup for `ciphertext` together
    /// with a proof of its correctness w.r.t. the recovery public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the guardian has no backup from the missing guardian,
    /// or cannot decrypt it.
    fn compensated_decrypt(
        &self,
        missing_guardian_id: &str,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> Result<(G::Element, ChaumPedersenProof<G>), Error>;

    /// Computes the public key matching the backup the guardian holds for the missing
    /// guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the missing guardian is unknown.
    fn recover_public_key(&self, missing_guardian_id: &str) -> Result<PublicKey<G>, Error>;
}

/// Guardian that has completed the key ceremony and can take part in decryption.
///
/// Created with [`KeyCeremonyTrustee::into_decrypting_trustee()`].
///
/// [`KeyCeremonyTrustee::into_decrypting_trustee()`]:
///     crate::key_ceremony::KeyCeremonyTrustee::into_decrypting_trustee
pub struct DecryptingTrustee<G: Group> {
    id: String,
    x_coordinate: u32,
    election_keypair: Keypair<G>,
    auxiliary_keypair: Keypair<G>,
    auxiliary_scheme: Box<dyn AuxiliaryEncryption<G>>,
    backups: BTreeMap<String, PartialKeyBackup>,
    guardian_commitments: BTreeMap<String, Vec<G::Element>>,
}

impl<G: Group> fmt::Debug for DecryptingTrustee<G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DecryptingTrustee")
            .field("id", &self.id)
            .field("x_coordinate", &self.x_coordinate)
            .field("election_public_key", self.election_keypair.public())
            .field("backups", &self.backups.keys())
            .finish_non_exhaustive()
    }
}

impl<G: Group> DecryptingTrustee<G> {
    pub(crate) fn from_ceremony(
        id: String,
        x_coordinate: u32,
        election_keypair: Keypair<G>,
        auxiliary_keypair: Keypair<G>,
        auxiliary_scheme: Box<dyn AuxiliaryEncryption<G>>,
        backups: BTreeMap<String, PartialKeyBackup>,
        guardian_commitments: BTreeMap<String, Vec<G::Element>>,
    ) -> Self {
        Self {
            id,
            x_coordinate,
            election_keypair,
            auxiliary_keypair,
            auxiliary_scheme,
            backups,
            guardian_commitments,
        }
    }

    /// Returns the guardian ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the guardian coordinate.
    pub fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    /// Returns the election public key of this guardian.
    pub fn election_public_key(&self) -> &PublicKey<G> {
        self.election_keypair.public()
    }

    /// Returns IDs of guardians this trustee holds backups for.
    pub fn backup_owners(&self) -> impl Iterator<Item = &str> + '_ {
        self.backups.keys().map(String::as_str)
    }

    /// Computes the share of this guardian for `ciphertext` with a proof of correctness.
    pub fn partial_decrypt(
        &self,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> (G::Element, ChaumPedersenProof<G>) {
        let secret = self.election_keypair.secret();
        let share = ciphertext.partial_decrypt(secret);
        let proof = ChaumPedersenProof::new(
            ProofKind::Direct,
            extended_base_hash,
            secret,
            self.election_keypair.public(),
            ciphertext,
            &share,
            nonce_seed,
        );
        (share, proof)
    }

    fn backup_value(&self, missing_guardian_id: &str) -> Result<SecretKey<G>, Error> {
        let backup = self
            .backups
            .get(missing_guardian_id)
            .ok_or_else(|| Error::MissingBackup {
                guardian_id: self.id.clone(),
                missing_guardian_id: missing_guardian_id.to_owned(),
            })?;
        let bytes = self
            .auxiliary_scheme
            .decrypt(&backup.encrypted_coordinate, self.auxiliary_keypair.secret())
            .map(Zeroizing::new);
        bytes
            .and_then(|bytes| SecretKey::from_bytes(&bytes))
            .ok_or_else(|| Error::BackupDecryption {
                guardian_id: self.id.clone(),
                missing_guardian_id: missing_guardian_id.to_owned(),
            })
    }

    /// Computes the public key matching the backup this guardian holds for the missing
    /// guardian, from the missing guardian's public commitments.
    ///
    /// # Errors
    ///
    /// Returns an error if the missing guardian is unknown.
    pub fn recover_public_key(&self, missing_guardian_id: &str) -> Result<PublicKey<G>, Error> {
        let commitments = self
            .guardian_commitments
            .get(missing_guardian_id)
            .ok_or_else(|| Error::UnknownGuardian(missing_guardian_id.to_owned()))?;
        let element = recovery_public_key::<G>(self.x_coordinate, commitments);
        Ok(PublicKey::from_element(element))
    }

    /// Computes the share of the backup from the missing guardian for `ciphertext`
    /// with a proof of correctness.
    ///
    /// # Errors
    ///
    /// Returns an error if this trustee has no backup from the missing guardian,
    /// or cannot decrypt it.
    pub fn compensated_decrypt(
        &self,
        missing_guardian_id: &str,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> Result<(G::Element, ChaumPedersenProof<G>), Error> {
        let value = self.backup_value(missing_guardian_id)?;
        let recovery_key = self.recover_public_key(missing_guardian_id)?;
        let share = ciphertext.partial_decrypt(&value);
        let proof = ChaumPedersenProof::new(
            ProofKind::Compensated,
            extended_base_hash,
            &value,
            &recovery_key,
            ciphertext,
            &share,
            nonce_seed,
        );
        Ok((share, proof))
    }
}

/// In-process [`DecryptingGuardian`] wrapping a reference to a trustee.
#[derive(Debug, Clone, Copy)]
pub struct DecryptingTrusteeProxy<'a, G: Group> {
    trustee: &'a DecryptingTrustee<G>,
}

impl<'a, G: Group> DecryptingTrusteeProxy<'a, G> {
    /// Wraps the specified trustee.
    pub fn new(trustee: &'a DecryptingTrustee<G>) -> Self {
        Self { trustee }
    }
}

impl<G: Group> DecryptingGuardian<G> for DecryptingTrusteeProxy<'_, G> {
    fn id(&self) -> &str {
        self.trustee.id()
    }

    fn x_coordinate(&self) -> u32 {
        self.trustee.x_coordinate()
    }

    fn election_public_key(&self) -> PublicKey<G> {
        self.trustee.election_public_key().clone()
    }

    fn partial_decrypt(
        &self,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> (G::Element, ChaumPedersenProof<G>) {
        self.trustee
            .partial_decrypt(ciphertext, extended_base_hash, nonce_seed)
    }

    fn compensated_decrypt(
        &self,
        missing_guardian_id: &str,
        ciphertext: &Ciphertext<G>,
        extended_base_hash: &G::Scalar,
        nonce_seed: Option<&G::Scalar>,
    ) -> Result<(G::Element, ChaumPedersenProof<G>), Error> {
        self.trustee.compensated_decrypt(
            missing_guardian_id,
            ciphertext,
            extended_base_hash,
            nonce_seed,
        )
    }

    fn recover_public_key(&self, missing_guardian_id: &str) -> Result<PublicKey<G>, Error> {
        self.trustee.recover_public_key(missing_guardian_id)
    }
}
