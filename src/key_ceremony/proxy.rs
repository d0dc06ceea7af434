//! Interface of a guardian as seen by the key ceremony mediator.

use super::{
    Error, KeyCeremonyTrustee, PartialKeyBackup, PartialKeyChallengeResponse,
    PartialKeyVerification, PublicKeySet,
};
use crate::{group::Group, PublicKey};

/// Operations of a guardian available to the [`KeyCeremonyMediator`].
///
/// The trait is object-safe, so that the mediator can work with guardians behind
/// arbitrary transports. [`KeyCeremonyTrusteeProxy`] implements it for an in-process
/// [`KeyCeremonyTrustee`].
///
/// [`KeyCeremonyMediator`]: super::KeyCeremonyMediator
pub trait KeyCeremonyGuardian<G: Group> {
    /// Returns the guardian ID.
    fn id(&self) -> &str;

    /// Returns the guardian coordinate.
    fn x_coordinate(&self) -> u32;

    /// Returns the quorum the guardian polynomial is generated for.
    fn quorum(&self) -> usize;

    /// Returns public keys of the guardian.
    fn send_public_keys(&self) -> PublicKeySet<G>;

    /// Passes public keys of another guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys are rejected.
    fn receive_public_keys(&mut self, keys: PublicKeySet<G>) -> Result<(), Error>;

    /// Requests a backup designated for another guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if a backup cannot be created.
    fn send_partial_key_backup(&mut self, designated_id: &str) -> Result<PartialKeyBackup, Error>;

    /// Passes a backup designated for the guardian for verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be verified at all (e.g., it is designated
    /// for another guardian).
    fn verify_partial_key_backup(
        &mut self,
        backup: &PartialKeyBackup,
    ) -> Result<PartialKeyVerification, Error>;

    /// Requests a public response to a challenge of the backup designated for another guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be created.
    fn send_backup_challenge(
        &self,
        designated_id: &str,
    ) -> Result<PartialKeyChallengeResponse<G>, Error>;

    /// Passes a verified challenge response designated for the guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be checked.
    fn receive_challenge_response(
        &mut self,
        response: &PartialKeyChallengeResponse<G>,
    ) -> Result<PartialKeyVerification, Error>;

    /// Requests the joint public key computed by the guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the guardian cannot compute the key yet.
    fn send_joint_public_key(&self) -> Result<PublicKey<G>, Error>;
}

/// In-process [`KeyCeremonyGuardian`] wrapping a mutable reference to a trustee.
#[derive(Debug)]
pub struct KeyCeremonyTrusteeProxy<'a, G: Group> {
    trustee: &'a mut KeyCeremonyTrustee<G>,
}

impl<'a, G: Group> KeyCeremonyTrusteeProxy<'a, G> {
    /// Wraps the specified trustee.
    pub fn new(trustee: &'a mut KeyCeremonyTrustee<G>) -> Self {
        Self { trustee }
    }
}

impl<G: Group> KeyCeremonyGuardian<G> for KeyCeremonyTrusteeProxy<'_, G> {
    fn id(&self) -> &str {
        self.trustee.id()
    }

    fn x_coordinate(&self) -> u32 {
        self.trustee.x_coordinate()
    }

    fn quorum(&self) -> usize {
        self.trustee.params().quorum
    }

    fn send_public_keys(&self) -> PublicKeySet<G> {
        self.trustee.share_public_keys()
    }

    fn receive_public_keys(&mut self, keys: PublicKeySet<G>) -> Result<(), Error> {
        self.trustee.receive_public_keys(keys)
    }

    fn send_partial_key_backup(&mut self, designated_id: &str) -> Result<PartialKeyBackup, Error> {
        self.trustee.send_partial_key_backup(designated_id)
    }

    fn verify_partial_key_backup(
        &mut self,
        backup: &PartialKeyBackup,
    ) -> Result<PartialKeyVerification, Error> {
        self.trustee.verify_partial_key_backup(backup)
    }

    fn send_backup_challenge(
        &self,
        designated_id: &str,
    ) -> Result<PartialKeyChallengeResponse<G>, Error> {
        self.trustee.send_backup_challenge(designated_id)
    }

    fn receive_challenge_response(
        &mut self,
        response: &PartialKeyChallengeResponse<G>,
    ) -> Result<PartialKeyVerification, Error> {
        self.trustee.receive_challenge_response(response)
    }

    fn send_joint_public_key(&self) -> Result<PublicKey<G>, Error> {
        self.trustee.publish_joint_key()
    }
}
