//! Threshold decryption of tallies and spoiled ballots.
//!
//! Each available guardian computes a *share* `M_i = [s_i]A` for every selection ciphertext
//! `(A, B)` together with a [`ChaumPedersenProof`] of its correctness. If all guardians
//! are available, the plaintext is recovered as `B - Σ M_i`, followed by a lookup
//! in a [`DiscreteLogTable`].
//!
//! If some guardians are missing, but at least a quorum `k` is available, each available
//! guardian `l` computes a *compensated share* `M_il = [P_i(x_l)]A` for every missing guardian
//! `i`, using the backup `P_i(x_l)` it received during the key ceremony. The share
//! of the missing guardian is then reconstructed with Lagrange interpolation at zero:
//! `M_i = Σ w_l M_il`.
//!
//! The [`DecryptionMediator`] collects shares from guardians, verifies all proofs, and
//! reconstructs and combines shares. It never sees secret keys or backups.
//!
//! [`ChaumPedersenProof`]: crate::ChaumPedersenProof
//! [`DiscreteLogTable`]: crate::DiscreteLogTable

use core::fmt;

use crate::proofs::VerificationError;

mod mediator;
mod shares;
mod trustee;

pub use self::{
    mediator::DecryptionMediator,
    shares::{
        CompensatedContestShare, CompensatedDecryptionShare, CompensatedSelectionShare,
        ContestShare, DecryptionShare, SelectionShare, ShareProof,
    },
    trustee::{DecryptingGuardian, DecryptingTrustee, DecryptingTrusteeProxy},
};

/// Errors that can occur during decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Guardian with the specified ID is not a part of the election.
    UnknownGuardian(String),
    /// Guardian with the specified ID has already announced itself.
    DuplicateAnnouncement(String),
    /// Coordinate or election public key of the announced guardian differs from
    /// the election context.
    GuardianMismatch(String),
    /// Share of a guardian does not verify.
    InvalidShare {
        /// Guardian ID.
        guardian_id: String,
        /// Tally or ballot ID.
        object_id: String,
        /// Contest ID.
        contest_id: String,
        /// Selection ID.
        selection_id: String,
        /// Underlying verification error.
        source: VerificationError,
    },
    /// Fewer guardians than the quorum are available.
    InsufficientGuardians {
        /// Number of available guardians.
        available: usize,
        /// Quorum.
        quorum: usize,
    },
    /// Compensating guardian has no backup from the missing guardian.
    MissingBackup {
        /// Compensating guardian.
        guardian_id: String,
        /// Missing guardian.
        missing_guardian_id: String,
    },
    /// Backup from the missing guardian cannot be decrypted.
    BackupDecryption {
        /// Compensating guardian.
        guardian_id: String,
        /// Missing guardian.
        missing_guardian_id: String,
    },
    /// Recovery public key reported by a compensating guardian differs from the one
    /// computed from public commitments.
    RecoveryKeyMismatch {
        /// Compensating guardian.
        guardian_id: String,
        /// Missing guardian.
        missing_guardian_id: String,
    },
    /// Compensated share does not verify.
    InvalidCompensatedShare {
        /// Compensating guardian.
        guardian_id: String,
        /// Missing guardian.
        missing_guardian_id: String,
        /// Contest ID.
        contest_id: String,
        /// Selection ID.
        selection_id: String,
        /// Underlying verification error.
        source: VerificationError,
    },
    /// Recovery keys of compensating guardians do not interpolate to the public key
    /// of the missing guardian.
    CompensationFailed {
        /// Missing guardian.
        missing_guardian_id: String,
    },
    /// Share for a selection is missing.
    MissingShare {
        /// Guardian ID.
        guardian_id: String,
        /// Contest ID.
        contest_id: String,
        /// Selection ID.
        selection_id: String,
    },
    /// Decrypted value is outside the discrete log lookup table.
    UnknownTallyValue {
        /// Contest ID.
        contest_id: String,
        /// Selection ID.
        selection_id: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownGuardian(id) => {
                write!(formatter, "guardian `{id}` is not a part of the election")
            }
            Self::DuplicateAnnouncement(id) => {
                write!(formatter, "guardian `{id}` has already announced itself")
            }
            Self::GuardianMismatch(id) => write!(
                formatter,
                "guardian `{id}` does not match its record in the election context"
            ),
            Self::InvalidShare {
                guardian_id,
                object_id,
                contest_id,
                selection_id,
                source,
            } => write!(
                formatter,
                "share of guardian `{guardian_id}` for selection `{contest_id}/{selection_id}` \
                 of `{object_id}` is invalid: {source}"
            ),
            Self::InsufficientGuardians { available, quorum } => write!(
                formatter,
                "{available} guardians are available, while at least {quorum} are required"
            ),
            Self::MissingBackup {
                guardian_id,
                missing_guardian_id,
            } => write!(
                formatter,
                "guardian `{guardian_id}` has no backup from guardian `{missing_guardian_id}`"
            ),
            Self::BackupDecryption {
                guardian_id,
                missing_guardian_id,
            } => write!(
                formatter,
                "guardian `{guardian_id}` cannot decrypt backup from guardian \
                 `{missing_guardian_id}`"
            ),
            Self::RecoveryKeyMismatch {
                guardian_id,
                missing_guardian_id,
            } => write!(
                formatter,
                "recovery key of guardian `{guardian_id}` for guardian `{missing_guardian_id}` \
                 does not match public commitments"
            ),
            Self::InvalidCompensatedShare {
                guardian_id,
                missing_guardian_id,
                contest_id,
                selection_id,
                source,
            } => write!(
                formatter,
                "compensated share of guardian `{guardian_id}` for guardian \
                 `{missing_guardian_id}` and selection `{contest_id}/{selection_id}` \
                 is invalid: {source}"
            ),
            Self::CompensationFailed {
                missing_guardian_id,
            } => write!(
                formatter,
                "recovery keys do not interpolate to the public key of guardian \
                 `{missing_guardian_id}`"
            ),
            Self::MissingShare {
                guardian_id,
                contest_id,
                selection_id,
            } => write!(
                formatter,
                "share of guardian `{guardian_id}` for selection `{contest_id}/{selection_id}` \
                 is missing"
            ),
            Self::UnknownTallyValue {
                contest_id,
                selection_id,
            } => write!(
                formatter,
                "decrypted value for selection `{contest_id}/{selection_id}` is outside \
                 the lookup table"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidShare { source, .. } | Self::InvalidCompensatedShare { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
