//! Key ceremony: distributed generation of the joint election key by `n` guardians,
//! any `k` of which can later decrypt.
//!
//! # Construction
//!
//! The ceremony is a variation of Pedersen's DKG based on [Feldman's VSS][feldman-vss],
//! with an untrusted [`KeyCeremonyMediator`] relaying messages between guardians:
//!
//! 1. **Public keys.** Each guardian generates a secret [`ElectionPolynomial`] of degree
//!    `k - 1` and an auxiliary keypair, and publishes a [`PublicKeySet`]: coefficient
//!    commitments, a [`SchnorrProof`] for each commitment and the auxiliary public key.
//!    Every guardian verifies every other guardian's set.
//! 2. **Backups.** Each guardian `i` evaluates its polynomial at the coordinate of every
//!    other guardian `j` and sends `P_i(x_j)` encrypted with `j`'s auxiliary key
//!    ([`PartialKeyBackup`]).
//! 3. **Verification.** Guardian `j` decrypts the backup and checks it against
//!    the commitments of `i` ([`PartialKeyVerification`]).
//! 4. **Challenges.** For each failed verification, `i` must publish the plaintext value
//!    ([`PartialKeyChallengeResponse`]), which anyone can check with
//!    [`verify_challenge_response()`]. A failed challenge aborts the ceremony.
//!
//! Finally, guardians publish the joint public key `Σ K_i`, which must be the same
//! for everyone. The output of the ceremony is an [`ElectionContext`]; each guardian
//! turns into a [`DecryptingTrustee`](crate::decryption::DecryptingTrustee).
//!
//! [feldman-vss]: https://www.cs.umd.edu/~gasarch/TOPICS/secretsharing/feldmanVSS.pdf
//! [`ElectionPolynomial`]: crate::polynomial::ElectionPolynomial
//! [`ElectionContext`]: crate::ElectionContext

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use core::fmt;

#[cfg(feature = "serde")]
use crate::serde::{ElementVec, ScalarHelper};
use crate::{
    auxiliary::{AuxiliaryCiphertext, UnknownScheme},
    group::Group,
    polynomial::verify_point,
    proofs::VerificationError,
    PublicKey, SchnorrProof, SecretKey,
};

mod mediator;
mod proxy;
mod trustee;

pub use self::{
    mediator::KeyCeremonyMediator,
    proxy::{KeyCeremonyGuardian, KeyCeremonyTrusteeProxy},
    trustee::KeyCeremonyTrustee,
};

/// Exclusive upper bound for guardian coordinates.
pub const MAX_COORDINATE: u32 = 256;

pub(crate) fn check_coordinate(x_coordinate: u32) -> Result<(), Error> {
    if x_coordinate == 0 || x_coordinate >= MAX_COORDINATE {
        Err(Error::InvalidCoordinate(x_coordinate))
    } else {
        Ok(())
    }
}

/// Parameters of a threshold election: the number of guardians and the quorum
/// necessary to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Params {
    /// Total number of guardians.
    pub guardians: usize,
    /// Number of guardians necessary to decrypt.
    pub quorum: usize,
}

impl Params {
    /// Creates new parameters.
    ///
    /// # Panics
    ///
    /// Panics if `guardians` is equal to zero or if `quorum` is not in `1..=guardians`.
    pub const fn new(guardians: usize, quorum: usize) -> Self {
        assert!(guardians > 0);
        assert!(quorum > 0 && quorum <= guardians);
        Self { guardians, quorum }
    }

    /// Fallible version of [`Self::new()`].
    ///
    /// # Errors
    ///
    /// Returns an error if `quorum` is not in `1..=guardians`.
    pub fn try_new(guardians: usize, quorum: usize) -> Result<Self, Error> {
        if quorum == 0 || quorum > guardians {
            Err(Error::InvalidQuorum { guardians, quorum })
        } else {
            Ok(Self { guardians, quorum })
        }
    }
}

/// Public keys announced by a guardian in the first round of the key ceremony.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct PublicKeySet<G: Group> {
    owner_id: String,
    x_coordinate: u32,
    auxiliary_public_key: PublicKey<G>,
    auxiliary_scheme: String,
    #[cfg_attr(feature = "serde", serde(with = "ElementVec::<G>"))]
    coefficient_commitments: Vec<G::Element>,
    coefficient_proofs: Vec<SchnorrProof<G>>,
}

impl<G: Group> PublicKeySet<G> {
    pub(crate) fn new(
        owner_id: String,
        x_coordinate: u32,
        auxiliary_public_key: PublicKey<G>,
        auxiliary_scheme: String,
        coefficient_commitments: Vec<G::Element>,
        coefficient_proofs: Vec<SchnorrProof<G>>,
    ) -> Self {
        Self {
            owner_id,
            x_coordinate,
            auxiliary_public_key,
            auxiliary_scheme,
            coefficient_commitments,
            coefficient_proofs,
        }
    }

    /// Returns the ID of the guardian owning these keys.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Returns the coordinate of the owning guardian.
    pub fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    /// Returns the auxiliary public key used to encrypt backups for the owner.
    pub fn auxiliary_public_key(&self) -> &PublicKey<G> {
        &self.auxiliary_public_key
    }

    /// Returns the name of the auxiliary encryption scheme used by the owner.
    pub fn auxiliary_scheme(&self) -> &str {
        &self.auxiliary_scheme
    }

    /// Returns commitments to the coefficients of the owner's polynomial.
    pub fn coefficient_commitments(&self) -> &[G::Element] {
        &self.coefficient_commitments
    }

    /// Returns proofs of knowledge for each coefficient commitment.
    pub fn coefficient_proofs(&self) -> &[SchnorrProof<G>] {
        &self.coefficient_proofs
    }

    /// Returns the election public key of the owner, i.e., the commitment to the constant
    /// coefficient of its polynomial.
    pub fn election_public_key(&self) -> PublicKey<G> {
        PublicKey::from_element(self.coefficient_commitments[0])
    }

    /// Checks the coordinate and the polynomial degree, and verifies that every coefficient
    /// commitment is backed by a valid proof.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first failed check.
    pub fn verify(&self, quorum: usize) -> Result<(), Error> {
        check_coordinate(self.x_coordinate)?;
        let lengths = [
            self.coefficient_commitments.len(),
            self.coefficient_proofs.len(),
        ];
        if let Some(&actual) = lengths.iter().find(|&&len| len != quorum) {
            return Err(Error::QuorumMismatch {
                guardian_id: self.owner_id.clone(),
                expected: quorum,
                actual,
            });
        }

        let pairs = self
            .coefficient_commitments
            .iter()
            .zip(&self.coefficient_proofs);
        for (index, (commitment, proof)) in pairs.enumerate() {
            let result = if proof.public_key().as_element() == *commitment {
                proof.verify()
            } else {
                Err(VerificationError::PublicKeyMismatch)
            };
            result.map_err(|source| Error::InvalidProof {
                guardian_id: self.owner_id.clone(),
                index,
                source,
            })?;
        }
        Ok(())
    }
}

/// Backup of a guardian's polynomial value at the coordinate of another guardian,
/// encrypted for that guardian.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartialKeyBackup {
    /// ID of the guardian whose polynomial was evaluated.
    pub generating_guardian_id: String,
    /// ID of the guardian the backup is designated for.
    pub designated_guardian_id: String,
    /// Coordinate of the designated guardian.
    pub designated_x_coordinate: u32,
    /// Polynomial value encrypted with the auxiliary key of the designated guardian.
    pub encrypted_coordinate: AuxiliaryCiphertext,
}

/// Outcome of checking a [`PartialKeyBackup`] or a [`PartialKeyChallengeResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartialKeyVerification {
    /// ID of the guardian that generated the backup.
    pub generating_guardian_id: String,
    /// ID of the guardian the backup is designated for.
    pub designated_guardian_id: String,
    /// ID of the party that performed the check.
    pub verifier_id: String,
    /// Whether the check succeeded.
    pub verified: bool,
    /// Reason of a failure, if any.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
}

impl PartialKeyVerification {
    pub(crate) fn success(generating: &str, designated: &str, verifier: &str) -> Self {
        Self {
            generating_guardian_id: generating.to_owned(),
            designated_guardian_id: designated.to_owned(),
            verifier_id: verifier.to_owned(),
            verified: true,
            error: None,
        }
    }

    pub(crate) fn failure(
        generating: &str,
        designated: &str,
        verifier: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            verified: false,
            error: Some(error.into()),
            ..Self::success(generating, designated, verifier)
        }
    }
}

/// Public response of a guardian to a challenge of its backup: the polynomial value
/// in plaintext together with the polynomial commitments.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct PartialKeyChallengeResponse<G: Group> {
    /// ID of the guardian whose polynomial was evaluated.
    pub generating_guardian_id: String,
    /// ID of the guardian the backup was designated for.
    pub designated_guardian_id: String,
    /// Coordinate of the designated guardian.
    pub designated_x_coordinate: u32,
    /// Polynomial value at the designated coordinate.
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    pub coordinate: G::Scalar,
    /// Commitments to the polynomial coefficients.
    #[cfg_attr(feature = "serde", serde(with = "ElementVec::<G>"))]
    pub coefficient_commitments: Vec<G::Element>,
}

/// Checks a challenge response. The response must repeat the commitments published
/// by the generating guardian in `public_keys`, and the revealed value must lie
/// on the committed polynomial. Can be performed by any party.
pub fn verify_challenge_response<G: Group>(
    verifier_id: &str,
    response: &PartialKeyChallengeResponse<G>,
    public_keys: &PublicKeySet<G>,
) -> PartialKeyVerification {
    let generating = response.generating_guardian_id.as_str();
    let designated = response.designated_guardian_id.as_str();
    let fail = |reason: &str| {
        PartialKeyVerification::failure(generating, designated, verifier_id, reason)
    };

    if public_keys.owner_id != generating {
        return fail("response is not made by the owner of public keys");
    }
    if public_keys.coefficient_commitments != response.coefficient_commitments {
        return fail("commitments differ from the published ones");
    }
    let value = SecretKey::<G>::new(response.coordinate);
    if verify_point(
        &value,
        response.designated_x_coordinate,
        &response.coefficient_commitments,
    ) {
        PartialKeyVerification::success(generating, designated, verifier_id)
    } else {
        fail("revealed value does not match commitments")
    }
}

/// Errors that can occur during the key ceremony.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Guardian coordinate is outside `1..256`.
    InvalidCoordinate(u32),
    /// Quorum is not in `1..=guardians`.
    InvalidQuorum {
        /// Number of guardians.
        guardians: usize,
        /// Requested quorum.
        quorum: usize,
    },
    /// Number of participating guardians differs from the one in [`Params`].
    GuardianCountMismatch {
        /// Expected number of guardians.
        expected: usize,
        /// Actual number of guardians.
        actual: usize,
    },
    /// Two guardians share the same ID.
    DuplicateGuardian(String),
    /// Two guardians share the same coordinate.
    DuplicateCoordinate(u32),
    /// Guardian with the specified ID is not known.
    UnknownGuardian(String),
    /// Guardian was offered its own public keys, or asked to back up its polynomial
    /// for itself.
    SelfAddressed(String),
    /// Backup is designated for another guardian.
    WrongRecipient {
        /// Guardian the backup was designated for.
        expected: String,
        /// Guardian that received the backup.
        actual: String,
    },
    /// Proof for a coefficient commitment does not verify.
    InvalidProof {
        /// Guardian that published the commitment.
        guardian_id: String,
        /// Index of the coefficient.
        index: usize,
        /// Underlying verification error.
        source: VerificationError,
    },
    /// Number of coefficient commitments or proofs differs from the quorum.
    QuorumMismatch {
        /// Guardian that published the commitments.
        guardian_id: String,
        /// Expected number of items.
        expected: usize,
        /// Actual number of items.
        actual: usize,
    },
    /// Auxiliary encryption scheme announced by a guardian is not registered.
    UnknownScheme(UnknownScheme),
    /// Backup cannot be verified because the generator's public keys are not known yet.
    MissingPublicKeys {
        /// Guardian whose public keys are missing.
        guardian_id: String,
    },
    /// Backup from the specified generating guardian has not been received.
    MissingBackup {
        /// Guardian whose backup is missing.
        generating_guardian_id: String,
    },
    /// A challenge response did not verify, which means that the generating guardian
    /// distributed an invalid backup.
    ChallengeFailed {
        /// Guardian that generated the backup.
        generating_guardian_id: String,
        /// Guardian the backup was designated for.
        designated_guardian_id: String,
    },
    /// Guardians computed different joint public keys.
    JointKeyMismatch {
        /// Guardian whose key differs from the key of the first guardian.
        guardian_id: String,
    },
    /// Joint public key cannot be computed (e.g., because the guardian keys cancel out).
    DegenerateJointKey,
    /// Value stored in a restored election context is inconsistent with its guardian records.
    ContextMismatch {
        /// Name of the inconsistent field.
        field: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCoordinate(x) => write!(
                formatter,
                "guardian coordinate {x} is outside allowed range 1..{MAX_COORDINATE}"
            ),
            Self::InvalidQuorum { guardians, quorum } => write!(
                formatter,
                "quorum {quorum} is invalid for {guardians} guardians, expected value in \
                 1..={guardians}"
            ),
            Self::GuardianCountMismatch { expected, actual } => write!(
                formatter,
                "expected {expected} guardians, got {actual}"
            ),
            Self::DuplicateGuardian(id) => write!(formatter, "guardian `{id}` is duplicated"),
            Self::DuplicateCoordinate(x) => {
                write!(formatter, "coordinate {x} is used by several guardians")
            }
            Self::UnknownGuardian(id) => write!(formatter, "guardian `{id}` is unknown"),
            Self::SelfAddressed(id) => write!(
                formatter,
                "guardian `{id}` cannot exchange keys or backups with itself"
            ),
            Self::WrongRecipient { expected, actual } => write!(
                formatter,
                "backup designated for guardian `{expected}` was sent to `{actual}`"
            ),
            Self::InvalidProof {
                guardian_id,
                index,
                source,
            } => write!(
                formatter,
                "proof for coefficient #{index} of guardian `{guardian_id}` is invalid: {source}"
            ),
            Self::QuorumMismatch {
                guardian_id,
                expected,
                actual,
            } => write!(
                formatter,
                "guardian `{guardian_id}` published {actual} coefficient commitments \
                 or proofs, expected {expected}"
            ),
            Self::UnknownScheme(err) => fmt::Display::fmt(err, formatter),
            Self::MissingPublicKeys { guardian_id } => write!(
                formatter,
                "public keys of guardian `{guardian_id}` were not received"
            ),
            Self::MissingBackup {
                generating_guardian_id,
            } => write!(
                formatter,
                "backup from guardian `{generating_guardian_id}` was not received"
            ),
            Self::ChallengeFailed {
                generating_guardian_id,
                designated_guardian_id,
            } => write!(
                formatter,
                "guardian `{generating_guardian_id}` failed the challenge of its backup \
                 for guardian `{designated_guardian_id}`"
            ),
            Self::JointKeyMismatch { guardian_id } => write!(
                formatter,
                "joint public key computed by guardian `{guardian_id}` differs from other guardians"
            ),
            Self::DegenerateJointKey => {
                formatter.write_str("guardian public keys do not combine into a valid joint key")
            }
            Self::ContextMismatch { field } => write!(
                formatter,
                "`{field}` of the election context does not match guardian records"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidProof { source, .. } => Some(source),
            Self::UnknownScheme(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UnknownScheme> for Error {
    fn from(err: UnknownScheme) -> Self {
        Self::UnknownScheme(err)
    }
}
