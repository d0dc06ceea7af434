//! [`SchnorrProof`] and related logic.

use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::serde::{ElementHelper, ScalarHelper};
use crate::{
    group::Group,
    proofs::{TranscriptForGroup, VerificationError},
    Keypair, PublicKey, SecretKey,
};

/// Zero-knowledge proof of knowledge of the discrete log of a public key, aka Schnorr proof.
///
/// Guardians publish one proof per polynomial coefficient so that other guardians can check
/// that every coefficient commitment is backed by a known secret.
///
/// # Construction
///
/// 1. **Commitment:** The prover generates random scalar `u` and publishes `h = [u]G`.
/// 2. **Challenge:** `c = hash(K, h)`, derived with a [`Transcript`].
/// 3. **Response:** `v = u + c * s`, where `s` is the secret key for `K = [s]G`.
///
/// Verification checks that `c` is restored from `(K, h)` and that `[v]G == h + [c]K`.
///
/// # Implementation notes
///
/// - Proof generation is constant-time. Verification is **not** constant-time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct SchnorrProof<G: Group> {
    public_key: PublicKey<G>,
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    commitment: G::Element,
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    challenge: G::Scalar,
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    response: G::Scalar,
}

impl<G: Group> SchnorrProof<G> {
    /// Creates a proof of possession of the secret key in `keypair`.
    pub fn new<R: CryptoRng + RngCore>(keypair: &Keypair<G>, rng: &mut R) -> Self {
        let randomness = SecretKey::<G>::generate(rng);
        let commitment = G::mul_generator(randomness.expose_scalar());
        let challenge = Self::challenge(keypair.public(), &commitment);
        let response = *randomness.expose_scalar() + challenge * *keypair.secret().expose_scalar();

        Self {
            public_key: keypair.public().clone(),
            commitment,
            challenge,
            response,
        }
    }

    fn challenge(public_key: &PublicKey<G>, commitment: &G::Element) -> G::Scalar {
        let mut transcript = Transcript::new(b"guardian_schnorr");
        transcript.start_proof(b"schnorr");
        transcript.append_element_bytes(b"K", public_key.as_bytes());
        transcript.append_element::<G>(b"h", commitment);
        transcript.challenge_scalar::<G>(b"c")
    }

    /// Returns the public key this proof is made for.
    pub fn public_key(&self) -> &PublicKey<G> {
        &self.public_key
    }

    /// Returns the commitment `h` of this proof.
    pub fn commitment(&self) -> G::Element {
        self.commitment
    }

    /// Verifies this proof.
    ///
    /// # Errors
    ///
    /// Returns an error if this proof does not verify.
    pub fn verify(&self) -> Result<(), VerificationError> {
        let expected_challenge = Self::challenge(&self.public_key, &self.commitment);
        if expected_challenge != self.challenge {
            return Err(VerificationError::ChallengeMismatch);
        }

        let restored_commitment = G::vartime_double_mul_generator(
            &-self.challenge,
            self.public_key.as_element(),
            &self.response,
        );
        if restored_commitment == self.commitment {
            Ok(())
        } else {
            Err(VerificationError::CommitmentMismatch)
        }
    }

    /// Verifies this proof and checks that it is made for `expected_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if this proof does not verify or if it is made for another key.
    pub fn verify_for(&self, expected_key: &PublicKey<G>) -> Result<(), VerificationError> {
        if self.public_key != *expected_key {
            return Err(VerificationError::PublicKeyMismatch);
        }
        self.verify()
    }
}
