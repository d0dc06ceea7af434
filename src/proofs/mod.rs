//! Zero-knowledge proofs.

use merlin::Transcript;
use rand_chacha::ChaChaRng;
use rand_core::{CryptoRng, OsRng, RngCore, SeedableRng};

use core::fmt;

use crate::{
    group::{scalar_to_bytes, Group, RandomBytesProvider},
    SecretKey,
};

mod chaum_pedersen;
mod schnorr;

pub use self::{
    chaum_pedersen::{ChaumPedersenProof, ProofKind},
    schnorr::SchnorrProof,
};

/// Extension trait for Merlin transcripts used in constructing our proofs.
pub(crate) trait TranscriptForGroup {
    fn start_proof(&mut self, proof_label: &'static [u8]);

    fn append_element_bytes(&mut self, label: &'static [u8], element_bytes: &[u8]);

    fn append_element<G: Group>(&mut self, label: &'static [u8], element: &G::Element);

    fn append_scalar<G: Group>(&mut self, label: &'static [u8], scalar: &G::Scalar);

    fn challenge_scalar<G: Group>(&mut self, label: &'static [u8]) -> G::Scalar;
}

impl TranscriptForGroup for Transcript {
    fn start_proof(&mut self, proof_label: &'static [u8]) {
        self.append_message(b"dom-sep", proof_label);
    }

    fn append_element_bytes(&mut self, label: &'static [u8], element_bytes: &[u8]) {
        self.append_message(label, element_bytes);
    }

    fn append_element<G: Group>(&mut self, label: &'static [u8], element: &G::Element) {
        let mut output = vec![0_u8; G::ELEMENT_SIZE];
        G::serialize_element(element, &mut output);
        self.append_element_bytes(label, &output);
    }

    fn append_scalar<G: Group>(&mut self, label: &'static [u8], scalar: &G::Scalar) {
        self.append_message(label, &scalar_to_bytes::<G>(scalar));
    }

    fn challenge_scalar<G: Group>(&mut self, label: &'static [u8]) -> G::Scalar {
        G::scalar_from_random_bytes(RandomBytesProvider::new(self, label))
    }
}

/// Source of proof nonces.
///
/// Without a seed, every call draws from the OS CSPRNG. With a seed, the RNG is keyed by
/// the seed, the witness and the proof statement accumulated in the transcript so far,
/// so two different statements never share a nonce even if the seed is reused.
pub(crate) enum NonceRng {
    Os(OsRng),
    Seeded(ChaChaRng),
}

impl NonceRng {
    pub(crate) fn new<G: Group>(
        seed: Option<&G::Scalar>,
        witness: &SecretKey<G>,
        statement: &Transcript,
    ) -> Self {
        match seed {
            None => Self::Os(OsRng),
            Some(seed) => {
                let mut transcript = statement.clone();
                transcript.append_scalar::<G>(b"nonce_seed", seed);
                transcript.append_scalar::<G>(b"witness", witness.expose_scalar());
                let mut rng_seed = [0_u8; 32];
                transcript.challenge_bytes(b"nonce_rng", &mut rng_seed);
                Self::Seeded(ChaChaRng::from_seed(rng_seed))
            }
        }
    }
}

impl RngCore for NonceRng {
    fn next_u32(&mut self) -> u32 {
        match self {
            Self::Os(rng) => rng.next_u32(),
            Self::Seeded(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Self::Os(rng) => rng.next_u64(),
            Self::Seeded(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Self::Os(rng) => rng.fill_bytes(dest),
            Self::Seeded(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        match self {
            Self::Os(rng) => rng.try_fill_bytes(dest),
            Self::Seeded(rng) => rng.try_fill_bytes(dest),
        }
    }
}

impl CryptoRng for NonceRng {}

/// Error verifying [`SchnorrProof`]s or [`ChaumPedersenProof`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerificationError {
    /// Restored challenge scalar does not match the one provided in the proof.
    ///
    /// This error most likely means that the proof itself is malformed, or that it was created
    /// for a different context than it is being verified for.
    ChallengeMismatch,
    /// One of the verification equations does not hold for the commitments provided
    /// in the proof.
    CommitmentMismatch,
    /// The public key the proof is verified against differs from the expected one.
    PublicKeyMismatch,
    /// A collection (e.g., number of coefficient proofs) has a different size than expected.
    LenMismatch {
        /// Human-readable collection name, such as "coefficient proofs".
        collection: &'static str,
        /// Expected size of the collection.
        expected: usize,
        /// Actual size of the collection.
        actual: usize,
    },
}

impl VerificationError {
    pub(crate) fn check_lengths(
        collection: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::LenMismatch {
                collection,
                expected,
                actual,
            })
        }
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChallengeMismatch => formatter.write_str(
                "restored challenge scalar does not match the one provided in the proof",
            ),
            Self::CommitmentMismatch => {
                formatter.write_str("proof commitments do not satisfy verification equations")
            }
            Self::PublicKeyMismatch => {
                formatter.write_str("proof is made for an unexpected public key")
            }
            Self::LenMismatch {
                collection,
                expected,
                actual,
            } => write!(
                formatter,
                "number of {collection} ({actual}) differs from expected ({expected})"
            ),
        }
    }
}

impl std::error::Error for VerificationError {}
