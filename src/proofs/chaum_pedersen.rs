//! [`ChaumPedersenProof`] and related logic.

use merlin::Transcript;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::serde::{ElementHelper, ScalarHelper};
use crate::{
    group::Group,
    proofs::{NonceRng, TranscriptForGroup, VerificationError},
    Ciphertext, PublicKey, SecretKey,
};

/// Kind of a partial decryption proven by a [`ChaumPedersenProof`].
///
/// The kind is committed to in the proof transcript, so a proof of one kind does not verify
/// as the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProofKind {
    /// Partial decryption with the guardian's own election secret key; proven relative
    /// to the guardian's election public key.
    Direct,
    /// Partial decryption made on behalf of a missing guardian with an escrowed backup
    /// coordinate; proven relative to the recovery public key of the missing guardian.
    Compensated,
}

impl ProofKind {
    fn label(self) -> &'static [u8] {
        match self {
            Self::Direct => b"direct",
            Self::Compensated => b"compensated",
        }
    }
}

/// Zero-knowledge proof that a partial decryption `M = [s]A` of a ciphertext `(A, B)` is
/// computed with the discrete log `s` of a public component `K = [s]G`, aka Chaum–Pedersen
/// proof.
///
/// # Construction
///
/// 1. **Commitment:** The prover generates random scalar `u` and computes `a = [u]G`,
///   `b = [u]A`.
/// 2. **Challenge:** `c = hash(Q, kind, K, A, B, a, b, M)`, where `Q` is the extended base
///   hash of the election. Binding `Q` prevents replaying the proof in another election.
/// 3. **Response:** `v = u + c * s`.
///
/// Verification equations are:
///
/// ```text
/// [v]G ?= a + [c]K;
/// [v]A ?= b + [c]M.
/// ```
///
/// # Implementation details
///
/// - Proof generation is constant-time. Verification is **not** constant-time.
/// - The nonce `u` is either drawn from the OS CSPRNG, or derived from the provided
///   nonce seed together with the secret and the full statement being proven.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct ChaumPedersenProof<G: Group> {
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    pad_commitment: G::Element,
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    data_commitment: G::Element,
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    challenge: G::Scalar,
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    response: G::Scalar,
}

impl<G: Group> ChaumPedersenProof<G> {
    fn statement_transcript(
        kind: ProofKind,
        extended_base_hash: &G::Scalar,
        public_key: &PublicKey<G>,
        ciphertext: &Ciphertext<G>,
        partial_decryption: &G::Element,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"guardian_chaum_pedersen");
        transcript.start_proof(kind.label());
        transcript.append_scalar::<G>(b"Q", extended_base_hash);
        transcript.append_element_bytes(b"K", public_key.as_bytes());
        transcript.append_element::<G>(b"A", &ciphertext.pad());
        transcript.append_element::<G>(b"B", &ciphertext.data());
        transcript.append_element::<G>(b"M", partial_decryption);
        transcript
    }

    /// Creates a proof that `partial_decryption` equals `[secret]A` for the pad `A`
    /// of `ciphertext`, where `public_key = [secret]G`.
    ///
    /// It is **not** checked whether `secret` matches `public_key` and `partial_decryption`;
    /// if it does not, the constructed proof will not [`verify`](Self::verify()).
    pub fn new(
        kind: ProofKind,
        extended_base_hash: &G::Scalar,
        secret: &SecretKey<G>,
        public_key: &PublicKey<G>,
        ciphertext: &Ciphertext<G>,
        partial_decryption: &G::Element,
        nonce_seed: Option<&G::Scalar>,
    ) -> Self {
        let mut transcript = Self::statement_transcript(
            kind,
            extended_base_hash,
            public_key,
            ciphertext,
            partial_decryption,
        );
        let mut rng = NonceRng::new(nonce_seed, secret, &transcript);
        let randomness = SecretKey::<G>::generate(&mut rng);

        let pad_commitment = G::mul_generator(randomness.expose_scalar());
        let data_commitment = ciphertext.pad() * randomness.expose_scalar();
        transcript.append_element::<G>(b"a", &pad_commitment);
        transcript.append_element::<G>(b"b", &data_commitment);
        let challenge = transcript.challenge_scalar::<G>(b"c");
        let response = *randomness.expose_scalar() + challenge * *secret.expose_scalar();

        Self {
            pad_commitment,
            data_commitment,
            challenge,
            response,
        }
    }

    /// Verifies this proof.
    ///
    /// # Errors
    ///
    /// Returns an error if this proof does not verify.
    pub fn verify(
        &self,
        kind: ProofKind,
        extended_base_hash: &G::Scalar,
        public_key: &PublicKey<G>,
        ciphertext: &Ciphertext<G>,
        partial_decryption: &G::Element,
    ) -> Result<(), VerificationError> {
        let mut transcript = Self::statement_transcript(
            kind,
            extended_base_hash,
            public_key,
            ciphertext,
            partial_decryption,
        );
        transcript.append_element::<G>(b"a", &self.pad_commitment);
        transcript.append_element::<G>(b"b", &self.data_commitment);
        let expected_challenge = transcript.challenge_scalar::<G>(b"c");
        if expected_challenge != self.challenge {
            return Err(VerificationError::ChallengeMismatch);
        }

        let restored_pad_commitment = G::vartime_double_mul_generator(
            &-self.challenge,
            public_key.as_element(),
            &self.response,
        );
        let restored_data_commitment = G::vartime_multi_mul(
            &[-self.challenge, self.response],
            [*partial_decryption, ciphertext.pad()],
        );
        if restored_pad_commitment == self.pad_commitment
            && restored_data_commitment == self.data_commitment
        {
            Ok(())
        } else {
            Err(VerificationError::CommitmentMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;
    use crate::{
        group::{ElementOps, Ristretto, ScalarOps},
        Keypair,
    };

    type Scalar = <Ristretto as ScalarOps>::Scalar;
    type Element = <Ristretto as ElementOps>::Element;

    struct Fixture {
        keypair: Keypair<Ristretto>,
        extended_base_hash: Scalar,
        ciphertext: Ciphertext<Ristretto>,
        partial_decryption: Element,
    }

    impl Fixture {
        fn new() -> Self {
            let mut rng = thread_rng();
            let keypair = Keypair::generate(&mut rng);
            let joint = Keypair::<Ristretto>::generate(&mut rng);
            let ciphertext = Ciphertext::encrypt(1, joint.public(), &mut rng);
            let partial_decryption = ciphertext.partial_decrypt(keypair.secret());
            Self {
                keypair,
                extended_base_hash: Ristretto::generate_scalar(&mut rng),
                ciphertext,
                partial_decryption,
            }
        }

        fn prove(&self, kind: ProofKind, seed: Option<&Scalar>) -> ChaumPedersenProof<Ristretto> {
            ChaumPedersenProof::new(
                kind,
                &self.extended_base_hash,
                self.keypair.secret(),
                self.keypair.public(),
                &self.ciphertext,
                &self.partial_decryption,
                seed,
            )
        }

        fn verify(
            &self,
            proof: &ChaumPedersenProof<Ristretto>,
            kind: ProofKind,
        ) -> Result<(), VerificationError> {
            proof.verify(
                kind,
                &self.extended_base_hash,
                self.keypair.public(),
                &self.ciphertext,
                &self.partial_decryption,
            )
        }
    }

    #[test]
    fn honest_proofs_verify() {
        for _ in 0..20 {
            let fixture = Fixture::new();
            for kind in [ProofKind::Direct, ProofKind::Compensated] {
                let proof = fixture.prove(kind, None);
                fixture.verify(&proof, kind).unwrap();
            }
        }
    }

    #[test]
    fn proof_kinds_are_not_interchangeable() {
        let fixture = Fixture::new();
        let proof = fixture.prove(ProofKind::Direct, None);
        assert_eq!(
            fixture.verify(&proof, ProofKind::Compensated).unwrap_err(),
            VerificationError::ChallengeMismatch
        );
    }

    #[test]
    fn proof_for_wrong_partial_decryption_does_not_verify() {
        let mut rng = thread_rng();
        let mut fixture = Fixture::new();
        let other_secret = crate::SecretKey::<Ristretto>::generate(&mut rng);
        fixture.partial_decryption = fixture.ciphertext.partial_decrypt(&other_secret);

        let proof = fixture.prove(ProofKind::Direct, None);
        assert_eq!(
            fixture.verify(&proof, ProofKind::Direct).unwrap_err(),
            VerificationError::CommitmentMismatch
        );
    }

    #[test]
    fn proof_is_bound_to_extended_base_hash() {
        let mut fixture = Fixture::new();
        let proof = fixture.prove(ProofKind::Direct, None);
        fixture.extended_base_hash = fixture.extended_base_hash + fixture.extended_base_hash;
        assert!(fixture.verify(&proof, ProofKind::Direct).is_err());
    }

    #[test]
    fn seeded_nonces_are_deterministic_per_statement() {
        let fixture = Fixture::new();
        let seed = Ristretto::generate_scalar(&mut thread_rng());
        let proof = fixture.prove(ProofKind::Direct, Some(&seed));
        let same_proof = fixture.prove(ProofKind::Direct, Some(&seed));
        assert_eq!(proof.pad_commitment, same_proof.pad_commitment);
        assert_eq!(proof.response, same_proof.response);
        fixture.verify(&proof, ProofKind::Direct).unwrap();

        // Same seed, different statement: the nonce must differ.
        let other_fixture = Fixture {
            keypair: fixture.keypair.clone(),
            extended_base_hash: fixture.extended_base_hash,
            ciphertext: fixture.ciphertext + fixture.ciphertext,
            partial_decryption: fixture.partial_decryption + fixture.partial_decryption,
        };
        let other_proof = other_fixture.prove(ProofKind::Direct, Some(&seed));
        other_fixture.verify(&other_proof, ProofKind::Direct).unwrap();
        assert_ne!(proof.pad_commitment, other_proof.pad_commitment);
    }
}
