//! Polynomial secret sharing used by guardians (Feldman's verifiable secret sharing).
//!
//! Each guardian generates a secret polynomial `P(x) = a_0 + a_1 x + ... + a_{k-1} x^{k-1}`
//! of degree `k - 1`, where `k` is the quorum. `a_0` is the guardian's election secret key.
//! The guardian publishes commitments `C_i = [a_i]G` with a [`SchnorrProof`] for each,
//! and hands `P(x_j)` to the guardian with coordinate `x_j`. The recipient checks
//! the value against the commitments without learning anything else about the polynomial.

use rand_core::{CryptoRng, RngCore};

use core::fmt;

use crate::{group::Group, Keypair, PublicKey, SchnorrProof, SecretKey};

/// Secret polynomial of a single guardian together with its public commitments and
/// proofs of knowledge of each coefficient.
pub struct ElectionPolynomial<G: Group> {
    coefficients: Vec<SecretKey<G>>,
    commitments: Vec<G::Element>,
    proofs: Vec<SchnorrProof<G>>,
}

impl<G: Group> fmt::Debug for ElectionPolynomial<G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ElectionPolynomial")
            .field("commitments", &self.commitments)
            .finish_non_exhaustive()
    }
}

impl<G: Group> ElectionPolynomial<G> {
    /// Generates a random polynomial for the specified `quorum`, i.e., a polynomial
    /// with `quorum` coefficients.
    ///
    /// # Panics
    ///
    /// Panics if `quorum` is zero.
    pub fn generate<R: CryptoRng + RngCore>(quorum: usize, rng: &mut R) -> Self {
        assert!(quorum > 0, "quorum must be positive");
        let coefficients = (0..quorum).map(|_| SecretKey::generate(rng)).collect();
        Self::from_coefficients(coefficients, rng)
    }

    /// Generates a polynomial deterministically from `seed`: coefficient `i` is `seed + i`.
    /// Proofs of knowledge still use fresh randomness from `rng`.
    ///
    /// This is only useful for reproducible tests; the coefficients are trivially related
    /// to each other.
    ///
    /// # Panics
    ///
    /// Panics if `quorum` is zero.
    pub fn from_seed<R: CryptoRng + RngCore>(
        quorum: usize,
        seed: &SecretKey<G>,
        rng: &mut R,
    ) -> Self {
        assert!(quorum > 0, "quorum must be positive");
        let coefficients = (0..quorum as u64)
            .map(|i| SecretKey::new(*seed.expose_scalar() + G::Scalar::from(i)))
            .collect();
        Self::from_coefficients(coefficients, rng)
    }

    fn from_coefficients<R: CryptoRng + RngCore>(
        coefficients: Vec<SecretKey<G>>,
        rng: &mut R,
    ) -> Self {
        let keypairs: Vec<_> = coefficients.iter().cloned().map(Keypair::from).collect();
        let commitments = keypairs
            .iter()
            .map(|keypair| keypair.public().as_element())
            .collect();
        let proofs = keypairs
            .iter()
            .map(|keypair| SchnorrProof::new(keypair, rng))
            .collect();

        Self {
            coefficients,
            commitments,
            proofs,
        }
    }

    /// Returns the number of coefficients in this polynomial, which is equal to the quorum.
    pub fn quorum(&self) -> usize {
        self.coefficients.len()
    }

    /// Returns commitments `[a_i]G` to the polynomial coefficients.
    pub fn coefficient_commitments(&self) -> &[G::Element] {
        &self.commitments
    }

    /// Returns proofs of knowledge for each polynomial coefficient.
    pub fn coefficient_proofs(&self) -> &[SchnorrProof<G>] {
        &self.proofs
    }

    /// Returns the election keypair of the guardian, which is formed by the constant
    /// coefficient of the polynomial.
    pub fn election_keypair(&self) -> Keypair<G> {
        Keypair::from(self.coefficients[0].clone())
    }

    /// Returns the election public key of the guardian, i.e., the commitment to the constant
    /// coefficient of the polynomial.
    pub fn election_public_key(&self) -> PublicKey<G> {
        PublicKey::from_element(self.commitments[0])
    }

    /// Evaluates the polynomial at `x` using Horner's method.
    pub fn evaluate(&self, x: u32) -> SecretKey<G> {
        let x = G::Scalar::from(u64::from(x));
        let mut value = SecretKey::new(G::Scalar::from(0));
        for coefficient in self.coefficients.iter().rev() {
            value = &value * &x + coefficient.clone();
        }
        value
    }
}

/// Computes `Σ [x^i]C_i` for the commitments `C_i` of a polynomial `P`. The result equals
/// `[P(x)]G`; for the coordinate of a guardian, it is the public key matching the backup
/// coordinate this guardian holds for the polynomial owner (aka *recovery public key*).
pub fn recovery_public_key<G: Group>(x: u32, commitments: &[G::Element]) -> G::Element {
    let x = G::Scalar::from(u64::from(x));
    let mut power = G::Scalar::from(1);
    let powers: Vec<_> = commitments
        .iter()
        .map(|_| {
            let output = power;
            power = power * x;
            output
        })
        .collect();
    G::vartime_multi_mul(&powers, commitments.iter().copied())
}

/// Checks that `value` lies on the polynomial with the specified `commitments` at point `x`,
/// i.e., that `[value]G == Σ [x^i]C_i`.
pub fn verify_point<G: Group>(value: &SecretKey<G>, x: u32, commitments: &[G::Element]) -> bool {
    if commitments.is_empty() {
        return false;
    }
    G::vartime_mul_generator(value.expose_scalar()) == recovery_public_key::<G>(x, commitments)
}

/// Computes the Lagrange coefficient at zero for the guardian with coordinate `x` given
/// the coordinates of `others` participating in the reconstruction:
///
/// ```text
/// w = Π x_j / Π (x_j - x)
/// ```
///
/// All coordinates must be non-zero and distinct.
///
/// # Panics
///
/// Panics if `others` contains `x`; the coefficient is undefined in this case.
pub fn lagrange_coefficient<G: Group>(x: u32, others: &[u32]) -> G::Scalar {
    assert!(!others.contains(&x), "coordinate {x} is among other coordinates");

    let x = G::Scalar::from(u64::from(x));
    let (numerator, denominator) = others.iter().fold(
        (G::Scalar::from(1), G::Scalar::from(1)),
        |(numerator, denominator), &other| {
            let other = G::Scalar::from(u64::from(other));
            (numerator * other, denominator * (other - x))
        },
    );
    numerator * G::invert_scalar(denominator)
}

/// Computes Lagrange coefficients at zero for all `coordinates` at once. The output
/// has the same order as `coordinates`.
///
/// All coordinates must be non-zero and distinct.
pub fn lagrange_coefficients<G: Group>(coordinates: &[u32]) -> Vec<G::Scalar> {
    let scalars: Vec<_> = coordinates
        .iter()
        .map(|&x| G::Scalar::from(u64::from(x)))
        .collect();
    let (numerators, mut denominators): (Vec<_>, Vec<_>) = scalars
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            scalars
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(
                    (G::Scalar::from(1), G::Scalar::from(1)),
                    |(numerator, denominator), (_, &other)| {
                        (numerator * other, denominator * (other - x))
                    },
                )
        })
        .unzip();
    G::invert_scalars(&mut denominators);

    numerators
        .into_iter()
        .zip(denominators)
        .map(|(numerator, inverse)| numerator * inverse)
        .collect()
}
