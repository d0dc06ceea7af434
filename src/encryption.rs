//! `Ciphertext` and closely related types.

use rand_core::{CryptoRng, RngCore};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::{collections::HashMap, fmt, iter, marker::PhantomData, ops};

#[cfg(feature = "serde")]
use crate::serde::ElementHelper;
use crate::{group::Group, PublicKey, SecretKey};

/// Exponential ElGamal ciphertext `(A, B) = ([r]G, [v]G + [r]K)` encrypting a small
/// integer `v` (e.g., a vote) for the public key `K`.
///
/// Ciphertexts are additively homomorphic: adding two ciphertexts component-wise yields
/// an encryption of the sum of plaintexts. This is how cast ballots are accumulated into
/// a tally.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct Ciphertext<G: Group> {
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    pad: G::Element,
    #[cfg_attr(feature = "serde", serde(with = "ElementHelper::<G>"))]
    data: G::Element,
}

impl<G: Group> fmt::Debug for Ciphertext<G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ciphertext")
            .field("pad", &self.pad)
            .field("data", &self.data)
            .finish()
    }
}

impl<G: Group> PartialEq for Ciphertext<G> {
    fn eq(&self, other: &Self) -> bool {
        self.pad == other.pad && self.data == other.data
    }
}

impl<G: Group> Ciphertext<G> {
    /// Encrypts `value` for the `receiver` using a fresh nonce.
    pub fn encrypt<R: CryptoRng + RngCore>(
        value: u64,
        receiver: &PublicKey<G>,
        rng: &mut R,
    ) -> Self {
        let nonce = SecretKey::<G>::generate(rng);
        Self::encrypt_with_nonce(value, &nonce, receiver)
    }

    /// Encrypts `value` for the `receiver` using the specified `nonce`. The nonce must not
    /// be reused for another encryption.
    pub fn encrypt_with_nonce(value: u64, nonce: &SecretKey<G>, receiver: &PublicKey<G>) -> Self {
        let value = G::Scalar::from(value);
        Self {
            pad: G::mul_generator(nonce.expose_scalar()),
            data: G::vartime_mul_generator(&value)
                + receiver.as_element() * nonce.expose_scalar(),
        }
    }

    /// Represents an encryption of zero without a blinding factor. Serves as the neutral
    /// element for tally accumulation.
    pub fn zero() -> Self {
        Self {
            pad: G::identity(),
            data: G::identity(),
        }
    }

    /// Returns the pad (aka random element) `A` of this ciphertext.
    pub fn pad(&self) -> G::Element {
        self.pad
    }

    /// Returns the data (aka blinded element) `B` of this ciphertext.
    pub fn data(&self) -> G::Element {
        self.data
    }

    /// Computes a partial decryption `M = [s]A` of this ciphertext with the given secret share.
    pub fn partial_decrypt(&self, secret: &SecretKey<G>) -> G::Element {
        self.pad * secret.expose_scalar()
    }

    /// Removes the blinding factor given the partial decryptions of all guardians,
    /// returning `[v]G = B - Σ M_i`.
    pub fn decrypt_with_shares<I>(&self, shares: I) -> G::Element
    where
        I: IntoIterator<Item = G::Element>,
    {
        let blinding = shares
            .into_iter()
            .fold(G::identity(), |acc, share| acc + share);
        self.data - blinding
    }

    /// Decrypts this ciphertext with a secret key which is known in full.
    pub fn decrypt(&self, secret: &SecretKey<G>) -> G::Element {
        self.decrypt_with_shares(iter::once(self.partial_decrypt(secret)))
    }
}

impl<G: Group> ops::Add for Ciphertext<G> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            pad: self.pad + rhs.pad,
            data: self.data + rhs.data,
        }
    }
}

impl<G: Group> ops::AddAssign for Ciphertext<G> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<G: Group> iter::Sum for Ciphertext<G> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, ciphertext| acc + ciphertext)
    }
}

/// Lookup table for discrete logarithms.
///
/// Decrypting an exponential ElGamal ciphertext yields `[v]G` rather than `v` itself.
/// Since tallies are bounded by the number of cast ballots, `v` is recovered by looking up
/// precomputed multiples of the generator.
#[derive(Debug, Clone)]
pub struct DiscreteLogTable<G: Group> {
    inner: HashMap<[u8; 8], u64>,
    contains_zero: bool,
    _group: PhantomData<G>,
}

impl<G: Group> DiscreteLogTable<G> {
    /// Creates a lookup table for the specified `values`, e.g. `0..=max_votes`.
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        let mut contains_zero = false;
        let inner = values
            .into_iter()
            .filter(|&value| {
                contains_zero |= value == 0;
                value != 0
            })
            .map(|i| {
                let element = G::vartime_mul_generator(&G::Scalar::from(i));
                (Self::key(&element), i)
            })
            .collect();

        Self {
            inner,
            contains_zero,
            _group: PhantomData,
        }
    }

    fn key(element: &G::Element) -> [u8; 8] {
        let mut bytes = vec![0_u8; G::ELEMENT_SIZE];
        G::serialize_element(element, &mut bytes);
        let mut initial_bytes = [0_u8; 8];
        initial_bytes.copy_from_slice(&bytes[..8]);
        initial_bytes
    }

    /// Gets the discrete log of `decrypted_element`, or `None` if it is not present among
    /// `values` supplied when constructing this table.
    pub fn get(&self, decrypted_element: &G::Element) -> Option<u64> {
        if G::is_identity(decrypted_element) {
            // The identity element may have a special serialization, so we check it separately.
            self.contains_zero.then_some(0)
        } else {
            let value = *self.inner.get(&Self::key(decrypted_element))?;
            // Guard against collisions in the truncated key.
            let expected = G::vartime_mul_generator(&G::Scalar::from(value));
            (expected == *decrypted_element).then_some(value)
        }
    }
}
