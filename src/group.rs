//! Traits and implementations for the prime-order group underlying the election protocol.
//!
//! The protocol is written in terms of a cyclic group `G` of prime order `q` with a fixed
//! generator. Scalars (elements of `Z/qZ`) play the role of secret coefficients, challenges,
//! responses and Lagrange coefficients; group elements play the role of public keys,
//! commitments and ciphertext components. Group operations are written additively:
//! `[x]G` is the scalar multiplication of the generator by `x`.

use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroize;

use core::{fmt, ops};

mod ristretto;

pub use self::ristretto::Ristretto;

/// Provider of random bytes for deterministic scalar derivation, such as Fiat–Shamir
/// challenges. Wraps a [`Transcript`] together with the label to squeeze bytes under.
pub struct RandomBytesProvider<'a> {
    transcript: &'a mut Transcript,
    label: &'static [u8],
}

impl fmt::Debug for RandomBytesProvider<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RandomBytesProvider")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<'a> RandomBytesProvider<'a> {
    pub(crate) fn new(transcript: &'a mut Transcript, label: &'static [u8]) -> Self {
        Self { transcript, label }
    }

    /// Fills `dest` with bytes derived from the transcript.
    pub fn fill_bytes(self, dest: &mut [u8]) {
        self.transcript.challenge_bytes(self.label, dest);
    }
}

/// Helper trait for [`Group`] that describes operations on group scalars.
pub trait ScalarOps {
    /// Scalar type. Arithmetic operations on scalars are performed in constant time.
    type Scalar: Copy
        + From<u64>
        + PartialEq
        + ops::Neg<Output = Self::Scalar>
        + ops::Add<Output = Self::Scalar>
        + ops::Sub<Output = Self::Scalar>
        + ops::Mul<Output = Self::Scalar>
        + ConditionallySelectable
        + ConstantTimeEq
        + Zeroize
        + fmt::Debug
        + Send
        + Sync;

    /// Byte size of a serialized [`Self::Scalar`].
    const SCALAR_SIZE: usize;

    /// Generates a random scalar based on the provided CSPRNG. This operation
    /// must be constant-time.
    fn generate_scalar<R: CryptoRng + RngCore>(rng: &mut R) -> Self::Scalar;

    /// Derives a scalar from random bytes (e.g., a transcript challenge). The output
    /// must be statistically close to uniform.
    fn scalar_from_random_bytes(source: RandomBytesProvider<'_>) -> Self::Scalar;

    /// Inverts the `scalar`, which is guaranteed to be non-zero.
    fn invert_scalar(scalar: Self::Scalar) -> Self::Scalar;

    /// Inverts scalars in a batch. The default implementation inverts each scalar separately.
    fn invert_scalars(scalars: &mut [Self::Scalar]) {
        for scalar in scalars {
            *scalar = Self::invert_scalar(*scalar);
        }
    }

    /// Serializes the scalar into the provided `buffer`, which is guaranteed to have length
    /// [`Self::SCALAR_SIZE`].
    fn serialize_scalar(scalar: &Self::Scalar, buffer: &mut [u8]);

    /// Deserializes the scalar from `buffer`, which is guaranteed to have length
    /// [`Self::SCALAR_SIZE`]. Returns `None` for non-canonical encodings.
    fn deserialize_scalar(buffer: &[u8]) -> Option<Self::Scalar>;
}

/// Helper trait for [`Group`] that describes operations on group elements.
pub trait ElementOps: ScalarOps {
    /// Element of the group. Arithmetic operations on elements are performed in constant time.
    type Element: Copy
        + PartialEq
        + ops::Neg<Output = Self::Element>
        + ops::Add<Output = Self::Element>
        + ops::AddAssign
        + ops::Sub<Output = Self::Element>
        + for<'a> ops::Mul<&'a Self::Scalar, Output = Self::Element>
        + ConditionallySelectable
        + ConstantTimeEq
        + fmt::Debug
        + Send
        + Sync;

    /// Byte size of a serialized [`Self::Element`].
    const ELEMENT_SIZE: usize;

    /// Returns the identity of the group.
    fn identity() -> Self::Element;

    /// Checks if the specified element is the identity.
    fn is_identity(element: &Self::Element) -> bool;

    /// Returns the agreed-upon generator of the group.
    fn generator() -> Self::Element;

    /// Serializes `element` into the provided `buffer`, which is guaranteed to have length
    /// [`Self::ELEMENT_SIZE`].
    fn serialize_element(element: &Self::Element, buffer: &mut [u8]);

    /// Deserializes an element from `buffer`, which is guaranteed to have length
    /// [`Self::ELEMENT_SIZE`]. Returns `None` if the buffer does not encode a group element.
    fn deserialize_element(buffer: &[u8]) -> Option<Self::Element>;
}

/// Prime-order group in which the discrete log problem is believed to be hard.
///
/// Groups conforming to this trait can be used for the key ceremony and threshold
/// decryption in this crate.
pub trait Group: Copy + fmt::Debug + ScalarOps + ElementOps + Send + Sync + 'static {
    /// Multiplies the provided scalar by [`ElementOps::generator()`]. This operation must be
    /// constant-time.
    fn mul_generator(k: &Self::Scalar) -> Self::Element;

    /// Multiplies the provided scalar by [`ElementOps::generator()`].
    /// Unlike [`Self::mul_generator()`], this operation does not need to be constant-time;
    /// thus, it may employ additional optimizations.
    fn vartime_mul_generator(k: &Self::Scalar) -> Self::Element;

    /// Calculates `k * k_element + r * G`, where `G` is the group generator. This operation
    /// does not need to be constant-time.
    fn vartime_double_mul_generator(
        k: &Self::Scalar,
        k_element: Self::Element,
        r: &Self::Scalar,
    ) -> Self::Element;

    /// Multiplies provided `scalars` by `elements`. This operation does not need
    /// to be constant-time.
    fn vartime_multi_mul<'a, I, J>(scalars: I, elements: J) -> Self::Element
    where
        I: IntoIterator<Item = &'a Self::Scalar>,
        J: IntoIterator<Item = Self::Element>;
}

/// Encodes a group element into a freshly allocated buffer.
pub(crate) fn element_to_bytes<G: Group>(element: &G::Element) -> Vec<u8> {
    let mut bytes = vec![0_u8; G::ELEMENT_SIZE];
    G::serialize_element(element, &mut bytes);
    bytes
}

/// Encodes a scalar into a freshly allocated buffer.
pub(crate) fn scalar_to_bytes<G: Group>(scalar: &G::Scalar) -> Vec<u8> {
    let mut bytes = vec![0_u8; G::SCALAR_SIZE];
    G::serialize_scalar(scalar, &mut bytes);
    bytes
}
