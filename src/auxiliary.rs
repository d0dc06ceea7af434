//! Auxiliary encryption used to escrow partial key backups between guardians.
//!
//! Backups are encrypted for the designated guardian with a separate *auxiliary* keypair,
//! which is unrelated to the election key. Encryption schemes are pluggable via
//! the [`AuxiliaryEncryption`] trait and are looked up by name in an [`AuxiliaryRegistry`];
//! each guardian announces the name of its scheme together with its auxiliary public key.

use merlin::Transcript;
use rand_chacha::ChaChaRng;
use rand_core::{CryptoRngCore, SeedableRng};
use subtle::ConstantTimeEq;

use std::{collections::BTreeMap, fmt};

use crate::{
    group::{element_to_bytes, Group},
    Keypair, PublicKey, SecretKey,
};

/// Opaque ciphertext produced by an [`AuxiliaryEncryption`] scheme.
#[derive(Clone, PartialEq, Eq)]
pub struct AuxiliaryCiphertext(Vec<u8>);

impl fmt::Debug for AuxiliaryCiphertext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuxiliaryCiphertext")
            .field("len", &self.0.len())
            .finish()
    }
}

impl AuxiliaryCiphertext {
    /// Wraps the provided bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the bytes of this ciphertext.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Asymmetric encryption scheme for partial key backups.
pub trait AuxiliaryEncryption<G: Group>: Send + Sync + fmt::Debug {
    /// Name of the scheme, under which it is registered in an [`AuxiliaryRegistry`].
    fn name(&self) -> &'static str;

    /// Encrypts `plaintext` for the holder of the secret key matching `recipient`.
    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &PublicKey<G>,
        rng: &mut dyn CryptoRngCore,
    ) -> AuxiliaryCiphertext;

    /// Decrypts `ciphertext` with the recipient's secret key. Returns `None` if
    /// the ciphertext is malformed, was not addressed to `secret` or was tampered with.
    fn decrypt(&self, ciphertext: &AuxiliaryCiphertext, secret: &SecretKey<G>) -> Option<Vec<u8>>;
}

/// Hashed ElGamal (aka DHIES) over the same group as election keys.
///
/// A fresh ephemeral keypair `(r, R = [r]G)` is generated for each message; the shared
/// secret `[r]K` keys a [`Transcript`] from which a keystream and a MAC key are squeezed.
/// The ciphertext is `R || tag || body`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedElGamal;

impl HashedElGamal {
    /// Name of this scheme.
    pub const NAME: &'static str = "hashed-elgamal";

    const TAG_SIZE: usize = 32;

    fn keystream_and_tag<G: Group>(
        ephemeral_key: &[u8],
        recipient: &PublicKey<G>,
        shared_secret: &G::Element,
        body: &mut [u8],
    ) -> [u8; 32] {
        let mut transcript = Transcript::new(b"aux_hashed_elgamal");
        transcript.append_message(b"R", ephemeral_key);
        transcript.append_message(b"K", recipient.as_bytes());
        transcript.append_message(b"[r]K", &element_to_bytes::<G>(shared_secret));

        let mut keystream = vec![0_u8; body.len()];
        transcript.challenge_bytes(b"keystream", &mut keystream);
        let mut mac_key = [0_u8; 32];
        transcript.challenge_bytes(b"mac_key", &mut mac_key);
        for (byte, mask) in body.iter_mut().zip(&keystream) {
            *byte ^= mask;
        }
        mac_key
    }

    fn tag(mac_key: &[u8; 32], ephemeral_key: &[u8], ciphertext_body: &[u8]) -> [u8; 32] {
        let mut transcript = Transcript::new(b"aux_hashed_elgamal_tag");
        transcript.append_message(b"key", mac_key);
        transcript.append_message(b"R", ephemeral_key);
        transcript.append_message(b"body", ciphertext_body);
        let mut tag = [0_u8; 32];
        transcript.challenge_bytes(b"tag", &mut tag);
        tag
    }
}

impl<G: Group> AuxiliaryEncryption<G> for HashedElGamal {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &PublicKey<G>,
        rng: &mut dyn CryptoRngCore,
    ) -> AuxiliaryCiphertext {
        let mut seed = [0_u8; 32];
        rng.fill_bytes(&mut seed);
        let ephemeral = Keypair::<G>::generate(&mut ChaChaRng::from_seed(seed));
        let shared_secret = recipient.as_element() * ephemeral.secret().expose_scalar();
        let ephemeral_key = ephemeral.public().as_bytes();

        let mut body = plaintext.to_vec();
        let mac_key = Self::keystream_and_tag(ephemeral_key, recipient, &shared_secret, &mut body);
        let tag = Self::tag(&mac_key, ephemeral_key, &body);

        let mut bytes = Vec::with_capacity(ephemeral_key.len() + Self::TAG_SIZE + body.len());
        bytes.extend_from_slice(ephemeral_key);
        bytes.extend_from_slice(&tag);
        bytes.extend_from_slice(&body);
        AuxiliaryCiphertext(bytes)
    }

    fn decrypt(&self, ciphertext: &AuxiliaryCiphertext, secret: &SecretKey<G>) -> Option<Vec<u8>> {
        let bytes = ciphertext.as_bytes();
        if bytes.len() < G::ELEMENT_SIZE + Self::TAG_SIZE {
            return None;
        }
        let (ephemeral_key, rest) = bytes.split_at(G::ELEMENT_SIZE);
        let (tag, body) = rest.split_at(Self::TAG_SIZE);

        let ephemeral = PublicKey::<G>::from_bytes(ephemeral_key).ok()?;
        let recipient = PublicKey::from(secret);
        let shared_secret = ephemeral.as_element() * secret.expose_scalar();

        let mut plaintext = body.to_vec();
        let mac_key =
            Self::keystream_and_tag(ephemeral_key, &recipient, &shared_secret, &mut plaintext);
        let expected_tag = Self::tag(&mac_key, ephemeral_key, body);
        if bool::from(expected_tag[..].ct_eq(tag)) {
            Some(plaintext)
        } else {
            None
        }
    }
}

/// Constructor of an auxiliary encryption scheme stored in an [`AuxiliaryRegistry`].
pub type AuxiliaryConstructor<G> = fn() -> Box<dyn AuxiliaryEncryption<G>>;

/// Explicit table of auxiliary encryption schemes keyed by name.
pub struct AuxiliaryRegistry<G: Group> {
    entries: BTreeMap<&'static str, AuxiliaryConstructor<G>>,
}

impl<G: Group> fmt::Debug for AuxiliaryRegistry<G> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.entries.keys())
            .finish()
    }
}

impl<G: Group> Clone for AuxiliaryRegistry<G> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<G: Group> Default for AuxiliaryRegistry<G> {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl<G: Group> AuxiliaryRegistry<G> {
    /// Creates a registry without any schemes.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Creates a registry with built-in schemes, i.e., [`HashedElGamal`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(HashedElGamal::NAME, || Box::new(HashedElGamal));
        registry
    }

    /// Registers a scheme under `name`, replacing any scheme previously registered under
    /// the same name.
    pub fn register(
        &mut self,
        name: &'static str,
        constructor: AuxiliaryConstructor<G>,
    ) -> &mut Self {
        self.entries.insert(name, constructor);
        self
    }

    /// Returns names of registered schemes in alphabetic order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Instantiates the scheme registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no scheme is registered under `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn AuxiliaryEncryption<G>>, UnknownScheme> {
        self.entries
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| UnknownScheme(name.to_owned()))
    }
}

/// Error returned by [`AuxiliaryRegistry::create()`] for an unregistered scheme name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScheme(pub String);

impl fmt::Display for UnknownScheme {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "auxiliary encryption scheme `{}` is not registered", self.0)
    }
}

impl std::error::Error for UnknownScheme {}
