//! Threshold key ceremony and compensated decryption for [ElGamal]-encrypted election
//! tallies, in the spirit of [ElectionGuard].
//!
//! # ⚠ Warnings
//!
//! While the logic in this crate relies on standard cryptographic assumptions
//! (complexity of discrete log and computational / decisional Diffie–Hellman problems
//! in certain groups), it has not been independently verified for correctness or absence
//! of side-channel attack vectors. **Use at your own risk.**
//!
//! # Overview
//!
//! An election is administered by `n` *guardians*; any `k` of them (the *quorum*) can decrypt
//! results, while fewer than `k` learn nothing about individual ballots.
//!
//! - [`key_ceremony`] lets guardians jointly generate the election public key using
//!   [Feldman's verifiable secret sharing][feldman-vss]. Each guardian samples a polynomial
//!   of degree `k - 1`, publishes commitments to its coefficients with [`SchnorrProof`]s,
//!   and escrows a value of the polynomial with every other guardian using an
//!   [auxiliary encryption](auxiliary) scheme. Disputed backups are resolved by public
//!   challenges. The outcome of the ceremony is an [`ElectionContext`].
//! - [`Ciphertext`]s for individual selections are homomorphically accumulated into
//!   a [tally](tally::CiphertextTally).
//! - [`decryption`] lets available guardians produce decryption shares with [`ChaumPedersenProof`]s
//!   of correctness. Shares of missing guardians are reconstructed from *compensated* shares
//!   of available ones via Lagrange interpolation, as long as a quorum is available.
//!
//! # Backends
//!
//! [`group`] module exposes a generic framework for plugging a [`Group`]
//! implementation into crypto primitives. The [`Ristretto`] implementation based on
//! Curve25519 is provided out of the box.
//!
//! # Crate features
//!
//! ## `serde`
//!
//! *(off by default)*
//!
//! Enables [`Serialize`](::serde::Serialize) / [`Deserialize`](::serde::Deserialize)
//! implementations for public records: keys, proofs, public key sets, backups, challenge
//! responses, the election context, ciphertexts, tallies and decryption shares.
//! Group scalars, elements and wrapper key types are serialized to human-readable formats
//! (JSON, YAML, TOML, etc.) as strings that represent corresponding byte buffers using
//! base64-url encoding without padding. For binary formats, byte buffers are serialized directly.
//!
//! Self-consistency checks are **not** performed on deserialization of complex types;
//! e.g., a deserialized [`ElectionContext`] is not re-verified. Such types should only be
//! deserialized from a trusted source.
//!
//! # Logging
//!
//! Orchestration steps (announcements, ceremony rounds, decryption) emit [`tracing`] events
//! and spans. Secret values are never logged; secret types have redacted `Debug` output.
//!
//! [ElGamal]: https://en.wikipedia.org/wiki/ElGamal_encryption
//! [ElectionGuard]: https://www.electionguard.vote/
//! [feldman-vss]: https://www.cs.umd.edu/~gasarch/TOPICS/secretsharing/feldmanVSS.pdf
//! [`Group`]: group::Group
//! [`Ristretto`]: group::Ristretto
//! [`tracing`]: https://docs.rs/tracing/

// Documentation settings.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(html_root_url = "https://docs.rs/guardian-elgamal/0.1.0")]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

pub mod auxiliary;
mod context;
pub mod decryption;
mod encryption;
pub mod group;
pub mod key_ceremony;
mod keys;
pub mod polynomial;
mod proofs;
#[cfg(feature = "serde")]
mod serde;
pub mod tally;

pub use crate::{
    context::{ElectionContext, GuardianRecord},
    encryption::{Ciphertext, DiscreteLogTable},
    key_ceremony::Params,
    keys::{Keypair, PublicKey, PublicKeyConversionError, SecretKey},
    proofs::{ChaumPedersenProof, ProofKind, SchnorrProof, VerificationError},
};
