//! End-to-end tests for the key ceremony and decryption, generic over the `Group` implementation.

use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use tracing_subscriber::EnvFilter;

use std::{collections::BTreeMap, fmt};

use guardian_elgamal::{
    decryption::DecryptingTrustee,
    group::Group,
    key_ceremony::{
        KeyCeremonyGuardian, KeyCeremonyMediator, KeyCeremonyTrustee, KeyCeremonyTrusteeProxy,
    },
    tally::{BallotState, CiphertextBallot, CiphertextContest},
    Ciphertext, ElectionContext, Params, PublicKey,
};

mod decryption;
mod key_ceremony;
mod properties;

pub const MANIFEST_HASH: &[u8] = b"manifest: general election";

pub fn assert_ct_eq<T: ConstantTimeEq + fmt::Debug>(x: &T, y: &T) {
    assert!(
        bool::from(x.ct_eq(y)),
        "Values are not equal: {:?}, {:?}",
        x,
        y
    );
}

/// Installs a subscriber printing crate events filtered by `RUST_LOG` (only errors
/// by default). Output is captured by the test harness. This function is idempotent.
pub fn init_tracing() {
    // Fails if another test has already installed the subscriber, which is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .without_time()
        .compact()
        .try_init();
}

/// Creates trustees with IDs `guardian-{x}` for coordinates `1..=n`.
pub fn create_trustees<G: Group>(
    params: Params,
    rng: &mut (impl RngCore + CryptoRng),
) -> Vec<KeyCeremonyTrustee<G>> {
    init_tracing();
    (1..=params.guardians as u32)
        .map(|x| KeyCeremonyTrustee::new(format!("guardian-{x}"), x, params, rng).unwrap())
        .collect()
}

pub fn proxies<G: Group>(
    trustees: &mut [KeyCeremonyTrustee<G>],
) -> Vec<Box<dyn KeyCeremonyGuardian<G> + '_>> {
    trustees
        .iter_mut()
        .map(|trustee| {
            Box::new(KeyCeremonyTrusteeProxy::new(trustee)) as Box<dyn KeyCeremonyGuardian<G> + '_>
        })
        .collect()
}

/// Runs the key ceremony among honest guardians.
pub fn run_ceremony<G: Group>(
    params: Params,
    rng: &mut (impl RngCore + CryptoRng),
) -> (ElectionContext<G>, Vec<DecryptingTrustee<G>>) {
    let mut trustees = create_trustees::<G>(params, rng);
    let context = KeyCeremonyMediator::new(params, proxies(&mut trustees))
        .unwrap()
        .run(MANIFEST_HASH)
        .unwrap();
    let trustees = trustees
        .into_iter()
        .map(|trustee| trustee.into_decrypting_trustee().unwrap())
        .collect();
    (context, trustees)
}

/// Encrypts a ballot with the specified votes per `(contest, selection)`.
pub fn encrypt_ballot<G: Group>(
    object_id: &str,
    state: BallotState,
    votes: &[(&str, &[u64])],
    key: &PublicKey<G>,
    rng: &mut (impl RngCore + CryptoRng),
) -> CiphertextBallot<G> {
    let contests = votes
        .iter()
        .map(|&(contest_id, selection_votes)| {
            let selections = selection_votes
                .iter()
                .enumerate()
                .map(|(i, &vote)| (selection_id(i), Ciphertext::encrypt(vote, key, rng)))
                .collect();
            let contest = CiphertextContest {
                object_id: contest_id.to_owned(),
                selections,
            };
            (contest_id.to_owned(), contest)
        })
        .collect::<BTreeMap<_, _>>();

    CiphertextBallot {
        object_id: object_id.to_owned(),
        state,
        contests,
    }
}

pub fn selection_id(index: usize) -> String {
    format!("option-{index}")
}

/// Returns tally shape for [`TallyBuilder::new()`](guardian_elgamal::tally::TallyBuilder::new()).
pub fn tally_shape(contests: &[(&str, usize)]) -> Vec<(String, Vec<String>)> {
    contests
        .iter()
        .map(|&(contest_id, options)| {
            let selection_ids = (0..options).map(selection_id).collect();
            (contest_id.to_owned(), selection_ids)
        })
        .collect()
}
