//! Tests focused on tally decryption.

use rand::{seq::SliceRandom, thread_rng, Rng};

use crate::{assert_ct_eq, encrypt_ballot, run_ceremony, selection_id, tally_shape};
use guardian_elgamal::{
    decryption::{
        DecryptingGuardian, DecryptingTrustee, DecryptingTrusteeProxy, DecryptionMediator, Error,
        ShareProof,
    },
    group::Group,
    tally::{BallotState, CiphertextTally, PlaintextTally, TallyBuilder},
    DiscreteLogTable, ElectionContext, Params,
};

struct Election<G: Group> {
    context: ElectionContext<G>,
    trustees: Vec<DecryptingTrustee<G>>,
    tally: CiphertextTally<G>,
    spoiled_ballots: Vec<CiphertextTally<G>>,
    /// Expected counts keyed by contest, then by selection index.
    expected: Vec<(&'static str, Vec<u64>)>,
    lookup_table: DiscreteLogTable<G>,
}

impl<G: Group> Election<G> {
    const CONTESTS: [(&'static str, usize); 2] = [("mayor", 3), ("measure-7", 2)];

    fn new(params: Params, ballot_count: usize, spoiled_count: usize) -> Self {
        let mut rng = thread_rng();
        let (context, trustees) = run_ceremony::<G>(params, &mut rng);
        let mut builder = TallyBuilder::new("tally", tally_shape(&Self::CONTESTS));

        let mut expected: Vec<_> = Self::CONTESTS
            .iter()
            .map(|&(contest_id, options)| (contest_id, vec![0_u64; options]))
            .collect();
        let ballots = (0..ballot_count + spoiled_count).map(|i| {
            let state = if i < ballot_count {
                BallotState::Cast
            } else {
                BallotState::Spoiled
            };
            // One vote per contest.
            let votes: Vec<_> = Self::CONTESTS
                .iter()
                .zip(&mut expected)
                .map(|(&(contest_id, options), (_, counts))| {
                    let choice = rng.gen_range(0..options);
                    if state == BallotState::Cast {
                        counts[choice] += 1;
                    }
                    let mut votes = vec![0_u64; options];
                    votes[choice] = 1;
                    (contest_id, votes)
                })
                .collect();
            let votes: Vec<_> = votes
                .iter()
                .map(|(contest_id, votes)| (*contest_id, votes.as_slice()))
                .collect();
            let id = format!("ballot-{i}");
            encrypt_ballot(&id, state, &votes, context.joint_public_key(), &mut rng)
        });
        let appended = builder.batch_append(ballots.collect::<Vec<_>>());
        assert_eq!(appended, ballot_count + spoiled_count);
        assert_eq!(builder.cast_count(), ballot_count);
        let (tally, spoiled_ballots) = builder.build();
        assert_eq!(spoiled_ballots.len(), spoiled_count);

        Self {
            context,
            trustees,
            tally,
            spoiled_ballots,
            expected,
            lookup_table: DiscreteLogTable::new(0..=ballot_count as u64),
        }
    }

    fn proxies(&self) -> Vec<DecryptingTrusteeProxy<'_, G>> {
        self.trustees.iter().map(DecryptingTrusteeProxy::new).collect()
    }

    fn mediator(&self) -> DecryptionMediator<'_, G> {
        DecryptionMediator::new(
            &self.context,
            &self.tally,
            &self.spoiled_ballots,
            &self.lookup_table,
        )
    }

    fn assert_counts(&self, plaintext: &PlaintextTally<G>) {
        for (contest_id, counts) in &self.expected {
            for (i, &count) in counts.iter().enumerate() {
                assert_eq!(
                    plaintext.count(contest_id, &selection_id(i)),
                    Some(count),
                    "{contest_id}/{i}"
                );
            }
        }
    }
}

fn test_decryption_with_all_guardians<G: Group>() {
    let election = Election::<G>::new(Params::new(3, 2), 10, 0);
    let proxies = election.proxies();
    let mut mediator = election.mediator();
    for proxy in &proxies {
        mediator.announce(proxy).unwrap();
    }

    let plaintext = mediator.get_plaintext_tally().unwrap();
    election.assert_counts(&plaintext);
    let selection = &plaintext.contests["mayor"].selections[&selection_id(0)];
    assert_eq!(selection.shares.len(), 3);
    assert!(selection
        .shares
        .iter()
        .all(|share| matches!(share.proof, ShareProof::Direct(_))));
}

fn test_decryption_with_missing_guardian<G: Group>() {
    // 3 guardians, quorum 2; votes {1, 0, 1} for a single selection; guardian 3 is missing.
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let (context, trustees) = run_ceremony::<G>(params, &mut rng);
    let mut builder = TallyBuilder::new("tally", tally_shape(&[("referendum", 1)]));
    for (i, vote) in [1_u64, 0, 1].into_iter().enumerate() {
        let votes: [(&str, &[u64]); 1] = [("referendum", &[vote])];
        let ballot = encrypt_ballot(
            &format!("ballot-{i}"),
            BallotState::Cast,
            &votes,
            context.joint_public_key(),
            &mut rng,
        );
        builder.append(ballot).unwrap();
    }
    let (tally, _) = builder.build();
    let lookup_table = DiscreteLogTable::new(0..=3);

    let proxies: Vec<_> = trustees.iter().map(DecryptingTrusteeProxy::new).collect();
    let mut mediator = DecryptionMediator::new(&context, &tally, &[], &lookup_table);
    mediator.announce(&proxies[0]).unwrap();
    mediator.announce(&proxies[1]).unwrap();
    assert_eq!(
        mediator.missing_guardians().collect::<Vec<_>>(),
        ["guardian-3"]
    );

    let plaintext = mediator.get_plaintext_tally().unwrap();
    assert_eq!(plaintext.count("referendum", &selection_id(0)), Some(2));
    let selection = &plaintext.contests["referendum"].selections[&selection_id(0)];
    let reconstructed = &selection.shares[2];
    assert_eq!(reconstructed.guardian_id, "guardian-3");
    let ShareProof::Reconstructed(parts) = &reconstructed.proof else {
        panic!("unexpected proof: {:?}", reconstructed.proof);
    };
    assert_eq!(parts.keys().collect::<Vec<_>>(), ["guardian-1", "guardian-2"]);
    for (guardian_id, part) in parts {
        assert_eq!(part.guardian_id, *guardian_id);
        assert_eq!(part.missing_guardian_id, "guardian-3");
    }
}

/// Every subset of guardians of size at least the quorum must reconstruct exactly
/// the shares that missing guardians would have produced.
fn test_decryption_with_all_quorum_subsets<G: Group>() {
    let params = Params::new(4, 2);
    let election = Election::<G>::new(params, 5, 0);
    let proxies = election.proxies();

    let mut mediator = election.mediator();
    for proxy in &proxies {
        mediator.announce(proxy).unwrap();
    }
    let reference = mediator.get_plaintext_tally().unwrap();

    for mask in 0_u32..(1 << params.guardians) {
        let available = mask.count_ones() as usize;
        let mut mediator = election.mediator();
        for (i, proxy) in proxies.iter().enumerate() {
            if mask & (1 << i) != 0 {
                mediator.announce(proxy).unwrap();
            }
        }

        if available < params.quorum {
            let err = mediator.get_plaintext_tally().unwrap_err();
            assert_eq!(
                err,
                Error::InsufficientGuardians {
                    available,
                    quorum: params.quorum
                }
            );
            continue;
        }
        let plaintext = mediator.get_plaintext_tally().unwrap();
        election.assert_counts(&plaintext);

        for (contest_id, contest) in &plaintext.contests {
            for (selection_id, selection) in &contest.selections {
                let expected = &reference.contests[contest_id].selections[selection_id];
                for (share, expected_share) in selection.shares.iter().zip(&expected.shares) {
                    assert_eq!(share.guardian_id, expected_share.guardian_id);
                    assert_ct_eq(&share.share, &expected_share.share);
                }
            }
        }
    }
}

fn test_insufficient_guardians<G: Group>() {
    let election = Election::<G>::new(Params::new(3, 2), 3, 1);
    let proxies = election.proxies();
    let mut mediator = election.mediator();
    mediator.announce(&proxies[1]).unwrap();

    let expected_err = Error::InsufficientGuardians {
        available: 1,
        quorum: 2,
    };
    assert_eq!(mediator.get_plaintext_tally().unwrap_err(), expected_err);
    assert_eq!(mediator.get_plaintext_ballots().unwrap_err(), expected_err);
    assert_eq!(mediator.decrypt_spoiled_ballots().unwrap_err(), expected_err);
}

fn test_repeated_and_unknown_announcements<G: Group>() {
    let election = Election::<G>::new(Params::new(3, 2), 2, 0);
    let other_election = Election::<G>::new(Params::new(4, 2), 2, 0);
    let proxies = election.proxies();
    let other_proxies = other_election.proxies();

    let mut mediator = election.mediator();
    mediator.announce(&proxies[0]).unwrap();
    let err = mediator.announce(&proxies[0]).unwrap_err();
    assert_eq!(err, Error::DuplicateAnnouncement("guardian-1".to_owned()));

    let err = mediator.announce(&other_proxies[3]).unwrap_err();
    assert_eq!(err, Error::UnknownGuardian("guardian-4".to_owned()));
    let err = mediator.announce(&other_proxies[2]).unwrap_err();
    assert_eq!(err, Error::GuardianMismatch("guardian-3".to_owned()));

    assert_eq!(
        mediator.available_guardians().collect::<Vec<_>>(),
        ["guardian-1"]
    );
    assert_eq!(
        mediator.missing_guardians().collect::<Vec<_>>(),
        ["guardian-2", "guardian-3"]
    );
}

fn test_spoiled_ballots_decryption<G: Group>() {
    let election = Election::<G>::new(Params::new(5, 3), 4, 3);
    let mut proxies = election.proxies();
    proxies.shuffle(&mut thread_rng());

    let mut mediator = election.mediator();
    for proxy in &proxies[..3] {
        mediator.announce(proxy).unwrap();
    }
    let ballots = mediator.get_plaintext_ballots().unwrap();
    assert_eq!(ballots.len(), 3);
    for (ballot_id, ballot) in &ballots {
        let ballot = ballot.as_ref().unwrap();
        assert_eq!(ballot.object_id, *ballot_id);
        // Each spoiled ballot contains exactly one vote per contest.
        for (contest_id, contest) in &ballot.contests {
            let total: u64 = contest.selections.values().map(|s| s.tally).sum();
            assert_eq!(total, 1, "{ballot_id}/{contest_id}");
        }
    }

    let decrypted = mediator.decrypt_spoiled_ballots().unwrap();
    let ids: Vec<_> = decrypted.iter().map(|ballot| ballot.object_id.as_str()).collect();
    assert_eq!(ids, ["ballot-4", "ballot-5", "ballot-6"]);

    // The tally is decryptable with the same set of guardians.
    let plaintext = mediator.get_plaintext_tally().unwrap();
    election.assert_counts(&plaintext);
}

fn test_guardian_without_backup_cannot_compensate<G: Group>() {
    let election = Election::<G>::new(Params::new(3, 2), 2, 0);
    let trustee = &election.trustees[0];
    let proxy = DecryptingTrusteeProxy::new(trustee);
    let ciphertext = election.tally.contests["mayor"].selections[&selection_id(0)];

    let err = proxy
        .compensated_decrypt(
            "guardian-1",
            &ciphertext,
            election.context.extended_base_hash(),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::MissingBackup { .. }));

    let err = proxy.recover_public_key("guardian-9").unwrap_err();
    assert_eq!(err, Error::UnknownGuardian("guardian-9".to_owned()));
}

mod ristretto {
    use super::*;
    use guardian_elgamal::group::Ristretto;

    #[test]
    fn decryption_with_all_guardians() {
        test_decryption_with_all_guardians::<Ristretto>();
    }

    #[test]
    fn decryption_with_missing_guardian() {
        test_decryption_with_missing_guardian::<Ristretto>();
    }

    #[test]
    fn decryption_with_all_quorum_subsets() {
        test_decryption_with_all_quorum_subsets::<Ristretto>();
    }

    #[test]
    fn insufficient_guardians() {
        test_insufficient_guardians::<Ristretto>();
    }

    #[test]
    fn repeated_and_unknown_announcements() {
        test_repeated_and_unknown_announcements::<Ristretto>();
    }

    #[test]
    fn spoiled_ballots_decryption() {
        test_spoiled_ballots_decryption::<Ristretto>();
    }

    #[test]
    fn guardian_without_backup_cannot_compensate() {
        test_guardian_without_backup_cannot_compensate::<Ristretto>();
    }
}
