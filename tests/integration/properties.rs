//! Algebraic properties the threshold scheme relies on.

use rand::{seq::IteratorRandom, thread_rng, Rng};
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;

use crate::{assert_ct_eq, create_trustees};
use guardian_elgamal::{
    group::Group,
    polynomial::{
        lagrange_coefficient, lagrange_coefficients, recovery_public_key, verify_point,
        ElectionPolynomial,
    },
    ChaumPedersenProof, Ciphertext, DiscreteLogTable, Keypair, Params, ProofKind, PublicKey,
    SchnorrProof, SecretKey,
};

/// Values of a polynomial at any `k` points determine its value at every other point.
fn test_lagrange_identity<G: Group>() {
    let mut rng = thread_rng();
    for quorum in 1..=5 {
        let polynomial = ElectionPolynomial::<G>::generate(quorum, &mut rng);
        let coordinates: Vec<u32> = (1..20_u32).choose_multiple(&mut rng, quorum + 1);
        let (&target, points) = coordinates.split_last().unwrap();

        let coefficients: Vec<_> = points
            .iter()
            .map(|&x| {
                let others: Vec<_> = points.iter().copied().filter(|&y| y != x).collect();
                // Interpolate at `target` by shifting coordinates.
                let shifted = |z: u32| {
                    G::Scalar::from(u64::from(z)) - G::Scalar::from(u64::from(target))
                };
                let (numerator, denominator) = others.iter().fold(
                    (G::Scalar::from(1), G::Scalar::from(1)),
                    |(num, den), &other| {
                        (num * shifted(other), den * (shifted(other) - shifted(x)))
                    },
                );
                numerator * G::invert_scalar(denominator)
            })
            .collect();
        let interpolated = points
            .iter()
            .zip(&coefficients)
            .fold(G::Scalar::from(0), |acc, (&x, coefficient)| {
                acc + *polynomial.evaluate(x).expose_scalar() * *coefficient
            });
        assert_eq!(interpolated, *polynomial.evaluate(target).expose_scalar());

        // Interpolation at zero recovers the election secret key, both for scalars
        // and in the exponent.
        let at_zero = lagrange_coefficients::<G>(points);
        let secret = points
            .iter()
            .zip(&at_zero)
            .fold(G::Scalar::from(0), |acc, (&x, coefficient)| {
                acc + *polynomial.evaluate(x).expose_scalar() * *coefficient
            });
        let expected_key = polynomial.election_public_key();
        assert_ct_eq(&G::mul_generator(&secret), &expected_key.as_element());

        let commitments = polynomial.coefficient_commitments();
        let recovery_keys = points.iter().map(|&x| recovery_public_key::<G>(x, commitments));
        let key = G::vartime_multi_mul(&at_zero, recovery_keys);
        assert_ct_eq(&key, &expected_key.as_element());

        for (i, &x) in points.iter().enumerate() {
            let others: Vec<_> = points.iter().copied().filter(|&y| y != x).collect();
            assert_eq!(at_zero[i], lagrange_coefficient::<G>(x, &others));
        }
    }
}

fn test_backup_values_match_commitments<G: Group>() {
    let mut rng = thread_rng();
    let seed = SecretKey::<G>::generate(&mut rng);
    let polynomial = ElectionPolynomial::from_seed(3, &seed, &mut rng);
    let commitments = polynomial.coefficient_commitments();

    for x in 1..10 {
        let value = polynomial.evaluate(x);
        assert!(verify_point(&value, x, commitments));
        assert!(!verify_point(&value, x + 1, commitments));
        assert_ct_eq(
            &recovery_public_key::<G>(x, commitments),
            &PublicKey::from(&value).as_element(),
        );
    }
    assert!(!verify_point(&polynomial.evaluate(1), 1, &[]));

    // Coefficients of a seeded polynomial are `seed + i`.
    let constant = polynomial.election_keypair();
    assert_eq!(constant.secret().expose_scalar(), seed.expose_scalar());
    let same_polynomial = ElectionPolynomial::from_seed(3, &seed, &mut rng);
    assert_eq!(
        same_polynomial.coefficient_commitments(),
        polynomial.coefficient_commitments()
    );
}

fn test_homomorphic_addition<G: Group>() {
    let mut rng = ChaChaRng::from_seed([7; 32]);
    let keypair = Keypair::<G>::generate(&mut rng);
    let lookup_table = DiscreteLogTable::<G>::new(0..=100);

    for _ in 0..20 {
        let votes: Vec<u64> = (0..10).map(|_| rng.gen_range(0..=1)).collect();
        let sum: Ciphertext<G> = votes
            .iter()
            .map(|&vote| Ciphertext::encrypt(vote, keypair.public(), &mut rng))
            .sum();
        let decrypted = sum.decrypt(keypair.secret());
        assert_eq!(lookup_table.get(&decrypted), Some(votes.iter().sum()));

        let mut accumulated = Ciphertext::<G>::zero();
        for &vote in &votes {
            accumulated += Ciphertext::encrypt(vote, keypair.public(), &mut rng);
        }
        let decrypted = accumulated.decrypt(keypair.secret());
        assert_eq!(lookup_table.get(&decrypted), Some(votes.iter().sum()));
    }
}

fn test_proof_soundness<G: Group>() {
    let mut rng = thread_rng();
    let keypair = Keypair::<G>::generate(&mut rng);
    let other_keypair = Keypair::<G>::generate(&mut rng);
    let extended_base_hash = G::generate_scalar(&mut rng);

    let schnorr = SchnorrProof::new(&keypair, &mut rng);
    schnorr.verify_for(keypair.public()).unwrap();
    schnorr.verify_for(other_keypair.public()).unwrap_err();

    for _ in 0..10 {
        let value = rng.gen_range(0..5);
        let ciphertext = Ciphertext::encrypt(value, keypair.public(), &mut rng);
        let other_ciphertext = Ciphertext::encrypt(value, keypair.public(), &mut rng);
        let share = ciphertext.partial_decrypt(keypair.secret());
        let proof = ChaumPedersenProof::new(
            ProofKind::Direct,
            &extended_base_hash,
            keypair.secret(),
            keypair.public(),
            &ciphertext,
            &share,
            None,
        );
        let verify = |kind, hash: &G::Scalar, key: &PublicKey<G>, ciphertext, share| {
            proof.verify(kind, hash, key, ciphertext, share)
        };

        verify(ProofKind::Direct, &extended_base_hash, keypair.public(), &ciphertext, &share)
            .unwrap();
        let other_hash = G::generate_scalar(&mut rng);
        verify(ProofKind::Direct, &other_hash, keypair.public(), &ciphertext, &share).unwrap_err();
        verify(
            ProofKind::Compensated,
            &extended_base_hash,
            keypair.public(),
            &ciphertext,
            &share,
        )
        .unwrap_err();
        verify(
            ProofKind::Direct,
            &extended_base_hash,
            other_keypair.public(),
            &ciphertext,
            &share,
        )
        .unwrap_err();
        verify(
            ProofKind::Direct,
            &extended_base_hash,
            keypair.public(),
            &other_ciphertext,
            &share,
        )
        .unwrap_err();
        let wrong_share = share + G::generator();
        verify(
            ProofKind::Direct,
            &extended_base_hash,
            keypair.public(),
            &ciphertext,
            &wrong_share,
        )
        .unwrap_err();

        // A proof made with a mismatched secret does not verify either.
        let forged_share = ciphertext.partial_decrypt(other_keypair.secret());
        let forged_proof = ChaumPedersenProof::new(
            ProofKind::Direct,
            &extended_base_hash,
            other_keypair.secret(),
            keypair.public(),
            &ciphertext,
            &forged_share,
            None,
        );
        forged_proof
            .verify(
                ProofKind::Direct,
                &extended_base_hash,
                keypair.public(),
                &ciphertext,
                &forged_share,
            )
            .unwrap_err();
    }
}

fn test_backups_are_idempotent<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let mut trustees = create_trustees::<G>(params, &mut rng);
    let keys: Vec<_> = trustees.iter().map(|trustee| trustee.share_public_keys()).collect();
    for trustee in &mut trustees {
        for key_set in &keys {
            if key_set.owner_id() != trustee.id() {
                trustee.receive_public_keys(key_set.clone()).unwrap();
            }
        }
    }

    let first = trustees[0].send_partial_key_backup("guardian-2").unwrap();
    let second = trustees[0].send_partial_key_backup("guardian-2").unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.encrypted_coordinate.as_bytes(),
        second.encrypted_coordinate.as_bytes()
    );
    let other = trustees[0].send_partial_key_backup("guardian-3").unwrap();
    assert_ne!(first.encrypted_coordinate, other.encrypted_coordinate);
}

mod ristretto {
    use super::*;
    use guardian_elgamal::group::Ristretto;

    #[test]
    fn lagrange_identity() {
        test_lagrange_identity::<Ristretto>();
    }

    #[test]
    fn backup_values_match_commitments() {
        test_backup_values_match_commitments::<Ristretto>();
    }

    #[test]
    fn homomorphic_addition() {
        test_homomorphic_addition::<Ristretto>();
    }

    #[test]
    fn proof_soundness() {
        test_proof_soundness::<Ristretto>();
    }

    #[test]
    fn backups_are_idempotent() {
        test_backups_are_idempotent::<Ristretto>();
    }
}
