//! Tests focused on the key ceremony.

use rand::thread_rng;

use crate::{create_trustees, proxies, run_ceremony, MANIFEST_HASH};
use guardian_elgamal::{
    auxiliary::{AuxiliaryCiphertext, AuxiliaryEncryption, HashedElGamal},
    group::Group,
    key_ceremony::{
        Error, KeyCeremonyGuardian, KeyCeremonyMediator, KeyCeremonyTrustee,
        KeyCeremonyTrusteeProxy, PartialKeyBackup, PartialKeyChallengeResponse,
        PartialKeyVerification, PublicKeySet,
    },
    ElectionContext, Params, PublicKey,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tampering {
    /// Flips a bit in the encrypted backup, so that it cannot be decrypted.
    Ciphertext,
    /// Encrypts a value that does not lie on the polynomial.
    WrongValue,
    /// Corrupts the backup and lies in the challenge response.
    ChallengeResponse,
}

/// Guardian that corrupts its backup for the target guardian.
struct TamperingGuardian<'a, G: Group> {
    inner: KeyCeremonyTrusteeProxy<'a, G>,
    target_id: String,
    target_keys: Option<PublicKeySet<G>>,
    tampering: Tampering,
}

impl<G: Group> KeyCeremonyGuardian<G> for TamperingGuardian<'_, G> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn x_coordinate(&self) -> u32 {
        self.inner.x_coordinate()
    }

    fn quorum(&self) -> usize {
        self.inner.quorum()
    }

    fn send_public_keys(&self) -> PublicKeySet<G> {
        self.inner.send_public_keys()
    }

    fn receive_public_keys(&mut self, keys: PublicKeySet<G>) -> Result<(), Error> {
        if keys.owner_id() == self.target_id {
            self.target_keys = Some(keys.clone());
        }
        self.inner.receive_public_keys(keys)
    }

    fn send_partial_key_backup(&mut self, designated_id: &str) -> Result<PartialKeyBackup, Error> {
        let mut backup = self.inner.send_partial_key_backup(designated_id)?;
        if designated_id != self.target_id {
            return Ok(backup);
        }

        backup.encrypted_coordinate = if self.tampering == Tampering::WrongValue {
            let honest_value = self.inner.send_backup_challenge(designated_id)?.coordinate;
            let mut plaintext = vec![0_u8; G::SCALAR_SIZE];
            G::serialize_scalar(&(honest_value + G::Scalar::from(1)), &mut plaintext);
            let target_keys = self.target_keys.as_ref().unwrap();
            AuxiliaryEncryption::<G>::encrypt(
                &HashedElGamal,
                &plaintext,
                target_keys.auxiliary_public_key(),
                &mut thread_rng(),
            )
        } else {
            let mut bytes = backup.encrypted_coordinate.as_bytes().to_vec();
            *bytes.last_mut().unwrap() ^= 1;
            AuxiliaryCiphertext::from_bytes(bytes)
        };
        Ok(backup)
    }

    fn verify_partial_key_backup(
        &mut self,
        backup: &PartialKeyBackup,
    ) -> Result<PartialKeyVerification, Error> {
        self.inner.verify_partial_key_backup(backup)
    }

    fn send_backup_challenge(
        &self,
        designated_id: &str,
    ) -> Result<PartialKeyChallengeResponse<G>, Error> {
        let mut response = self.inner.send_backup_challenge(designated_id)?;
        if self.tampering == Tampering::ChallengeResponse {
            response.coordinate = response.coordinate + G::Scalar::from(1);
        }
        Ok(response)
    }

    fn receive_challenge_response(
        &mut self,
        response: &PartialKeyChallengeResponse<G>,
    ) -> Result<PartialKeyVerification, Error> {
        self.inner.receive_challenge_response(response)
    }

    fn send_joint_public_key(&self) -> Result<PublicKey<G>, Error> {
        self.inner.send_joint_public_key()
    }
}

fn tampering_guardians<'a, G: Group>(
    trustees: &'a mut [KeyCeremonyTrustee<G>],
    tampering: Tampering,
) -> Vec<Box<dyn KeyCeremonyGuardian<G> + 'a>> {
    trustees
        .iter_mut()
        .map(|trustee| {
            let proxy = KeyCeremonyTrusteeProxy::new(trustee);
            if proxy.id() == "guardian-2" {
                Box::new(TamperingGuardian {
                    inner: proxy,
                    target_id: "guardian-3".to_owned(),
                    target_keys: None,
                    tampering,
                }) as Box<dyn KeyCeremonyGuardian<G> + 'a>
            } else {
                Box::new(proxy)
            }
        })
        .collect()
}

fn test_guardians_agree_on_joint_key<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let mut trustees = create_trustees::<G>(params, &mut rng);
    let mut mediator = KeyCeremonyMediator::new(params, proxies(&mut trustees)).unwrap();
    let context = mediator.run(MANIFEST_HASH).unwrap();
    assert_eq!(mediator.verifications().len(), 6);
    assert!(mediator.verifications().iter().all(|v| v.verified));
    drop(mediator);

    let election_keys: Vec<_> = trustees
        .iter()
        .map(KeyCeremonyTrustee::election_public_key)
        .collect();
    let expected_key = PublicKey::combine(&election_keys).unwrap();
    for trustee in &trustees {
        assert!(trustee.all_public_keys_received());
        assert!(trustee.all_backups_received());
        let joint_key = trustee.publish_joint_key().unwrap();
        assert_eq!(joint_key.as_bytes(), context.joint_public_key().as_bytes());
        assert_eq!(joint_key, expected_key);
    }

    let records: Vec<_> = context.guardians().collect();
    assert_eq!(records.len(), 3);
    for (record, trustee) in records.iter().zip(&trustees) {
        assert_eq!(record.guardian_id(), trustee.id());
        assert_eq!(record.x_coordinate(), trustee.x_coordinate());
        assert_eq!(record.coefficient_commitments().len(), 2);
    }
}

fn test_context_binds_guardians_and_manifest<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(2, 2);
    let (context, _) = run_ceremony::<G>(params, &mut rng);
    let (other_context, _) = run_ceremony::<G>(params, &mut rng);
    assert_ne!(context.joint_public_key(), other_context.joint_public_key());
    assert_ne!(context.commitment_hash(), other_context.commitment_hash());

    let same_guardians =
        ElectionContext::new(params, context.guardians().cloned(), b"another manifest").unwrap();
    assert_eq!(same_guardians.joint_public_key(), context.joint_public_key());
    assert_eq!(same_guardians.commitment_hash(), context.commitment_hash());
    assert_ne!(
        same_guardians.extended_base_hash(),
        context.extended_base_hash()
    );
}

fn test_mediator_rejects_misconfigured_guardians<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);

    let mut trustees = create_trustees::<G>(params, &mut rng);
    let err = KeyCeremonyMediator::new(params, proxies(&mut trustees[..2])).unwrap_err();
    assert!(matches!(
        err,
        Error::GuardianCountMismatch {
            expected: 3,
            actual: 2
        }
    ));

    let mut clashing = create_trustees::<G>(params, &mut rng);
    clashing[2] = KeyCeremonyTrustee::new("guardian-3", 2, params, &mut rng).unwrap();
    let err = KeyCeremonyMediator::new(params, proxies(&mut clashing)).unwrap_err();
    assert!(matches!(err, Error::DuplicateCoordinate(2)));

    let mut duplicates = create_trustees::<G>(params, &mut rng);
    duplicates[2] = KeyCeremonyTrustee::new("guardian-1", 3, params, &mut rng).unwrap();
    let err = KeyCeremonyMediator::new(params, proxies(&mut duplicates)).unwrap_err();
    assert!(matches!(err, Error::DuplicateGuardian(id) if id == "guardian-1"));

    let mut other_quorum = create_trustees::<G>(params, &mut rng);
    other_quorum[0] =
        KeyCeremonyTrustee::new("guardian-1", 1, Params::new(3, 3), &mut rng).unwrap();
    let err = KeyCeremonyMediator::new(params, proxies(&mut other_quorum)).unwrap_err();
    assert!(matches!(
        err,
        Error::QuorumMismatch {
            expected: 2,
            actual: 3,
            ..
        }
    ));
}

fn test_invalid_backup_is_resolved_by_challenge<G: Group>(tampering: Tampering) {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let mut trustees = create_trustees::<G>(params, &mut rng);

    let mut mediator =
        KeyCeremonyMediator::new(params, tampering_guardians(&mut trustees, tampering)).unwrap();
    let context = mediator.run(MANIFEST_HASH).unwrap();

    let failed: Vec<_> = mediator
        .verifications()
        .iter()
        .filter(|verification| !verification.verified)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].generating_guardian_id, "guardian-2");
    assert_eq!(failed[0].designated_guardian_id, "guardian-3");
    assert_eq!(failed[0].verifier_id, "guardian-3");
    let expected_reason = match tampering {
        Tampering::WrongValue => "backup value does not match commitments",
        _ => "backup cannot be decrypted",
    };
    assert_eq!(failed[0].error.as_deref(), Some(expected_reason));

    let challenge_verification = mediator.verifications().last().unwrap();
    assert!(challenge_verification.verified);
    assert_eq!(challenge_verification.verifier_id, "mediator");
    drop(mediator);

    // The designated guardian has escrowed the revealed value.
    for trustee in trustees {
        assert!(trustee.all_backups_received());
        let joint_key = trustee.publish_joint_key().unwrap();
        assert_eq!(joint_key, *context.joint_public_key());
        trustee.into_decrypting_trustee().unwrap();
    }
}

fn test_lying_challenge_response_aborts_ceremony<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let mut trustees = create_trustees::<G>(params, &mut rng);

    let guardians = tampering_guardians(&mut trustees, Tampering::ChallengeResponse);
    let mut mediator = KeyCeremonyMediator::new(params, guardians).unwrap();
    let err = mediator.run(MANIFEST_HASH).unwrap_err();
    assert!(matches!(
        err,
        Error::ChallengeFailed {
            generating_guardian_id,
            designated_guardian_id,
        } if generating_guardian_id == "guardian-2" && designated_guardian_id == "guardian-3"
    ));
    drop(mediator);

    let victim = trustees.pop().unwrap();
    assert!(!victim.all_backups_received());
    let err = victim.into_decrypting_trustee().unwrap_err();
    assert!(matches!(
        err,
        Error::MissingBackup { generating_guardian_id } if generating_guardian_id == "guardian-2"
    ));
}

#[cfg(feature = "serde")]
fn test_public_records_serialization<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let mut trustees = create_trustees::<G>(params, &mut rng);

    let keys = trustees[0].share_public_keys();
    let json = serde_json::to_value(&keys).unwrap();
    assert_eq!(json["owner_id"], "guardian-1");
    assert_eq!(json["coefficient_commitments"].as_array().unwrap().len(), 2);
    let restored: PublicKeySet<G> = serde_json::from_value(json).unwrap();
    restored.verify(params.quorum).unwrap();
    assert_eq!(restored.election_public_key(), keys.election_public_key());

    let designated_id = trustees[1].id().to_owned();
    for trustee in &mut trustees[1..] {
        trustee.receive_public_keys(keys.clone()).unwrap();
    }
    let second_keys = trustees[1].share_public_keys();
    trustees[0].receive_public_keys(second_keys).unwrap();
    let backup = trustees[0].send_partial_key_backup(&designated_id).unwrap();
    let json = serde_json::to_string(&backup).unwrap();
    let restored: PartialKeyBackup = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, backup);
    let verification = trustees[1].verify_partial_key_backup(&restored).unwrap();
    assert!(verification.verified);

    let (context, _) = run_ceremony::<G>(params, &mut rng);
    let json = serde_json::to_string(&context).unwrap();
    let restored: ElectionContext<G> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.joint_public_key(), context.joint_public_key());
    assert_eq!(restored.commitment_hash(), context.commitment_hash());
    assert_eq!(restored.extended_base_hash(), context.extended_base_hash());
    assert_eq!(restored.manifest_hash(), MANIFEST_HASH);
}

/// Restored contexts are validated as thoroughly as freshly created ones.
#[cfg(feature = "serde")]
fn test_tampered_context_is_rejected<G: Group>() {
    let mut rng = thread_rng();
    let params = Params::new(3, 2);
    let (context, _) = run_ceremony::<G>(params, &mut rng);
    let (other_context, _) = run_ceremony::<G>(params, &mut rng);
    let json = serde_json::to_value(&context).unwrap();
    let other_json = serde_json::to_value(&other_context).unwrap();

    let assert_rejected = |json: serde_json::Value, expected_message: &str| {
        let err = serde_json::from_value::<ElectionContext<G>>(json)
            .unwrap_err()
            .to_string();
        assert!(err.contains(expected_message), "{err}");
    };

    let mut tampered = json.clone();
    tampered["guardians"]["guardian-1"]["coefficient_proofs"] = serde_json::json!([]);
    assert_rejected(tampered, "published 0 coefficient commitments or proofs");

    let mut tampered = json.clone();
    let other_proofs = other_json["guardians"]["guardian-1"]["coefficient_proofs"].clone();
    tampered["guardians"]["guardian-1"]["coefficient_proofs"] = other_proofs;
    assert_rejected(tampered, "proof for coefficient #0 of guardian `guardian-1`");

    let mut tampered = json.clone();
    tampered["joint_public_key"] = other_json["joint_public_key"].clone();
    assert_rejected(tampered, "`joint_public_key` of the election context");

    let mut tampered = json.clone();
    tampered["commitment_hash"] = other_json["commitment_hash"].clone();
    assert_rejected(tampered, "`commitment_hash` of the election context");

    let mut tampered = json.clone();
    tampered["manifest_hash"] = serde_json::json!("b3RoZXIgbWFuaWZlc3Q");
    assert_rejected(tampered, "`extended_base_hash` of the election context");

    let mut tampered = json.clone();
    let record = tampered["guardians"]["guardian-1"].take();
    tampered["guardians"]["guardian-9"] = record;
    tampered["guardians"]
        .as_object_mut()
        .unwrap()
        .remove("guardian-1");
    assert_rejected(tampered, "`guardians` of the election context");

    let mut tampered = json;
    tampered["params"]["quorum"] = serde_json::json!(0);
    assert_rejected(tampered, "quorum 0 is invalid");
}

mod ristretto {
    use super::*;
    use guardian_elgamal::group::Ristretto;

    #[test]
    fn guardians_agree_on_joint_key() {
        test_guardians_agree_on_joint_key::<Ristretto>();
    }

    #[test]
    fn context_binds_guardians_and_manifest() {
        test_context_binds_guardians_and_manifest::<Ristretto>();
    }

    #[test]
    fn mediator_rejects_misconfigured_guardians() {
        test_mediator_rejects_misconfigured_guardians::<Ristretto>();
    }

    #[test]
    fn corrupted_backup_is_resolved_by_challenge() {
        test_invalid_backup_is_resolved_by_challenge::<Ristretto>(Tampering::Ciphertext);
    }

    #[test]
    fn wrong_backup_value_is_resolved_by_challenge() {
        test_invalid_backup_is_resolved_by_challenge::<Ristretto>(Tampering::WrongValue);
    }

    #[test]
    fn lying_challenge_response_aborts_ceremony() {
        test_lying_challenge_response_aborts_ceremony::<Ristretto>();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn public_records_serialization() {
        test_public_records_serialization::<Ristretto>();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn tampered_context_is_rejected() {
        test_tampered_context_is_rejected::<Ristretto>();
    }
}
