//! Public election context produced by the key ceremony.

use merlin::Transcript;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use crate::serde::{BytesHelper, ElementVec, ScalarHelper};
use crate::{
    group::{element_to_bytes, Group},
    key_ceremony::{check_coordinate, Error, Params, PublicKeySet},
    polynomial::recovery_public_key,
    proofs::TranscriptForGroup,
    PublicKey, SchnorrProof,
};

/// Public record of a guardian: its coordinate and the commitments to its polynomial.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
pub struct GuardianRecord<G: Group> {
    guardian_id: String,
    x_coordinate: u32,
    #[cfg_attr(feature = "serde", serde(with = "ElementVec::<G>"))]
    coefficient_commitments: Vec<G::Element>,
    coefficient_proofs: Vec<SchnorrProof<G>>,
}

impl<G: Group> From<&PublicKeySet<G>> for GuardianRecord<G> {
    fn from(keys: &PublicKeySet<G>) -> Self {
        Self {
            guardian_id: keys.owner_id().to_owned(),
            x_coordinate: keys.x_coordinate(),
            coefficient_commitments: keys.coefficient_commitments().to_vec(),
            coefficient_proofs: keys.coefficient_proofs().to_vec(),
        }
    }
}

impl<G: Group> GuardianRecord<G> {
    /// Returns the guardian ID.
    pub fn guardian_id(&self) -> &str {
        &self.guardian_id
    }

    /// Returns the guardian coordinate.
    pub fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    /// Returns commitments to the guardian polynomial.
    pub fn coefficient_commitments(&self) -> &[G::Element] {
        &self.coefficient_commitments
    }

    /// Returns proofs of knowledge for the commitments.
    pub fn coefficient_proofs(&self) -> &[SchnorrProof<G>] {
        &self.coefficient_proofs
    }

    /// Returns the election public key of the guardian.
    pub fn election_public_key(&self) -> PublicKey<G> {
        PublicKey::from_element(self.coefficient_commitments[0])
    }

    /// Returns the recovery public key of this guardian at the coordinate `x` of another
    /// guardian, i.e., the public counterpart of the backup held by that guardian.
    pub fn recovery_public_key(&self, x: u32) -> PublicKey<G> {
        PublicKey::from_element(recovery_public_key::<G>(x, &self.coefficient_commitments))
    }

    fn verify(&self, quorum: usize) -> Result<(), Error> {
        check_coordinate(self.x_coordinate)?;
        let lengths = [
            self.coefficient_commitments.len(),
            self.coefficient_proofs.len(),
        ];
        if let Some(&actual) = lengths.iter().find(|&&len| len != quorum) {
            return Err(Error::QuorumMismatch {
                guardian_id: self.guardian_id.clone(),
                expected: quorum,
                actual,
            });
        }
        let pairs = self
            .coefficient_commitments
            .iter()
            .zip(&self.coefficient_proofs);
        for (index, (commitment, proof)) in pairs.enumerate() {
            let key = PublicKey::from_element(*commitment);
            proof
                .verify_for(&key)
                .map_err(|source| Error::InvalidProof {
                    guardian_id: self.guardian_id.clone(),
                    index,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Public context of an election: guardian records, the joint public key and hashes
/// binding decryption proofs to this election.
///
/// A deserialized context is checked the same way as one created with [`Self::new()`]:
/// all guardian records are verified, and the joint key and hashes are recomputed
/// and compared with the stored ones.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound = "", try_from = "ElectionContextRepr<G>")
)]
pub struct ElectionContext<G: Group> {
    params: Params,
    joint_public_key: PublicKey<G>,
    guardians: BTreeMap<String, GuardianRecord<G>>,
    commitment_hash: [u8; 32],
    #[cfg_attr(feature = "serde", serde(with = "BytesHelper"))]
    manifest_hash: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(with = "ScalarHelper::<G>"))]
    extended_base_hash: G::Scalar,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
#[serde(bound = "")]
struct ElectionContextRepr<G: Group> {
    params: Params,
    joint_public_key: PublicKey<G>,
    guardians: BTreeMap<String, GuardianRecord<G>>,
    commitment_hash: [u8; 32],
    #[serde(with = "BytesHelper")]
    manifest_hash: Vec<u8>,
    #[serde(with = "ScalarHelper::<G>")]
    extended_base_hash: G::Scalar,
}

#[cfg(feature = "serde")]
impl<G: Group> TryFrom<ElectionContextRepr<G>> for ElectionContext<G> {
    type Error = Error;

    fn try_from(repr: ElectionContextRepr<G>) -> Result<Self, Self::Error> {
        let is_keyed_by_id = repr
            .guardians
            .iter()
            .all(|(id, record)| *id == record.guardian_id);
        if !is_keyed_by_id {
            return Err(Error::ContextMismatch { field: "guardians" });
        }

        let context = Self::new(repr.params, repr.guardians.into_values(), &repr.manifest_hash)?;
        let field = if context.joint_public_key != repr.joint_public_key {
            "joint_public_key"
        } else if context.commitment_hash != repr.commitment_hash {
            "commitment_hash"
        } else if context.extended_base_hash != repr.extended_base_hash {
            "extended_base_hash"
        } else {
            return Ok(context);
        };
        Err(Error::ContextMismatch { field })
    }
}

impl<G: Group> ElectionContext<G> {
    /// Creates a context from the guardian records. All proofs in the records are verified.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of records differs from `params`, if guardian IDs
    /// or coordinates are not unique, or if any record is invalid.
    pub fn new(
        params: Params,
        records: impl IntoIterator<Item = GuardianRecord<G>>,
        manifest_hash: &[u8],
    ) -> Result<Self, Error> {
        let params = Params::try_new(params.guardians, params.quorum)?;
        let mut guardians = BTreeMap::new();
        let mut coordinates = BTreeSet::new();
        for record in records {
            record.verify(params.quorum)?;
            if !coordinates.insert(record.x_coordinate) {
                return Err(Error::DuplicateCoordinate(record.x_coordinate));
            }
            if let Some(prev) = guardians.insert(record.guardian_id.clone(), record) {
                return Err(Error::DuplicateGuardian(prev.guardian_id));
            }
        }
        if guardians.len() != params.guardians {
            return Err(Error::GuardianCountMismatch {
                expected: params.guardians,
                actual: guardians.len(),
            });
        }

        let election_keys: Vec<_> = guardians
            .values()
            .map(GuardianRecord::election_public_key)
            .collect();
        let joint_public_key =
            PublicKey::combine(&election_keys).ok_or(Error::DegenerateJointKey)?;
        let commitment_hash = Self::hash_commitments(&guardians);
        let extended_base_hash = Self::derive_extended_base_hash(
            params,
            manifest_hash,
            &joint_public_key,
            &commitment_hash,
        );

        Ok(Self {
            params,
            joint_public_key,
            guardians,
            commitment_hash,
            manifest_hash: manifest_hash.to_vec(),
            extended_base_hash,
        })
    }

    /// Hashes commitments of all guardians in the ascending order of their coordinates.
    fn hash_commitments(guardians: &BTreeMap<String, GuardianRecord<G>>) -> [u8; 32] {
        let mut records: Vec<_> = guardians.values().collect();
        records.sort_unstable_by_key(|record| record.x_coordinate);

        let mut hasher = Sha256::new();
        for record in records {
            hasher.update(record.x_coordinate.to_be_bytes());
            for commitment in &record.coefficient_commitments {
                hasher.update(element_to_bytes::<G>(commitment));
            }
        }
        hasher.finalize().into()
    }

    fn derive_extended_base_hash(
        params: Params,
        manifest_hash: &[u8],
        joint_public_key: &PublicKey<G>,
        commitment_hash: &[u8; 32],
    ) -> G::Scalar {
        let mut transcript = Transcript::new(b"election_context");
        transcript.append_u64(b"n", params.guardians as u64);
        transcript.append_u64(b"k", params.quorum as u64);
        transcript.append_message(b"manifest", manifest_hash);
        transcript.append_element_bytes(b"K", joint_public_key.as_bytes());
        transcript.append_message(b"commitments", commitment_hash);
        transcript.challenge_scalar::<G>(b"Q")
    }

    /// Returns election parameters.
    pub fn params(&self) -> Params {
        self.params
    }

    /// Returns the joint public key used to encrypt ballots.
    pub fn joint_public_key(&self) -> &PublicKey<G> {
        &self.joint_public_key
    }

    /// Returns the record of the guardian with the specified ID.
    pub fn guardian(&self, guardian_id: &str) -> Option<&GuardianRecord<G>> {
        self.guardians.get(guardian_id)
    }

    /// Iterates over all guardian records ordered by guardian ID.
    pub fn guardians(&self) -> impl Iterator<Item = &GuardianRecord<G>> + '_ {
        self.guardians.values()
    }

    /// Returns the manifest hash the context was created for.
    pub fn manifest_hash(&self) -> &[u8] {
        &self.manifest_hash
    }

    /// Returns the hash of guardian commitments.
    pub fn commitment_hash(&self) -> &[u8; 32] {
        &self.commitment_hash
    }

    /// Returns the extended base hash `Q` which all decryption proofs are bound to.
    pub fn extended_base_hash(&self) -> &G::Scalar {
        &self.extended_base_hash
    }
}
