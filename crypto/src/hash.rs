//! Blake2b hashing for fingerprints and identifiers.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use warden_types::{AccountId, Fingerprint, RequestId, WorkflowId};

type Blake2b256 = Blake2b<U32>;

const REQUEST_DOMAIN: &[u8] = b"warden/request/v1";
const WORKFLOW_DOMAIN: &[u8] = b"warden/workflow/v1";

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Content fingerprint of a proof artifact or compliance-data value.
pub fn fingerprint_of(data: &[u8]) -> Fingerprint {
    Fingerprint::new(blake2b_256(data))
}

/// Derive a consensus request id.
///
/// `nonce` must be unique per issuing coordinator, so resubmitting the same
/// proof never reuses an id.
pub fn derive_request_id(subject: &AccountId, proof: &Fingerprint, nonce: u64) -> RequestId {
    RequestId::new(id_hash(REQUEST_DOMAIN, subject, proof, nonce))
}

/// Derive a workflow id for one orchestration attempt.
pub fn derive_workflow_id(subject: &AccountId, proof: &Fingerprint, nonce: u64) -> WorkflowId {
    WorkflowId::new(id_hash(WORKFLOW_DOMAIN, subject, proof, nonce))
}

fn id_hash(domain: &[u8], subject: &AccountId, proof: &Fingerprint, nonce: u64) -> [u8; 32] {
    let subject_len = (subject.as_str().len() as u64).to_le_bytes();
    blake2b_256_multi(&[
        domain,
        &subject_len,
        subject.as_str().as_bytes(),
        proof.as_bytes(),
        &nonce.to_le_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let h1 = blake2b_256(b"hello warden");
        let h2 = blake2b_256(b"hello warden");
        assert_eq!(h1, h2);
    }

    #[test]
    fn blake2b_different_inputs() {
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn multi_matches_concatenation() {
        let multi = blake2b_256_multi(&[b"hello ", b"warden"]);
        assert_eq!(multi, blake2b_256(b"hello warden"));
    }

    #[test]
    fn request_ids_differ_by_nonce() {
        let subject = AccountId::new("alice");
        let proof = fingerprint_of(b"proof");
        assert_ne!(
            derive_request_id(&subject, &proof, 0),
            derive_request_id(&subject, &proof, 1)
        );
    }

    #[test]
    fn request_and_workflow_domains_are_separated() {
        let subject = AccountId::new("alice");
        let proof = fingerprint_of(b"proof");
        let request = derive_request_id(&subject, &proof, 7);
        let workflow = derive_workflow_id(&subject, &proof, 7);
        assert_ne!(request.as_bytes(), workflow.as_bytes());
    }

    #[test]
    fn subject_boundary_is_unambiguous() {
        let proof = Fingerprint::new([0x62; 32]);
        let a = derive_request_id(&AccountId::new("ab"), &proof, 0);
        let b = derive_request_id(&AccountId::new("a"), &proof, 0);
        assert_ne!(a, b);
    }
}
