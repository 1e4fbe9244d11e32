//! Property tests for the replay and compliance-cache guarantees.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use proptest::prelude::*;
use warden_nullables::NullClock;
use warden_verification::{
    BackendKind, GateDecision, ProofBackend, RejectReason, VerificationMode, WorkflowOrchestrator,
};

fn accepting_orchestrator() -> WorkflowOrchestrator {
    WorkflowOrchestrator::builder(VerificationMode::single(BackendKind::Proof))
        .expected_fingerprint(expected())
        .clock(Arc::new(NullClock::new(0)))
        .backend(Arc::new(ProofBackend::new(FixedOracle::accepting(expected()))))
        .build()
        .unwrap()
}

proptest! {
    /// With an always-valid backend, a subject is accepted iff it was
    /// accepted before or its proof is fresh; every other attempt is a replay.
    #[test]
    fn decisions_follow_cache_then_replay(
        attempts in prop::collection::vec((0u8..4, 0u8..6), 1..40)
    ) {
        let o = accepting_orchestrator();
        let mut compliant = HashSet::new();
        let mut used = HashSet::new();

        for (subject, proof) in attempts {
            let (s, fp, payload) = proof_for(&format!("subject-{subject}"), &[proof + 1; 8]);
            let decision = o.evaluate(&s, &fp, &payload).decision;

            let model = if compliant.contains(&subject) {
                GateDecision::Accept
            } else if used.contains(&proof) {
                GateDecision::Reject(RejectReason::ProofAlreadyUsed)
            } else {
                compliant.insert(subject);
                used.insert(proof);
                GateDecision::Accept
            };
            prop_assert_eq!(decision, model);
        }
        prop_assert_eq!(o.replay_guard().len(), used.len());
        prop_assert_eq!(o.cache().len(), compliant.len());
    }

    /// A proof fingerprint is consumed by at most one backend acceptance.
    #[test]
    fn proof_is_consumed_at_most_once(subjects in 1usize..8) {
        let oracle = FixedOracle::accepting(expected());
        let o = WorkflowOrchestrator::builder(VerificationMode::single(BackendKind::Proof))
            .expected_fingerprint(expected())
            .clock(Arc::new(NullClock::new(0)))
            .backend(Arc::new(ProofBackend::new(oracle.clone())))
            .build()
            .unwrap();

        let mut accepted = 0;
        for i in 0..subjects {
            let (s, fp, payload) = proof_for(&format!("s{i}"), b"one-proof");
            if o.evaluate(&s, &fp, &payload).permits_action() {
                accepted += 1;
            }
        }
        prop_assert_eq!(accepted, 1);
        prop_assert_eq!(oracle.calls(), 1);
    }
}
