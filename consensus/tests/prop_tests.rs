use std::sync::Arc;

use proptest::prelude::*;

use warden_consensus::{
    ConsensusConfig, ConsensusCoordinator, ConsensusError, RequestState, Verdict, VoteResult,
};
use warden_nullables::NullClock;
use warden_types::{AccountId, Fingerprint};

fn voter(i: usize) -> AccountId {
    AccountId::new(format!("voter{i}"))
}

fn coordinator(roster: usize, quorum: u32) -> ConsensusCoordinator {
    let config = ConsensusConfig::with_voters(AccountId::new("admin"), (0..roster).map(voter), quorum);
    ConsensusCoordinator::new(config, Arc::new(NullClock::new(0))).unwrap()
}

fn verdict(valid: bool) -> Verdict {
    if valid {
        Verdict::Valid
    } else {
        Verdict::Invalid
    }
}

/// Reference model: the state after replaying `votes` one by one.
fn model(roster: usize, quorum: u32, votes: &[bool]) -> RequestState {
    let mut valid = 0u32;
    for (cast, &v) in votes.iter().enumerate() {
        if v {
            valid += 1;
        }
        let outstanding = (roster - cast - 1) as u32;
        if valid >= quorum {
            return RequestState::Verified;
        }
        if valid + outstanding < quorum {
            return RequestState::Failed;
        }
    }
    if votes.is_empty() {
        RequestState::Pending
    } else {
        RequestState::Processing
    }
}

proptest! {
    /// Verified iff valid votes reach quorum before invalid votes make it unreachable,
    /// and symmetrically for Failed.
    #[test]
    fn quorum_outcome_matches_model(
        (roster, quorum, votes) in (1usize..8).prop_flat_map(|n| {
            (Just(n), 1u32..=(n as u32), prop::collection::vec(any::<bool>(), 0..=n))
        })
    ) {
        let c = coordinator(roster, quorum);
        let id = c.submit_request(AccountId::new("subject"), Fingerprint::new([1; 32]), vec![]);
        let mut finalizations = 0;
        for (i, &v) in votes.iter().enumerate() {
            let result = c
                .submit_vote(&id, voter(i), verdict(v), Fingerprint::new([2; 32]), None)
                .unwrap();
            if matches!(result, VoteResult::Finalized(_)) {
                finalizations += 1;
            }
        }
        prop_assert!(finalizations <= 1);
        prop_assert_eq!(c.status(&id).unwrap(), model(roster, quorum, &votes));
    }

    /// A second vote from the same voter is always DuplicateVoter and changes nothing.
    #[test]
    fn duplicate_vote_never_alters_outcome(first in any::<bool>(), second in any::<bool>()) {
        let c = coordinator(5, 3);
        let id = c.submit_request(AccountId::new("subject"), Fingerprint::new([1; 32]), vec![]);
        c.submit_vote(&id, voter(0), verdict(first), Fingerprint::new([2; 32]), None).unwrap();
        let before = c.get(&id).unwrap();

        let err = c
            .submit_vote(&id, voter(0), verdict(second), Fingerprint::new([2; 32]), None)
            .unwrap_err();
        let is_duplicate = matches!(err, ConsensusError::DuplicateVoter { .. });
        prop_assert!(is_duplicate);

        let after = c.get(&id).unwrap();
        prop_assert_eq!(after.votes(), before.votes());
        prop_assert_eq!(after.state(), before.state());
    }

    /// Once Timeout, no vote brings the request back without retry().
    #[test]
    fn timeout_is_monotonic(extra in 1u64..10_000, votes in prop::collection::vec(any::<bool>(), 1..5)) {
        let clock = Arc::new(NullClock::new(0));
        let config = ConsensusConfig::with_voters(AccountId::new("admin"), (0..5).map(voter), 3);
        let c = ConsensusCoordinator::new(config, clock.clone()).unwrap();
        let id = c.submit_request(AccountId::new("subject"), Fingerprint::new([1; 32]), vec![]);
        clock.set(300 + extra);
        prop_assert_eq!(c.check_timeout(&id).unwrap(), RequestState::Timeout);

        for (i, &v) in votes.iter().enumerate() {
            let result = c
                .submit_vote(&id, voter(i), verdict(v), Fingerprint::new([2; 32]), None)
                .unwrap();
            let rejected = matches!(result, VoteResult::Rejected { .. });
            prop_assert!(rejected);
            prop_assert_eq!(c.status(&id).unwrap(), RequestState::Timeout);
        }
    }

    /// retry() bumps the counter once per call; calls beyond the limit always fail.
    #[test]
    fn retry_is_bounded(max_retries in 0u32..5, attempts in 1usize..10) {
        let clock = Arc::new(NullClock::new(0));
        let config = ConsensusConfig {
            max_retries,
            retry_delay_secs: 0,
            ..ConsensusConfig::with_voters(AccountId::new("admin"), [voter(0)], 1)
        };
        let c = ConsensusCoordinator::new(config, clock).unwrap();
        let id = c.submit_request(AccountId::new("subject"), Fingerprint::new([1; 32]), vec![]);

        for attempt in 0..attempts {
            c.submit_vote(&id, voter(0), Verdict::Invalid, Fingerprint::new([2; 32]), None).ok();
            let result = c.retry(&id);
            if (attempt as u32) < max_retries {
                prop_assert_eq!(result.unwrap(), attempt as u32 + 1);
                prop_assert!(c.get(&id).unwrap().votes().is_empty());
            } else {
                let exceeded = matches!(result, Err(ConsensusError::RetryLimitExceeded { .. }));
                prop_assert!(exceeded);
            }
        }
    }
}
