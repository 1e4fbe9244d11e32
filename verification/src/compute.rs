//! Compute backend: proofs checked by an asynchronous external service.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use warden_types::{AccountId, Fingerprint, RequestId};

use crate::backend::{
    BackendKind, BackendVerdict, ProofPayload, ProofSubmission, VerificationBackend,
};
use crate::error::BackendError;

/// Handle for a job on the compute service.
pub type JobId = RequestId;

/// State of a compute job as reported by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComputeStatus {
    Running,
    Completed {
        valid: bool,
        result_fingerprint: Fingerprint,
    },
    Failed {
        reason: String,
    },
}

/// The external compute service.
pub trait ComputeService: Send + Sync {
    fn submit(
        &self,
        subject: &AccountId,
        proof_fingerprint: &Fingerprint,
        payload: &ProofPayload,
    ) -> Result<JobId, BackendError>;

    fn poll(&self, job: &JobId) -> Result<ComputeStatus, BackendError>;
}

/// Submits a job on first sight of a proof and polls it on every later
/// attempt. A job that finished is forgotten so a rejected proof can be
/// resubmitted.
pub struct ComputeBackend {
    service: Arc<dyn ComputeService>,
    jobs: Mutex<HashMap<Fingerprint, (AccountId, JobId)>>,
}

impl ComputeBackend {
    pub fn new(service: Arc<dyn ComputeService>) -> Self {
        Self {
            service,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// The job in flight for `proof_fingerprint`, if any.
    pub fn job_for(&self, proof_fingerprint: &Fingerprint) -> Option<JobId> {
        self.lock_jobs().get(proof_fingerprint).map(|(_, job)| *job)
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<Fingerprint, (AccountId, JobId)>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a freshly submitted job. If another attempt tracked a job for
    /// the same proof first, that one wins and `job` is left untracked.
    fn track(&self, submission: &ProofSubmission<'_>, job: JobId) -> Result<JobId, BackendError> {
        match self.lock_jobs().entry(submission.proof_fingerprint) {
            Entry::Occupied(tracked) => {
                let (owner, first) = tracked.get();
                debug!(job = %job, kept = %first, "compute job raced, keeping the first");
                owned_by(owner, *first, submission.subject)
            }
            Entry::Vacant(slot) => {
                debug!(job = %job, subject = %submission.subject, "compute job submitted");
                slot.insert((submission.subject.clone(), job));
                Ok(job)
            }
        }
    }
}

fn owned_by(owner: &AccountId, job: JobId, subject: &AccountId) -> Result<JobId, BackendError> {
    if owner != subject {
        return Err(BackendError::IdentityMismatch {
            subject: subject.to_string(),
            bound: owner.to_string(),
        });
    }
    Ok(job)
}

impl VerificationBackend for ComputeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Compute
    }

    fn verify(
        &self,
        submission: &ProofSubmission<'_>,
        expected: &Fingerprint,
    ) -> Result<BackendVerdict, BackendError> {
        submission.ensure_bound()?;

        let tracked = self
            .lock_jobs()
            .get(&submission.proof_fingerprint)
            .map(|(owner, job)| owned_by(owner, *job, submission.subject))
            .transpose()?;
        let job = match tracked {
            Some(job) => job,
            None => {
                // Submitted without the jobs lock; `track` settles a race.
                let job = self.service.submit(
                    submission.subject,
                    &submission.proof_fingerprint,
                    submission.payload,
                )?;
                self.track(submission, job)?
            }
        };

        let status = self.service.poll(&job)?;
        if !matches!(status, ComputeStatus::Running) {
            self.lock_jobs().remove(&submission.proof_fingerprint);
        }
        Ok(match status {
            ComputeStatus::Running => BackendVerdict::Pending { request_id: job },
            ComputeStatus::Completed { valid: false, .. } => BackendVerdict::Invalid {
                reason: "compute job rejected the proof".into(),
            },
            ComputeStatus::Completed {
                valid: true,
                result_fingerprint,
            } if &result_fingerprint == expected => BackendVerdict::Valid { result_fingerprint },
            ComputeStatus::Completed {
                result_fingerprint, ..
            } => BackendVerdict::result_mismatch(&result_fingerprint, expected),
            ComputeStatus::Failed { reason } => BackendVerdict::Invalid {
                reason: format!("compute job failed: {reason}"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::mpsc;
    use std::thread;

    /// Jobs finish with `status` once `finish` is set.
    struct ScriptedService {
        submitted: AtomicU64,
        finished: Mutex<Option<ComputeStatus>>,
    }

    impl ScriptedService {
        fn new() -> Self {
            Self {
                submitted: AtomicU64::new(0),
                finished: Mutex::new(None),
            }
        }

        fn finish(&self, status: ComputeStatus) {
            *self.finished.lock().unwrap() = Some(status);
        }
    }

    impl ComputeService for ScriptedService {
        fn submit(
            &self,
            _subject: &AccountId,
            _proof_fingerprint: &Fingerprint,
            _payload: &ProofPayload,
        ) -> Result<JobId, BackendError> {
            let n = self.submitted.fetch_add(1, Ordering::SeqCst) as u8;
            Ok(JobId::new([n + 1; 32]))
        }

        fn poll(&self, _job: &JobId) -> Result<ComputeStatus, BackendError> {
            Ok(self
                .finished
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(ComputeStatus::Running))
        }
    }

    fn expected() -> Fingerprint {
        Fingerprint::new([9; 32])
    }

    fn verify_as(
        backend: &ComputeBackend,
        subject: &str,
    ) -> Result<BackendVerdict, BackendError> {
        verify_proof(backend, subject, Fingerprint::new([1; 32]))
    }

    fn verify_proof(
        backend: &ComputeBackend,
        subject: &str,
        proof: Fingerprint,
    ) -> Result<BackendVerdict, BackendError> {
        let subject = AccountId::new(subject);
        let payload = ProofPayload::new(subject.clone(), vec![7], vec![]);
        let submission = ProofSubmission {
            subject: &subject,
            proof_fingerprint: proof,
            payload: &payload,
        };
        backend.verify(&submission, &expected())
    }

    /// The first submit signals `entered` and then blocks until `release`.
    struct GatedService {
        submitted: AtomicU64,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl GatedService {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let service = Arc::new(Self {
                submitted: AtomicU64::new(0),
                gate: Mutex::new(Some((entered_tx, release_rx))),
            });
            (service, entered_rx, release_tx)
        }
    }

    impl ComputeService for GatedService {
        fn submit(
            &self,
            _subject: &AccountId,
            _proof_fingerprint: &Fingerprint,
            _payload: &ProofPayload,
        ) -> Result<JobId, BackendError> {
            let n = self.submitted.fetch_add(1, Ordering::SeqCst) as u8;
            let gate = self.gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            Ok(JobId::new([n + 1; 32]))
        }

        fn poll(&self, _job: &JobId) -> Result<ComputeStatus, BackendError> {
            Ok(ComputeStatus::Running)
        }
    }

    #[test]
    fn running_job_is_pending_then_valid() {
        let service = Arc::new(ScriptedService::new());
        let backend = ComputeBackend::new(service.clone());

        let first = verify_as(&backend, "alice").unwrap();
        assert!(matches!(first, BackendVerdict::Pending { .. }));
        let job = backend.job_for(&Fingerprint::new([1; 32])).unwrap();

        // Polling again reuses the job.
        assert_eq!(
            verify_as(&backend, "alice").unwrap(),
            BackendVerdict::Pending { request_id: job }
        );
        assert_eq!(service.submitted.load(Ordering::SeqCst), 1);

        service.finish(ComputeStatus::Completed {
            valid: true,
            result_fingerprint: expected(),
        });
        assert_eq!(
            verify_as(&backend, "alice").unwrap(),
            BackendVerdict::Valid {
                result_fingerprint: expected()
            }
        );
        assert!(backend.job_for(&Fingerprint::new([1; 32])).is_none());
    }

    #[test]
    fn failed_job_is_invalid_and_forgotten() {
        let service = Arc::new(ScriptedService::new());
        service.finish(ComputeStatus::Failed {
            reason: "worker crashed".into(),
        });
        let backend = ComputeBackend::new(service.clone());

        match verify_as(&backend, "alice").unwrap() {
            BackendVerdict::Invalid { reason } => assert!(reason.contains("worker crashed")),
            other => panic!("unexpected verdict {other:?}"),
        }
        verify_as(&backend, "alice").unwrap();
        assert_eq!(service.submitted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrong_result_is_invalid() {
        let service = Arc::new(ScriptedService::new());
        service.finish(ComputeStatus::Completed {
            valid: true,
            result_fingerprint: Fingerprint::new([3; 32]),
        });
        let backend = ComputeBackend::new(service);
        assert!(matches!(
            verify_as(&backend, "alice").unwrap(),
            BackendVerdict::Invalid { .. }
        ));
    }

    #[test]
    fn job_owned_by_another_subject() {
        let backend = ComputeBackend::new(Arc::new(ScriptedService::new()));
        verify_as(&backend, "alice").unwrap();
        assert!(matches!(
            verify_as(&backend, "bob"),
            Err(BackendError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn slow_submit_does_not_block_other_proofs() {
        let (service, entered, release) = GatedService::new();
        let backend = Arc::new(ComputeBackend::new(service));
        let slow_proof = Fingerprint::new([1; 32]);

        let slow = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || verify_proof(&backend, "alice", slow_proof))
        };
        entered.recv().unwrap();

        let other = Fingerprint::new([2; 32]);
        assert!(matches!(
            verify_proof(&backend, "bob", other).unwrap(),
            BackendVerdict::Pending { .. }
        ));
        assert!(backend.job_for(&slow_proof).is_none());

        release.send(()).unwrap();
        assert!(matches!(
            slow.join().unwrap().unwrap(),
            BackendVerdict::Pending { .. }
        ));
        assert_eq!(backend.job_for(&slow_proof), Some(JobId::new([1; 32])));
    }

    #[test]
    fn first_tracked_job_wins_a_submit_race() {
        let (service, entered, release) = GatedService::new();
        let backend = Arc::new(ComputeBackend::new(service));
        let proof = Fingerprint::new([1; 32]);

        let alice = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || verify_proof(&backend, "alice", proof))
        };
        entered.recv().unwrap();

        // Bob submits the same proof while alice's submit is in flight.
        let bobs_job = JobId::new([2; 32]);
        assert_eq!(
            verify_proof(&backend, "bob", proof).unwrap(),
            BackendVerdict::Pending { request_id: bobs_job }
        );

        release.send(()).unwrap();
        assert!(matches!(
            alice.join().unwrap(),
            Err(BackendError::IdentityMismatch { .. })
        ));
        assert_eq!(backend.job_for(&proof), Some(bobs_job));
    }
}
