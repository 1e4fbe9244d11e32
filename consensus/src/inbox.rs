//! Vote inbox: off-chain voters deliver votes as independent messages.
//!
//! A single task drains the channel and applies each vote to the
//! coordinator, replying on a per-message oneshot. Senders never wait longer
//! than the coordinator's current voting window for a reply.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use warden_types::{AccountId, Fingerprint, RequestId};

use crate::coordinator::ConsensusCoordinator;
use crate::error::ConsensusError;
use crate::request::{Verdict, VoteResult};

/// A vote as delivered by an off-chain voter.
#[derive(Clone, Debug)]
pub struct VoteMessage {
    pub request_id: RequestId,
    pub voter: AccountId,
    pub verdict: Verdict,
    pub result_fingerprint: Fingerprint,
    pub reason: Option<String>,
}

struct Envelope {
    message: VoteMessage,
    reply: oneshot::Sender<Result<VoteResult, ConsensusError>>,
}

/// Sending half of the vote inbox. Cheap to clone.
#[derive(Clone)]
pub struct VoteInbox {
    tx: mpsc::Sender<Envelope>,
    coordinator: Arc<ConsensusCoordinator>,
}

impl VoteInbox {
    /// Deliver a vote and wait for the coordinator's verdict on it.
    pub async fn submit(&self, message: VoteMessage) -> Result<VoteResult, ConsensusError> {
        let reply_timeout = self.reply_timeout();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| ConsensusError::InboxClosed)?;

        match tokio::time::timeout(reply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConsensusError::InboxClosed),
            Err(_) => Err(ConsensusError::ReplyTimeout {
                secs: reply_timeout.as_secs(),
            }),
        }
    }

    /// How long `submit` waits for a reply. Follows `set_timeout` on the
    /// coordinator.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.coordinator.timeout_secs())
    }

    /// Whether the processing task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that applies inbound votes to `coordinator`.
///
/// The task exits once every [`VoteInbox`] clone has been dropped.
pub fn spawn_vote_inbox(
    coordinator: Arc<ConsensusCoordinator>,
    capacity: usize,
) -> (VoteInbox, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));
    let inbox = VoteInbox {
        tx,
        coordinator: Arc::clone(&coordinator),
    };

    let handle = tokio::spawn(async move {
        while let Some(Envelope { message, reply }) = rx.recv().await {
            let result = coordinator.submit_vote(
                &message.request_id,
                message.voter,
                message.verdict,
                message.result_fingerprint,
                message.reason,
            );
            if reply.send(result).is_err() {
                tracing::debug!(request = %message.request_id, "vote sender went away before reply");
            }
        }
        tracing::debug!("vote inbox closed");
    });

    (inbox, handle)
}
