use crate::db::models::{OptionTally, Poll, PollSnapshot};
use crate::db::store::PollStore;
use crate::error::PollError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;
use uuid::Uuid;

/// In-memory `PollStore` for exercising the live-update path without Postgres.
#[derive(Default)]
pub struct MemoryPollStore {
    state: Mutex<Option<MemoryPoll>>,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

struct MemoryPoll {
    poll: Poll,
    options: Vec<OptionTally>,
    voters: HashSet<String>,
}

impl MemoryPollStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_poll(title: &str, options: &[&str]) -> Self {
        let store = Self::default();
        *store.state.lock().unwrap() = Some(MemoryPoll {
            poll: Poll {
                id: Uuid::new_v4(),
                title: title.to_string(),
                description: None,
                created_at: Utc::now(),
            },
            options: options
                .iter()
                .map(|text| OptionTally {
                    id: Uuid::new_v4(),
                    text: text.to_string(),
                    votes: 0,
                })
                .collect(),
            voters: HashSet::new(),
        });
        store
    }

    pub fn option_id(&self, text: &str) -> Uuid {
        let state = self.state.lock().unwrap();
        state
            .as_ref()
            .and_then(|p| p.options.iter().find(|o| o.text == text))
            .map(|o| o.id)
            .unwrap()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Holds the next read's result back until the returned sender fires. The state is
    /// captured before waiting, like a query that finished but has not been returned yet.
    pub fn gate_next_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn current_poll(&self) -> Result<Option<PollSnapshot>, PollError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            self.reads.fetch_add(1, Ordering::SeqCst);
            return Err(PollError::DatabaseError("connection refused".into()));
        }

        let snapshot = self
            .state
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| PollSnapshot::new(p.poll.clone(), p.options.clone()));
        let gate = self.gate.lock().unwrap().take();
        self.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(snapshot)
    }

    async fn record_vote(&self, option_id: Uuid, voter_key: &str) -> Result<(), PollError> {
        let mut state = self.state.lock().unwrap();
        let poll = state.as_mut().ok_or(PollError::OptionNotFound)?;

        let option = poll
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
            .ok_or(PollError::OptionNotFound)?;

        if !poll.voters.insert(voter_key.to_string()) {
            return Err(PollError::AlreadyVoted);
        }
        option.votes += 1;

        Ok(())
    }
}
