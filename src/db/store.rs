use crate::db::connection::DbPool;
use crate::db::models::PollSnapshot;
use crate::db::repositories::{self as repo, VoteOutcome};
use crate::error::PollError;
use async_trait::async_trait;
use uuid::Uuid;

/// Read and write access to the poll that viewers watch.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Current tally of the configured poll, or `None` when no poll exists.
    async fn current_poll(&self) -> Result<Option<PollSnapshot>, PollError>;

    /// Durably records one vote. Duplicate votes from the same voter are rejected.
    async fn record_vote(&self, option_id: Uuid, voter_key: &str) -> Result<(), PollError>;
}

#[derive(Clone)]
pub struct PgPollStore {
    pool: DbPool,
}

impl PgPollStore {
    pub fn new(pool: DbPool) -> Self {
        PgPollStore { pool }
    }
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn current_poll(&self) -> Result<Option<PollSnapshot>, PollError> {
        let Some(poll) = repo::get_current_poll(&self.pool).await? else {
            return Ok(None);
        };
        let options = repo::get_option_tallies(&self.pool, poll.id).await?;

        Ok(Some(PollSnapshot::new(poll, options)))
    }

    async fn record_vote(&self, option_id: Uuid, voter_key: &str) -> Result<(), PollError> {
        let poll_id = repo::get_option_poll_id(&self.pool, option_id)
            .await?
            .ok_or(PollError::OptionNotFound)?;

        match repo::cast_vote(&self.pool, poll_id, option_id, voter_key).await? {
            VoteOutcome::Recorded => Ok(()),
            VoteOutcome::Duplicate => Err(PollError::AlreadyVoted),
        }
    }
}
