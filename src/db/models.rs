use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OptionTally {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
}

/// Aggregate state of the current poll, as sent to viewers.
///
/// Built fresh for every read and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<OptionTally>,
    pub total_votes: i64,
}

impl PollSnapshot {
    pub fn new(poll: Poll, options: Vec<OptionTally>) -> Self {
        let total_votes = options.iter().map(|o| o.votes).sum::<i64>();
        PollSnapshot {
            id: poll.id,
            title: poll.title,
            description: poll.description,
            options,
            total_votes,
        }
    }
}
