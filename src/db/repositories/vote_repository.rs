use crate::db::connection::DbPool;
use sqlx::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    Duplicate,
}

pub async fn cast_vote(
    pool: &DbPool,
    poll_id: Uuid,
    option_id: Uuid,
    voter_key: &str,
) -> Result<VoteOutcome, Error> {
    let mut tx = pool.begin().await?;

    let existing_vote = sqlx::query("SELECT id FROM votes WHERE poll_id = $1 AND voter_key = $2")
        .bind(poll_id)
        .bind(voter_key)
        .fetch_optional(&mut *tx)
        .await?;

    if existing_vote.is_some() {
        tx.rollback().await?;
        return Ok(VoteOutcome::Duplicate);
    }

    let inserted = sqlx::query(
        "INSERT INTO votes (id, poll_id, option_id, voter_key) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(poll_id)
    .bind(option_id)
    .bind(voter_key)
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {}
        // a concurrent vote from the same voter won the race
        Err(Error::Database(db_err)) if db_err.is_unique_violation() => {
            tx.rollback().await?;
            return Ok(VoteOutcome::Duplicate);
        }
        Err(e) => return Err(e),
    }

    tx.commit().await?;
    Ok(VoteOutcome::Recorded)
}
