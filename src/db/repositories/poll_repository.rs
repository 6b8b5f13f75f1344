use crate::db::connection::DbPool;
use crate::db::models::{OptionTally, Poll};
use sqlx::Error;
use sqlx::Row;
use uuid::Uuid;

pub const DEFAULT_POLL_TITLE: &str = "What is your favorite programming language?";
pub const DEFAULT_POLL_DESCRIPTION: &str = "Pick the language you enjoy most";
pub const DEFAULT_POLL_OPTIONS: [&str; 5] = ["JavaScript", "Python", "Java", "TypeScript", "Go"];

pub async fn create_poll(
    pool: &DbPool,
    title: &str,
    description: Option<&str>,
    options: &[&str],
) -> Result<Uuid, Error> {
    let poll_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO polls (id, title, description) VALUES ($1, $2, $3)")
        .bind(poll_id)
        .bind(title)
        .bind(description)
        .execute(&mut *tx)
        .await?;

    for (position, text) in options.iter().enumerate() {
        sqlx::query("INSERT INTO poll_options (id, poll_id, text, position) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(poll_id)
            .bind(*text)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(poll_id)
}

/// The poll served to viewers: the earliest one created.
pub async fn get_current_poll(pool: &DbPool) -> Result<Option<Poll>, Error> {
    let row = sqlx::query_as::<_, Poll>(
        "SELECT id, title, description, created_at FROM polls ORDER BY created_at ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_option_tallies(pool: &DbPool, poll_id: Uuid) -> Result<Vec<OptionTally>, Error> {
    let rows = sqlx::query_as::<_, OptionTally>(
        r#"
        SELECT o.id, o.text, COUNT(v.id) AS votes
        FROM poll_options o
        LEFT JOIN votes v ON v.option_id = o.id
        WHERE o.poll_id = $1
        GROUP BY o.id, o.text, o.position
        ORDER BY o.position
        "#,
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the poll an option belongs to, if the option exists.
pub async fn get_option_poll_id(pool: &DbPool, option_id: Uuid) -> Result<Option<Uuid>, Error> {
    let row = sqlx::query("SELECT poll_id FROM poll_options WHERE id = $1")
        .bind(option_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<Uuid, _>("poll_id")))
}

/// Creates the default poll when the database holds none. Returns whether one was created.
pub async fn seed_default_poll(pool: &DbPool) -> Result<bool, Error> {
    if get_current_poll(pool).await?.is_some() {
        return Ok(false);
    }

    create_poll(
        pool,
        DEFAULT_POLL_TITLE,
        Some(DEFAULT_POLL_DESCRIPTION),
        &DEFAULT_POLL_OPTIONS,
    )
    .await?;

    Ok(true)
}
