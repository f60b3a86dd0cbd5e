use sqlx::PgPool;

/// Creates the `queue_submission` table and its indices if they do not already
/// exist. Run once at startup by both the server and the CLI binaries.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS queue_submission (
            id BIGSERIAL PRIMARY KEY,
            requester_id TEXT NOT NULL,
            lms_callback_url TEXT NOT NULL,
            queue_name TEXT NOT NULL,
            xqueue_header TEXT NOT NULL,
            xqueue_body TEXT NOT NULL,
            urls TEXT NOT NULL,
            keys TEXT NOT NULL,
            arrival_time TIMESTAMPTZ NOT NULL,
            pull_time TIMESTAMPTZ,
            push_time TIMESTAMPTZ,
            return_time TIMESTAMPTZ,
            grader_id TEXT NOT NULL DEFAULT '',
            pullkey TEXT NOT NULL DEFAULT '',
            grader_reply TEXT NOT NULL DEFAULT '',
            num_failures INTEGER NOT NULL DEFAULT 0,
            lms_ack BOOLEAN NOT NULL DEFAULT false,
            retired BOOLEAN NOT NULL DEFAULT false
        )",
    )
    .execute(pool)
    .await?;

    // Compound indices mirror the reference schema's index_together: one
    // ordering per selection predicate (pull-side, push-side), plus the
    // dedup lookup used by invalidate_prior.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS queue_submission_push_idx
         ON queue_submission (queue_name, retired, push_time, arrival_time)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS queue_submission_pull_idx
         ON queue_submission (queue_name, retired, pull_time, arrival_time)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS queue_submission_callback_idx
         ON queue_submission (lms_callback_url, retired)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS queue_user (
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
