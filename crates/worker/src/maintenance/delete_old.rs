use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use xqueue_store::SubmissionStore;

/// Deletes submissions older than `days_old` days, `chunk_size` rows at a
/// time, sleeping `sleep_between` between chunks to avoid holding long
/// table/row locks on a large database. Returns the total number deleted.
pub async fn delete_old_submissions(
    store: &Arc<dyn SubmissionStore>,
    days_old: i64,
    chunk_size: u32,
    sleep_between: Duration,
) -> Result<u64, xqueue_core::error::StorageError> {
    let cutoff = Utc::now() - chrono::Duration::days(days_old);
    tracing::info!(%cutoff, chunk_size, "deleting old submissions");

    let mut total = 0u64;
    loop {
        let deleted = store.delete_older_than(cutoff, chunk_size).await?;
        if deleted == 0 {
            break;
        }
        total += deleted;
        tracing::info!(deleted, total, "deleted chunk of expired submissions");
        if !sleep_between.is_zero() {
            tokio::time::sleep(sleep_between).await;
        }
    }

    tracing::info!(total, "finished deleting old submissions");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xqueue_core::NewSubmission;

    #[tokio::test]
    async fn deletes_submissions_older_than_cutoff_in_chunks() {
        let store: Arc<dyn SubmissionStore> = Arc::new(crate::testing::InMemoryStore::default());
        for _ in 0..5 {
            let id = store
                .create(NewSubmission {
                    requester_id: "127.0.0.1".into(),
                    lms_callback_url: "http://lms/cb".into(),
                    queue_name: "q".into(),
                    xqueue_header: "{}".into(),
                    xqueue_body: "body".into(),
                    urls: "{}".into(),
                    keys: "{}".into(),
                })
                .await
                .unwrap();
            let mut s = store.get(id).await.unwrap();
            s.arrival_time = chrono::Utc::now() - chrono::Duration::days(30);
            store.update(&s).await.unwrap();
        }

        let deleted = delete_old_submissions(&store, 7, 2, Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(store.count_unretired_by_queue().await.unwrap(), vec![]);
    }
}
