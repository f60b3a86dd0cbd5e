use std::collections::BTreeMap;
use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use xqueue_core::error::StorageError;
use xqueue_store::UserStore;

/// Reconciles the configured `[users]` table against the auth store: creates
/// missing users and rehashes passwords for existing ones. Not a queue
/// maintenance job in the scan-and-mutate-submissions sense, but shares the
/// operational CLI surface (§4.6).
pub async fn update_users(
    store: &Arc<dyn UserStore>,
    users: &BTreeMap<String, String>,
) -> Result<(), StorageError> {
    let hasher = Argon2::default();

    for (username, password) in users {
        tracing::info!(username, "creating/updating user");
        let salt = SaltString::generate(&mut OsRng);
        let hash = hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StorageError::Database(format!("failed to hash password for {username}: {e}")))?
            .to_string();
        store.upsert_user(username, &hash).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryUserStore {
        rows: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait::async_trait]
    impl UserStore for InMemoryUserStore {
        async fn upsert_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError> {
            self.rows
                .lock()
                .unwrap()
                .insert(username.to_owned(), password_hash.to_owned());
            Ok(())
        }

        async fn password_hash(&self, username: &str) -> Result<Option<String>, StorageError> {
            Ok(self.rows.lock().unwrap().get(username).cloned())
        }
    }

    #[tokio::test]
    async fn creates_and_hashes_configured_users() {
        let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::default());
        let mut users = BTreeMap::new();
        users.insert("grader".to_owned(), "s3cret".to_owned());

        update_users(&store, &users).await.unwrap();

        let hash = store.password_hash("grader").await.unwrap().unwrap();
        assert!(hash.starts_with("$argon2"));
        assert_ne!(hash, "s3cret");
    }
}
