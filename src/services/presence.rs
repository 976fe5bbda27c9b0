use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{dao::cache::EphemeralStore, error::ServiceError};

/// Key prefix of user sessions.
pub const SESSION_PREFIX: &str = "alias-game:session:";

/// Outcome of a successful [`Presence::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// No live session existed.
    Fresh,
    /// An override replaced `previous`, which must be told and closed.
    Superseded {
        /// Connection that held the session.
        previous: String,
    },
}

/// Registry of the single live connection of each user.
pub struct Presence {
    store: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl Presence {
    /// Registry keeping sessions in `store` for at most `ttl`.
    pub fn new(store: Arc<dyn EphemeralStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(user_id: &str) -> String {
        format!("{SESSION_PREFIX}{user_id}")
    }

    /// Bind `user_id` to `connection_id`.
    ///
    /// Without `force` a live session is a [`ServiceError::Conflict`].
    pub async fn register(
        &self,
        user_id: &str,
        connection_id: &str,
        force: bool,
    ) -> Result<Registration, ServiceError> {
        let key = Self::key(user_id);
        if self
            .store
            .set_nx(key.clone(), connection_id.to_owned(), self.ttl)
            .await?
        {
            debug!(user = %user_id, connection = %connection_id, "session registered");
            return Ok(Registration::Fresh);
        }
        if !force {
            return Err(ServiceError::Conflict(format!(
                "user {user_id} already has a live connection"
            )));
        }

        let previous = self.store.get(key.clone()).await?;
        self.store
            .set(key, connection_id.to_owned(), self.ttl)
            .await?;
        match previous {
            Some(previous) if previous != connection_id => {
                info!(user = %user_id, previous = %previous, connection = %connection_id, "session overridden");
                Ok(Registration::Superseded { previous })
            }
            _ => Ok(Registration::Fresh),
        }
    }

    /// Connection currently bound to `user_id`.
    pub async fn resolve(&self, user_id: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.store.get(Self::key(user_id)).await?)
    }

    /// Unbind `user_id` if it is still bound to `connection_id`.
    pub async fn release(&self, user_id: &str, connection_id: &str) -> Result<bool, ServiceError> {
        let released = self
            .store
            .del_if_eq(Self::key(user_id), connection_id.to_owned())
            .await?;
        debug!(user = %user_id, connection = %connection_id, released, "session release");
        Ok(released)
    }

    /// Drop every session; used at startup when no connection can be live.
    pub async fn clear_all(&self) -> Result<usize, ServiceError> {
        let keys = self.store.scan_prefix(SESSION_PREFIX.to_owned()).await?;
        let mut cleared = 0;
        for key in keys {
            if self.store.del(key).await? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::cache::MemoryCache;

    fn presence() -> Presence {
        Presence::new(Arc::new(MemoryCache::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn second_connection_is_refused_without_override() {
        let presence = presence();
        assert_eq!(
            presence.register("u1", "c1", false).await.unwrap(),
            Registration::Fresh
        );
        let err = presence.register("u1", "c2", false).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(presence.resolve("u1").await.unwrap().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn override_supersedes_previous_connection() {
        let presence = presence();
        presence.register("u1", "c1", false).await.unwrap();
        let outcome = presence.register("u1", "c2", true).await.unwrap();
        assert_eq!(
            outcome,
            Registration::Superseded {
                previous: "c1".into()
            }
        );
        assert_eq!(presence.resolve("u1").await.unwrap().as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn late_release_of_superseded_connection_keeps_successor() {
        let presence = presence();
        presence.register("u1", "c1", false).await.unwrap();
        presence.register("u1", "c2", true).await.unwrap();
        assert!(!presence.release("u1", "c1").await.unwrap());
        assert_eq!(presence.resolve("u1").await.unwrap().as_deref(), Some("c2"));
        assert!(presence.release("u1", "c2").await.unwrap());
        assert_eq!(presence.resolve("u1").await.unwrap(), None);
        presence.register("u1", "c3", false).await.unwrap();
    }

    #[tokio::test]
    async fn clear_all_drops_every_session() {
        let presence = presence();
        presence.register("u1", "c1", false).await.unwrap();
        presence.register("u2", "c2", false).await.unwrap();
        assert_eq!(presence.clear_all().await.unwrap(), 2);
        assert_eq!(presence.resolve("u2").await.unwrap(), None);
    }
}
