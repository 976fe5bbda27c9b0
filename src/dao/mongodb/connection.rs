use std::{sync::Arc, time::Duration};

use mongodb::{Client, Collection, Database, bson::doc, options::ClientOptions};
use tokio::{sync::RwLock, time::sleep};
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Doubling delay between ping attempts while dialing.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    attempts_left: u32,
    delay: Duration,
}

impl Backoff {
    const ATTEMPTS: u32 = 10;
    const FIRST: Duration = Duration::from_millis(250);
    const CEILING: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            attempts_left: Self::ATTEMPTS,
            delay: Self::FIRST,
        }
    }

    /// Wait before the next attempt, or `None` when the budget is spent.
    async fn wait(&mut self) -> Option<()> {
        self.attempts_left = self.attempts_left.checked_sub(1).filter(|left| *left > 0)?;
        sleep(self.delay).await;
        self.delay = (self.delay * 2).min(Self::CEILING);
        Some(())
    }
}

/// Client plus the database handle derived from it.
struct Link {
    client: Client,
    database: Database,
}

impl Link {
    async fn dial(config: &MongoConfig) -> MongoResult<Self> {
        let client = Client::with_options(ClientOptions::clone(&config.options))
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&config.database_name);

        let mut backoff = Backoff::new();
        loop {
            let ping = database.run_command(doc! { "ping": 1 }).await;
            let source = match ping {
                Ok(_) => return Ok(Self { client, database }),
                Err(source) => source,
            };
            debug!(database = %config.database_name, error = %source, "mongo ping failed while dialing");
            if backoff.wait().await.is_none() {
                return Err(MongoDaoError::InitialPing {
                    attempts: Backoff::ATTEMPTS,
                    source,
                });
            }
        }
    }
}

/// Shared, reconnectable MongoDB handle used by every Mongo-backed store.
#[derive(Clone)]
pub struct MongoConnection {
    link: Arc<RwLock<Link>>,
    config: Arc<MongoConfig>,
}

impl MongoConnection {
    /// Dial the server, retrying the first ping with backoff.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let link = Link::dial(&config).await?;
        Ok(Self {
            link: Arc::new(RwLock::new(link)),
            config: Arc::new(config),
        })
    }

    /// Typed handle on one collection of the current database.
    pub async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.link.read().await.database.collection::<T>(name)
    }

    pub async fn ping(&self) -> MongoResult<()> {
        let database = self.link.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    /// Swap in a freshly dialed client; the old one is dropped once idle.
    pub async fn reconnect(&self) -> MongoResult<()> {
        let fresh = Link::dial(&self.config).await?;
        let stale = std::mem::replace(&mut *self.link.write().await, fresh);
        debug!(database = %self.config.database_name, "mongo client replaced");
        drop(stale.client);
        Ok(())
    }
}
