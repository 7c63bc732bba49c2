use crate::auth::tokens::TokenIssuer;
use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::store::{PgStore, Repository};
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub tokens: Arc<TokenIssuer>,
}

impl FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = PgStore::open(&config.database_url, config.max_connections).await?;

        // Real S3/MinIO
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Ok(Self::from_parts(Arc::new(store), config, storage))
    }

    pub fn from_parts(
        repo: Arc<dyn Repository>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(&config.jwt));
        Self {
            repo,
            config,
            storage,
            tokens,
        }
    }

    /// In-memory store and fake storage; no database or S3 needed.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::storage::FakeStorage;
        use crate::store::memory::MemoryStore;

        Self::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(AppConfig::for_tests()),
            Arc::new(FakeStorage::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_stops_when_the_store_cannot_start() {
        let mut config = AppConfig::for_tests();
        config.database_url = "not-a-database-url".into();
        assert!(AppState::init(config).await.is_err());
    }
}
