pub mod memory;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use tracing::info;

use shared_config::AppConfig;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::*;

/// Picks the backing store from configuration: PostgreSQL when a
/// `DATABASE_URL` is present, otherwise the in-process store.
pub async fn connect(config: &AppConfig) -> Result<Arc<dyn Store>, StoreError> {
    if config.database_url.is_empty() {
        info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;
    info!("Connected to PostgreSQL store");
    Ok(Arc::new(store))
}
