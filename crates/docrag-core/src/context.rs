use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::database::{DbPool, Repository};
use crate::embedding::{select_embedder, Embedder};
use crate::error::{Error, Result};
use crate::llm::{select_llm_client, LlmClient};
use crate::storage::{select_raw_storage, RawStorage};
use crate::vectorstore::{select_vector_store, Distance, VectorStore};

/// Everything the handlers and workers share: one adapter instance per
/// interface, chosen from configuration at startup and then treated as
/// immutable. There are no process-wide globals; the context is the only
/// owner.
pub struct AppContext {
    pub settings: Settings,
    pub repository: Arc<Repository>,
    pub raw_storage: Arc<dyn RawStorage>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
}

impl AppContext {
    /// Composition root: select one implementation per interface, ensure
    /// schema and collection, and verify the embedder/collection
    /// dimensions agree. A mismatch is fatal.
    pub async fn initialize(settings: Settings) -> Result<Arc<Self>> {
        let pool = DbPool::connect(&settings).await?;
        let repository = Arc::new(Repository::new(pool));
        repository.ensure_schema().await?;

        let raw_storage = select_raw_storage(&settings)?;
        let vector_store = select_vector_store(&settings).await?;
        let embedder = select_embedder(&settings).await?;
        let llm = select_llm_client(&settings)?;

        let dim = embedder.dim();
        if dim != settings.qdrant_vector_size {
            return Err(Error::Permanent(format!(
                "embedder '{}' produces {dim}-dim vectors but QDRANT_VECTOR_SIZE is {}",
                embedder.model_name(),
                settings.qdrant_vector_size
            )));
        }
        let distance = Distance::parse(&settings.qdrant_distance)?;
        vector_store.ensure_collection(dim, distance).await?;

        info!(dim, "adapters initialized");
        Ok(Arc::new(Self {
            settings,
            repository,
            raw_storage,
            vector_store,
            embedder,
            llm,
        }))
    }

    /// Assemble a context from explicit parts. Used by tests to wire the
    /// local adapters with stub embedder/LLM implementations.
    pub fn from_parts(
        settings: Settings,
        repository: Arc<Repository>,
        raw_storage: Arc<dyn RawStorage>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            repository,
            raw_storage,
            vector_store,
            embedder,
            llm,
        })
    }
}
