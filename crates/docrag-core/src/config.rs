use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Runtime configuration, read from the environment (and an optional
/// `config/settings` file). Every backend key is optional: with nothing
/// set the service runs fully local under `local_storage_path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Metadata repository. Set -> SQL server, unset -> embedded SQLite.
    pub database_url: Option<String>,

    // S3-compatible raw storage.
    pub minio_endpoint: Option<String>,
    pub minio_access_key: Option<String>,
    pub minio_secret_key: Option<String>,
    pub minio_bucket_raw: String,
    pub minio_region: String,

    // Vector store.
    pub qdrant_url: Option<String>,
    pub qdrant_host: Option<String>,
    pub qdrant_port: Option<u16>,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub qdrant_vector_size: usize,
    pub qdrant_distance: String,

    // Embeddings.
    pub embedding_model: String,
    pub embedding_url: Option<String>,
    pub embed_batch_size: usize,

    // LLM backend.
    pub llm_url: Option<String>,
    pub llm_model: String,
    pub llm_timeout_seconds: u64,
    pub rag_max_tokens: usize,

    // Chunking and retrieval tunables.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub snippet_max_chars: usize,
    pub rag_top_k_default: usize,
    pub rag_history_n: usize,

    // Upload and pipeline limits.
    pub max_upload_bytes: u64,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub stage_timeout_seconds: u64,

    // Root for all local fallback adapters.
    pub local_storage_path: String,

    // HTTP server.
    pub server_host: String,
    pub server_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            minio_endpoint: None,
            minio_access_key: None,
            minio_secret_key: None,
            minio_bucket_raw: "docrag-raw".to_string(),
            minio_region: "us-east-1".to_string(),
            qdrant_url: None,
            qdrant_host: None,
            qdrant_port: None,
            qdrant_api_key: None,
            qdrant_collection: "docrag_chunks".to_string(),
            qdrant_vector_size: 384,
            qdrant_distance: "Cosine".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_url: None,
            embed_batch_size: 32,
            llm_url: None,
            llm_model: "llama3".to_string(),
            llm_timeout_seconds: 30,
            rag_max_tokens: 512,
            chunk_size: 1000,
            chunk_overlap: 150,
            snippet_max_chars: 240,
            rag_top_k_default: 3,
            rag_history_n: 4,
            max_upload_bytes: 50 * 1024 * 1024,
            queue_capacity: 64,
            worker_count: 2,
            stage_timeout_seconds: 120,
            local_storage_path: "./local_storage".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()
            .map_err(|e| Error::Permanent(format!("configuration error: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| Error::Permanent(format!("configuration error: {e}")))
    }

    /// SQL connection URL: `DATABASE_URL` if set, otherwise an embedded
    /// SQLite file under the local storage root.
    pub fn effective_database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}/docrag.db?mode=rwc", self.local_storage_path),
        }
    }

    /// Qdrant endpoint from `QDRANT_URL`, or `QDRANT_HOST` + `QDRANT_PORT`.
    pub fn qdrant_endpoint(&self) -> Option<String> {
        if let Some(url) = &self.qdrant_url {
            return Some(url.clone());
        }
        self.qdrant_host
            .as_ref()
            .map(|host| format!("http://{}:{}", host, self.qdrant_port.unwrap_or(6334)))
    }

    pub fn minio_configured(&self) -> bool {
        self.minio_endpoint.is_some()
    }

    pub fn raw_storage_root(&self) -> String {
        format!("{}/raw", self.local_storage_path)
    }

    pub fn vector_storage_root(&self) -> String {
        format!("{}/vectors", self.local_storage_path)
    }
}
