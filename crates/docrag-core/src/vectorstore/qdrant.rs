use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, Condition, CreateCollectionBuilder, DeletePointsBuilder, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::Value;

use super::{Distance, ScoredPoint, SearchFilter, VectorPayload, VectorPoint, VectorStore};
use crate::error::{Error, Result};

/// Qdrant-backed vector store, selected when `QDRANT_URL` (or host+port)
/// is configured.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn connect(endpoint: &str, api_key: Option<&str>, collection: &str) -> Result<Self> {
        let mut builder = Qdrant::from_url(endpoint).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Permanent(format!("failed to build qdrant client: {e}")))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    fn qdrant_filter(filter: &SearchFilter) -> Filter {
        let mut conditions = vec![Condition::matches(
            "workspace_id",
            filter.workspace_id.to_string(),
        )];
        if let Some(document_id) = filter.document_id {
            conditions.push(Condition::matches("document_id", document_id.to_string()));
        }
        Filter::must(conditions)
    }
}

fn map_error(err: QdrantError) -> Error {
    Error::Transient(format!("qdrant error: {err}"))
}

fn qdrant_distance(distance: Distance) -> qdrant_client::qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant_client::qdrant::Distance::Cosine,
        Distance::Dot => qdrant_client::qdrant::Distance::Dot,
        Distance::Euclid => qdrant_client::qdrant::Distance::Euclid,
    }
}

fn json_from_qdrant_value(value: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(json_from_qdrant_value).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dim: usize, distance: Distance) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(map_error)?;

        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(map_error)?;
            let existing_dim = info
                .result
                .and_then(|r| r.config)
                .and_then(|c| c.params)
                .and_then(|p| p.vectors_config)
                .and_then(|v| v.config)
                .and_then(|config| match config {
                    vectors_config::Config::Params(params) => Some(params.size as usize),
                    _ => None,
                });
            if let Some(existing) = existing_dim {
                if existing != dim {
                    return Err(Error::Permanent(format!(
                        "vector dimension mismatch: collection {} has {existing}, embedder produces {dim}",
                        self.collection
                    )));
                }
            }
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, qdrant_distance(distance))),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut structs = Vec::with_capacity(points.len());
        for point in points {
            let payload = Payload::try_from(serde_json::to_value(&point.payload)?)
                .map_err(|e| Error::Permanent(format!("invalid vector payload: {e}")))?;
            structs.push(PointStruct::new(
                point.id.to_string(),
                point.vector,
                payload,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, structs))
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .filter(Self::qdrant_filter(filter))
                    .with_payload(true),
            )
            .await
            .map_err(map_error)?;

        let mut results = Vec::with_capacity(response.result.len());
        for point in response.result {
            let json: Value = Value::Object(
                point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect(),
            );
            let payload: VectorPayload = serde_json::from_value(json)
                .map_err(|e| Error::Permanent(format!("malformed vector payload: {e}")))?;
            results.push(ScoredPoint {
                score: point.score,
                payload,
            });
        }
        Ok(results)
    }

    async fn delete_by_filter(&self, filter: &SearchFilter) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(Self::qdrant_filter(filter)),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }
}
