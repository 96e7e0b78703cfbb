use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, PointId, Query, QueryPointsBuilder, ScoredPoint, Value,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Number};
use tokio::sync::OnceCell;

use super::selection::document_content;
use super::VectorStore;
use crate::config::QdrantConfig;
use crate::models::RetrievedDocument;

/// Qdrant-backed retrieval. The gRPC client is built on first search so a
/// missing `QDRANT_URL` or `QDRANT_COLLECTION` surfaces there.
pub struct QdrantStore {
    config: QdrantConfig,
    client: OnceCell<Qdrant>,
}

impl QdrantStore {
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    fn collection(&self) -> Result<&str> {
        required(&self.config.collection, "QDRANT_COLLECTION")
    }

    async fn client(&self) -> Result<&Qdrant> {
        self.client
            .get_or_try_init(|| async {
                let url = required(&self.config.url, "QDRANT_URL")?;
                tracing::info!("Connecting to Qdrant at {url}");
                Qdrant::from_url(url)
                    .api_key(self.config.api_key.clone())
                    .build()
                    .context("Failed to build Qdrant client")
            })
            .await
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{name} is not set. Please configure it in your environment."))
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedDocument>> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let collection = self.collection()?;
        let client = self.client().await?;

        let mut query = QueryPointsBuilder::new(collection)
            .query(Query::new_nearest(vector.to_vec()))
            .limit(limit as u64)
            .with_payload(true);
        if let Some(name) = self.config.vector_name.as_deref().filter(|n| !n.is_empty()) {
            query = query.using(name);
        }

        let response = client
            .query(query)
            .await
            .with_context(|| format!("Qdrant query on '{collection}' failed"))?;

        Ok(response.result.into_iter().map(into_document).collect())
    }
}

fn into_document(point: ScoredPoint) -> RetrievedDocument {
    let payload = payload_to_json(point.payload);
    RetrievedDocument {
        id: point.id.as_ref().map(point_id_to_string).unwrap_or_default(),
        content: document_content(&payload),
        payload,
        similarity_score: Some(point.score),
    }
}

fn point_id_to_string(point_id: &PointId) -> String {
    match &point_id.point_id_options {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(id)) => id.clone(),
        None => String::new(),
    }
}

fn payload_to_json(payload: HashMap<String, Value>) -> Map<String, serde_json::Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, value_to_json(v)))
        .collect()
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(payload_to_json(s.fields)),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{ListValue, Struct};

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_point_ids_render_as_strings() {
        let num = PointId {
            point_id_options: Some(PointIdOptions::Num(42)),
        };
        let uuid = PointId {
            point_id_options: Some(PointIdOptions::Uuid("a1b2".into())),
        };
        assert_eq!(point_id_to_string(&num), "42");
        assert_eq!(point_id_to_string(&uuid), "a1b2");
    }

    #[test]
    fn test_nested_payload_converts() {
        let mut inner = HashMap::new();
        inner.insert("lang".to_string(), string_value("zh"));
        let mut payload = HashMap::new();
        payload.insert("text_readable".to_string(), string_value("观呼吸"));
        payload.insert(
            "start_time_seconds".to_string(),
            Value {
                kind: Some(Kind::DoubleValue(12.5)),
            },
        );
        payload.insert(
            "tags".to_string(),
            Value {
                kind: Some(Kind::ListValue(ListValue {
                    values: vec![string_value("a"), string_value("b")],
                })),
            },
        );
        payload.insert(
            "meta".to_string(),
            Value {
                kind: Some(Kind::StructValue(Struct { fields: inner })),
            },
        );

        let json = payload_to_json(payload);
        assert_eq!(json["text_readable"], "观呼吸");
        assert_eq!(json["start_time_seconds"], 12.5);
        assert_eq!(json["tags"][1], "b");
        assert_eq!(json["meta"]["lang"], "zh");
    }

    #[test]
    fn test_non_finite_double_becomes_null() {
        let v = Value {
            kind: Some(Kind::DoubleValue(f64::NAN)),
        };
        assert!(value_to_json(v).is_null());
    }

    #[tokio::test]
    async fn test_missing_collection_fails_on_first_search() {
        let store = QdrantStore::new(QdrantConfig {
            url: Some("http://localhost:6334".into()),
            ..QdrantConfig::default()
        });
        let err = store.search(&[0.1, 0.2], 5).await.unwrap_err();
        assert!(err.to_string().contains("QDRANT_COLLECTION"));
    }

    #[tokio::test]
    async fn test_missing_url_fails_on_first_search() {
        let store = QdrantStore::new(QdrantConfig {
            collection: Some("segments_zh".into()),
            ..QdrantConfig::default()
        });
        let err = store.search(&[0.1, 0.2], 5).await.unwrap_err();
        assert!(err.to_string().contains("QDRANT_URL"));
    }

    #[tokio::test]
    async fn test_empty_vector_returns_nothing() {
        let store = QdrantStore::new(QdrantConfig::default());
        assert!(store.search(&[], 5).await.unwrap().is_empty());
    }
}
