//! HTTP implementation of [`RemoteIndex`] against an Azure-AI-Search-style
//! REST API: `PUT /indexes/{name}` for the schema, `POST /docs/index` for
//! batched upserts and deletes, and `POST /docs/search` for metadata
//! listing and hybrid queries.
//!
//! Every non-2xx response becomes a classified [`RemoteError::Status`]
//! carrying any server-provided retry hint, so the retry executor can make
//! the transient/permanent call without inspecting response bodies.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::RemoteConfig;
use crate::models::{ChunkMetadata, IndexDocument};
use crate::retry::{retry_after_hint, RemoteError};

use super::{best_hit_per_doc, RemoteHit, RemoteIndex};

const API_VERSION: &str = "2024-07-01";

pub struct HttpSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    api_key: String,
    dims: usize,
}

impl HttpSearchIndex {
    /// Build a client for the configured service. Missing credentials are
    /// a fatal configuration error, surfaced before any I/O happens.
    pub fn new(config: &RemoteConfig, dims: usize) -> Result<Self, RemoteError> {
        let api_key = config.api_key().ok_or_else(|| {
            RemoteError::Config(format!(
                "remote API key not set; export {}",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            api_key,
            dims,
        })
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.endpoint, self.index, API_VERSION
        )
    }

    fn docs_url(&self, action: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.endpoint, self.index, action, API_VERSION
        )
    }

    /// Turn a non-success response into a classified error.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = retry_after_hint(response.headers());
        let mut message = response.text().await.unwrap_or_default();
        message.truncate(500);
        Err(RemoteError::Status {
            code: status.as_u16(),
            message,
            retry_after,
        })
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RemoteError> {
        let response = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Api(format!("invalid response body: {}", e)))
    }

    /// Index definition mirroring the persisted chunk schema: chunk_id as
    /// key, filterable identity/hash fields, searchable text fields, and a
    /// fixed-dimension vector field with an HNSW cosine profile.
    fn schema(&self) -> Value {
        json!({
            "name": self.index,
            "fields": [
                { "name": "chunk_id", "type": "Edm.String", "key": true },
                { "name": "doc_path", "type": "Edm.String", "filterable": true },
                { "name": "content_hash", "type": "Edm.String", "filterable": true },
                { "name": "title", "type": "Edm.String", "searchable": true },
                { "name": "section_heading", "type": "Edm.String", "searchable": true },
                { "name": "description", "type": "Edm.String", "searchable": true },
                { "name": "content", "type": "Edm.String", "searchable": true },
                {
                    "name": "content_vector",
                    "type": "Collection(Edm.Single)",
                    "searchable": true,
                    "dimensions": self.dims,
                    "vectorSearchProfile": "hnsw-profile"
                }
            ],
            "vectorSearch": {
                "algorithms": [
                    {
                        "name": "hnsw-algorithm",
                        "kind": "hnsw",
                        "hnswParameters": { "metric": "cosine" }
                    }
                ],
                "profiles": [
                    { "name": "hnsw-profile", "algorithm": "hnsw-algorithm" }
                ]
            }
        })
    }
}

#[async_trait]
impl RemoteIndex for HttpSearchIndex {
    async fn ensure_index(&self, recreate: bool) -> Result<(), RemoteError> {
        if recreate {
            let response = self
                .client
                .delete(self.index_url())
                .header("api-key", &self.api_key)
                .send()
                .await
                .map_err(RemoteError::from_reqwest)?;
            // 404 means there was nothing to drop.
            if !response.status().is_success() && response.status().as_u16() != 404 {
                self.check(response).await?;
            }
        }

        let response = self
            .client
            .put(self.index_url())
            .header("api-key", &self.api_key)
            .json(&self.schema())
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;
        self.check(response).await?;
        Ok(())
    }

    async fn list_metadata(
        &self,
        page_size: usize,
        skip: usize,
    ) -> Result<Vec<ChunkMetadata>, RemoteError> {
        let body = json!({
            "search": "*",
            "select": "chunk_id,doc_path,content_hash",
            "top": page_size,
            "skip": skip,
        });
        let json = self.post_json(&self.docs_url("search"), &body).await?;

        let rows = json
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RemoteError::Api("search response missing value array".to_string()))?;

        let page = rows
            .iter()
            .filter_map(|row| {
                let chunk_id = row.get("chunk_id")?.as_str()?;
                if chunk_id.is_empty() {
                    return None;
                }
                Some(ChunkMetadata {
                    chunk_id: chunk_id.to_string(),
                    doc_path: str_field(row, "doc_path"),
                    content_hash: str_field(row, "content_hash"),
                })
            })
            .collect();

        Ok(page)
    }

    async fn upload(&self, docs: &[IndexDocument]) -> Result<(), RemoteError> {
        let actions: Vec<Value> = docs
            .iter()
            .map(|doc| {
                let mut value = serde_json::to_value(doc).unwrap_or_else(|_| json!({}));
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("@search.action".to_string(), json!("mergeOrUpload"));
                }
                value
            })
            .collect();
        self.post_json(&self.docs_url("index"), &json!({ "value": actions }))
            .await?;
        Ok(())
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<(), RemoteError> {
        let actions: Vec<Value> = chunk_ids
            .iter()
            .map(|id| json!({ "@search.action": "delete", "chunk_id": id }))
            .collect();
        self.post_json(&self.docs_url("index"), &json!({ "value": actions }))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RemoteHit>, RemoteError> {
        let body = json!({
            "search": query,
            "vectorQueries": [
                {
                    "kind": "vector",
                    "vector": vector,
                    "fields": "content_vector",
                    "k": 50,
                }
            ],
            "select": "doc_path,title,description,section_heading,content",
            "top": (limit * 5).max(20),
        });
        let json = self.post_json(&self.docs_url("search"), &body).await?;

        let rows = json
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RemoteError::Api("search response missing value array".to_string()))?;

        let hits: Vec<RemoteHit> = rows
            .iter()
            .map(|row| {
                let content = str_field(row, "content");
                let excerpt: String = content.chars().take(240).collect();
                RemoteHit {
                    doc_path: str_field(row, "doc_path"),
                    title: str_field(row, "title"),
                    description: str_field(row, "description"),
                    section_heading: str_field(row, "section_heading"),
                    excerpt,
                    score: row
                        .get("@search.score")
                        .and_then(|s| s.as_f64())
                        .unwrap_or(0.0),
                }
            })
            .collect();

        Ok(best_hit_per_doc(hits, limit))
    }
}

fn str_field(row: &Value, name: &str) -> String {
    row.get(name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
