//! Vector index backends
//!
//! `VectorIndex` is the persistence seam: Qdrant in deployments, an
//! in-process brute-force index in tests. Collections are created with
//! cosine distance; callers only ever see (id, score, payload) triples.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, vectors_config, CreateCollectionBuilder, Distance, PointStruct,
        SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};

use crate::RetrievalError;

/// One record headed into the index
#[derive(Debug, Clone)]
pub struct IndexPoint {
    /// Row ordinal of the record at build time
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, String>,
}

/// One nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: u64,
    /// Raw cosine similarity from the index
    pub score: f32,
    pub payload: HashMap<String, String>,
}

/// Collection status
#[derive(Debug, Clone, Default)]
pub struct IndexInfo {
    pub exists: bool,
    pub dimension: Option<usize>,
    pub points: u64,
}

/// Vector index interface
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    async fn info(&self, collection: &str) -> Result<IndexInfo, RetrievalError>;

    /// Drop and recreate a collection with the given dimension
    async fn recreate(&self, collection: &str, dim: usize) -> Result<(), RetrievalError>;

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<IndexPoint>,
    ) -> Result<(), RetrievalError>;

    /// Nearest neighbors by cosine similarity, best first
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError>;

    async fn drop_collection(&self, collection: &str) -> Result<(), RetrievalError>;

    async fn list_collections(&self) -> Result<Vec<String>, RetrievalError>;
}

/// Qdrant-backed index
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to a Qdrant endpoint
    pub fn connect(endpoint: &str, api_key: Option<&str>) -> Result<Self, RetrievalError> {
        let mut builder = Qdrant::from_url(endpoint);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RetrievalError::Connection(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn info(&self, collection: &str) -> Result<IndexInfo, RetrievalError> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        if !exists {
            return Ok(IndexInfo::default());
        }

        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        let result = info.result;
        let points = result
            .as_ref()
            .and_then(|r| r.points_count)
            .unwrap_or(0);
        let dimension = result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|cfg| match cfg {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                _ => None,
            });

        Ok(IndexInfo {
            exists: true,
            dimension,
            points,
        })
    }

    async fn recreate(&self, collection: &str, dim: usize) -> Result<(), RetrievalError> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        if exists {
            self.client
                .delete_collection(collection)
                .await
                .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<IndexPoint>,
    ) -> Result<(), RetrievalError> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, qdrant_client::qdrant::Value> = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect();
                PointStruct::new(point.id, point.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, String> = point
                    .payload
                    .into_iter()
                    .filter_map(|(k, v)| match v.kind {
                        Some(Kind::StringValue(s)) => Some((k, s)),
                        _ => None,
                    })
                    .collect();

                let id = point
                    .id
                    .and_then(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => Some(n),
                        _ => None,
                    })
                    .unwrap_or_default();

                ScoredPoint {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), RetrievalError> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, RetrievalError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }
}

/// In-process brute-force index
///
/// Exact cosine over everything; fine for test fixtures and small
/// development catalogs, not a substitute for Qdrant at scale.
#[derive(Default)]
pub struct MemoryIndex {
    collections: parking_lot::RwLock<HashMap<String, MemoryCollection>>,
}

struct MemoryCollection {
    dimension: usize,
    points: Vec<(u64, Vec<f32>, HashMap<String, String>)>,
}

impl MemoryIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn info(&self, collection: &str) -> Result<IndexInfo, RetrievalError> {
        let collections = self.collections.read();
        Ok(match collections.get(collection) {
            Some(c) => IndexInfo {
                exists: true,
                dimension: Some(c.dimension),
                points: c.points.len() as u64,
            },
            None => IndexInfo::default(),
        })
    }

    async fn recreate(&self, collection: &str, dim: usize) -> Result<(), RetrievalError> {
        self.collections.write().insert(
            collection.to_string(),
            MemoryCollection {
                dimension: dim,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<IndexPoint>,
    ) -> Result<(), RetrievalError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| RetrievalError::VectorStore(format!("no collection {collection}")))?;

        for point in points {
            if point.vector.len() != target.dimension {
                return Err(RetrievalError::VectorStore(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    target.dimension
                )));
            }
            target.points.retain(|(id, _, _)| *id != point.id);
            target.points.push((point.id, point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| RetrievalError::Search(format!("no collection {collection}")))?;

        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|(id, stored, payload)| ScoredPoint {
                id: *id,
                score: cosine(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        // Deterministic order: score descending, id ascending on ties
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), RetrievalError> {
        self.collections.write().remove(collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, RetrievalError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
