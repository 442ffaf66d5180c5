//! Persisted catalog index lifecycle
//!
//! A collection's name encodes the embedder dimension and a fingerprint of
//! the catalog content, plus a generation counter:
//! `{base}_{dim}d_{fingerprint}_g{n}`. Opening the index is therefore a
//! name lookup: a model swap changes the dimension, a catalog edit changes
//! the fingerprint, and either way the expected name is absent and a full
//! rebuild runs. Stale dimension-match reuse cannot happen.
//!
//! Builds always target a collection that is not being served. The serving
//! handle swaps only after a successful build, so a failed build leaves
//! the prior index untouched and queries never observe partial writes;
//! concurrent readers keep seeing the pre-rebuild snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::catalog::{columns, Catalog, CatalogRecord};
use crate::embeddings::TextEmbedder;
use crate::vector_index::{IndexPoint, ScoredPoint, VectorIndex};
use crate::RetrievalError;

/// Index lifecycle configuration
#[derive(Debug, Clone)]
pub struct CatalogIndexConfig {
    /// Base collection name
    pub collection_base: String,
    /// Records embedded and upserted per batch
    pub batch_size: usize,
}

impl Default for CatalogIndexConfig {
    fn default() -> Self {
        Self {
            collection_base: policy_voice_config::constants::retrieval::COLLECTION_BASE.to_string(),
            batch_size: policy_voice_config::constants::retrieval::INDEX_BATCH_SIZE,
        }
    }
}

/// What `open_or_build` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Matching collection existed; reused without re-embedding
    Reused { collection: String, points: u64 },
    /// Full build ran
    Built { collection: String, points: u64 },
}

impl BuildOutcome {
    pub fn points(&self) -> u64 {
        match self {
            BuildOutcome::Reused { points, .. } | BuildOutcome::Built { points, .. } => *points,
        }
    }
}

struct ActiveCollection {
    name: String,
    points: u64,
}

/// Persisted vector index over the catalog
pub struct CatalogIndex {
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn TextEmbedder>,
    config: CatalogIndexConfig,
    active: RwLock<Option<ActiveCollection>>,
}

impl CatalogIndex {
    pub fn new(
        store: Arc<dyn VectorIndex>,
        embedder: Arc<dyn TextEmbedder>,
        config: CatalogIndexConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            active: RwLock::new(None),
        }
    }

    /// Name prefix for collections matching this catalog + embedder pair
    fn collection_prefix(&self, catalog: &Catalog) -> String {
        format!(
            "{}_{}d_{:016x}",
            self.config.collection_base,
            self.embedder.dim(),
            catalog.fingerprint()
        )
    }

    /// Reuse a matching persisted collection, or run a full build
    pub async fn open_or_build(&self, catalog: &Catalog) -> Result<BuildOutcome, RetrievalError> {
        let prefix = self.collection_prefix(catalog);

        if let Some((name, generation)) = self.latest_generation(&prefix).await? {
            let info = self.store.info(&name).await?;
            // Dimension is re-validated even though it is part of the name;
            // a collection created by an older naming scheme must not be
            // served with the wrong width.
            if info.exists && info.dimension == Some(self.embedder.dim()) {
                tracing::info!(
                    collection = %name,
                    generation,
                    points = info.points,
                    "Reusing persisted catalog index"
                );
                let points = info.points;
                *self.active.write().await = Some(ActiveCollection {
                    name: name.clone(),
                    points,
                });
                return Ok(BuildOutcome::Reused {
                    collection: name,
                    points,
                });
            }
            tracing::warn!(
                collection = %name,
                stored_dim = ?info.dimension,
                embedder_dim = self.embedder.dim(),
                "Persisted index unusable, rebuilding"
            );
        }

        self.rebuild(catalog).await
    }

    /// Full rebuild from the given catalog
    ///
    /// Builds into a fresh generation, swaps the serving handle, then
    /// sweeps superseded collections.
    pub async fn rebuild(&self, catalog: &Catalog) -> Result<BuildOutcome, RetrievalError> {
        let prefix = self.collection_prefix(catalog);
        let next_generation = match self.latest_generation(&prefix).await? {
            Some((_, generation)) => generation + 1,
            None => 1,
        };
        let name = format!("{prefix}_g{next_generation}");

        tracing::info!(
            collection = %name,
            records = catalog.len(),
            batch_size = self.config.batch_size,
            "Building catalog index"
        );
        let points = self.build_collection(catalog, &name).await?;

        *self.active.write().await = Some(ActiveCollection {
            name: name.clone(),
            points,
        });

        self.sweep_stale(&name).await;

        Ok(BuildOutcome::Built {
            collection: name,
            points,
        })
    }

    /// Nearest neighbors from the active collection
    pub async fn query(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError> {
        let active = self.active.read().await;
        let active = active.as_ref().ok_or(RetrievalError::IndexUnavailable)?;
        self.store.search(&active.name, vector, limit).await
    }

    /// Points in the active collection, 0 before the first build
    pub async fn point_count(&self) -> u64 {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| a.points)
            .unwrap_or(0)
    }

    pub fn embedder(&self) -> Arc<dyn TextEmbedder> {
        Arc::clone(&self.embedder)
    }

    async fn build_collection(
        &self,
        catalog: &Catalog,
        collection: &str,
    ) -> Result<u64, RetrievalError> {
        self.store.recreate(collection, self.embedder.dim()).await?;

        let mut next_id: u64 = 0;
        for batch in catalog.records().chunks(self.config.batch_size) {
            // Embedding is CPU-bound; keep it off the async runtime
            let embedder = Arc::clone(&self.embedder);
            let texts: Vec<String> = batch.iter().map(CatalogRecord::composed_text).collect();
            let embeddings = tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                embedder.embed_batch(&refs)
            })
            .await
            .map_err(|e| RetrievalError::Embedding(format!("embedding task failed: {e}")))??;

            let points: Vec<IndexPoint> = batch
                .iter()
                .zip(embeddings)
                .map(|(record, vector)| {
                    let point = IndexPoint {
                        id: next_id,
                        vector,
                        payload: record_payload(record),
                    };
                    next_id += 1;
                    point
                })
                .collect();

            self.store.upsert(collection, points).await?;
        }

        tracing::info!(collection, points = next_id, "Catalog index build complete");
        Ok(next_id)
    }

    async fn latest_generation(
        &self,
        prefix: &str,
    ) -> Result<Option<(String, u64)>, RetrievalError> {
        let marker = format!("{prefix}_g");
        let latest = self
            .store
            .list_collections()
            .await?
            .into_iter()
            .filter_map(|name| {
                let generation: u64 = name.strip_prefix(&marker)?.parse().ok()?;
                Some((name, generation))
            })
            .max_by_key(|(_, generation)| *generation);
        Ok(latest)
    }

    /// Drop superseded collections; failures are logged, not fatal
    async fn sweep_stale(&self, active_name: &str) {
        let base_prefix = format!("{}_", self.config.collection_base);
        let stale = match self.store.list_collections().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list collections for sweep");
                return;
            }
        };

        for name in stale {
            if name != active_name && name.starts_with(&base_prefix) {
                match self.store.drop_collection(&name).await {
                    Ok(()) => tracing::info!(collection = %name, "Dropped stale index collection"),
                    Err(e) => {
                        tracing::warn!(collection = %name, error = %e, "Failed to drop stale collection")
                    }
                }
            }
        }
    }
}

/// Payload stored alongside each vector: the full record, flattened
fn record_payload(record: &CatalogRecord) -> HashMap<String, String> {
    let mut payload = HashMap::new();
    payload.insert(columns::SERVICE_ID.to_string(), record.service_id.clone());
    payload.insert(columns::SERVICE_NAME.to_string(), record.service_name.clone());
    payload.insert(columns::TAGS.to_string(), record.tags.clone());
    payload.insert(columns::SUPPORT.to_string(), record.support.clone());
    payload.insert(columns::REQUIREMENT.to_string(), record.requirement.clone());
    payload.insert(columns::URL.to_string(), record.url.clone());
    for (key, value) in &record.extra {
        payload.insert(key.clone(), value.clone());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::vector_index::{IndexInfo, MemoryIndex};
    use async_trait::async_trait;

    const SAMPLE: &str = "\
service_name,tags,support,requirement,url
Youth Housing Support,\"housing, youth\",Monthly rent subsidy of 200000 won,Age 19-34,https://example.org/youth
Small Business Grant,\"business, startup\",One-time grant up to 5M won,Registered business,https://example.org/biz
Elder Care Visits,\"welfare, seniors\",Weekly home visits for seniors,Age 65+,https://example.org/care
";

    fn sample_catalog() -> Catalog {
        Catalog::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    fn make_index(store: Arc<dyn VectorIndex>, dim: usize) -> CatalogIndex {
        CatalogIndex::new(
            store,
            Arc::new(HashEmbedder::with_dim(dim)),
            CatalogIndexConfig {
                collection_base: "test_services".to_string(),
                batch_size: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_query_before_build_fails() {
        let index = make_index(MemoryIndex::new(), 32);
        let err = index.query(&[0.0; 32], 3).await.unwrap_err();
        assert!(matches!(err, RetrievalError::IndexUnavailable));
    }

    #[tokio::test]
    async fn test_build_then_query() {
        let index = make_index(MemoryIndex::new(), 32);
        let catalog = sample_catalog();

        let outcome = index.open_or_build(&catalog).await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { points: 3, .. }));

        let embedder = HashEmbedder::with_dim(32);
        let vector = embedder.embed("youth housing rent").unwrap();
        let hits = index.query(&vector, 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].payload.contains_key(columns::SERVICE_NAME));
    }

    #[tokio::test]
    async fn test_open_reuses_existing() {
        let store = MemoryIndex::new();
        let catalog = sample_catalog();

        let first = make_index(store.clone(), 32);
        let outcome = first.open_or_build(&catalog).await.unwrap();
        let built_name = match outcome {
            BuildOutcome::Built { collection, .. } => collection,
            other => panic!("expected build, got {other:?}"),
        };

        // Fresh handle over the same store, same catalog: no rebuild
        let second = make_index(store, 32);
        let outcome = second.open_or_build(&catalog).await.unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Reused {
                collection: built_name,
                points: 3
            }
        );
    }

    #[tokio::test]
    async fn test_catalog_change_triggers_rebuild() {
        let store = MemoryIndex::new();
        let first = make_index(store.clone(), 32);
        first.open_or_build(&sample_catalog()).await.unwrap();

        let changed =
            Catalog::from_reader(SAMPLE.replace("200000", "250000").as_bytes()).unwrap();
        let second = make_index(store, 32);
        let outcome = second.open_or_build(&changed).await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { .. }));
    }

    #[tokio::test]
    async fn test_dimension_change_triggers_rebuild() {
        let store = MemoryIndex::new();
        let catalog = sample_catalog();

        make_index(store.clone(), 32)
            .open_or_build(&catalog)
            .await
            .unwrap();

        // Swapped embedding model with a different output width
        let wider = make_index(store.clone(), 64);
        let outcome = wider.open_or_build(&catalog).await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { .. }));

        let vector = HashEmbedder::with_dim(64).embed("grant").unwrap();
        let hits = wider.query(&vector, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_idempotent() {
        let index = make_index(MemoryIndex::new(), 32);
        let catalog = sample_catalog();
        let vector = HashEmbedder::with_dim(32).embed("business grant").unwrap();

        index.rebuild(&catalog).await.unwrap();
        let first: Vec<(u64, f32)> = index
            .query(&vector, 3)
            .await
            .unwrap()
            .iter()
            .map(|h| (h.id, h.score))
            .collect();

        index.rebuild(&catalog).await.unwrap();
        let second: Vec<(u64, f32)> = index
            .query(&vector, 3)
            .await
            .unwrap()
            .iter()
            .map(|h| (h.id, h.score))
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rebuild_sweeps_old_generation() {
        let store = MemoryIndex::new();
        let index = make_index(store.clone(), 32);
        let catalog = sample_catalog();

        index.rebuild(&catalog).await.unwrap();
        index.rebuild(&catalog).await.unwrap();

        let collections = store.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1, "stale generations swept: {collections:?}");
        assert!(collections[0].ends_with("_g2"));
    }

    #[tokio::test]
    async fn test_empty_catalog_builds_empty_index() {
        let index = make_index(MemoryIndex::new(), 32);
        let catalog =
            Catalog::from_reader("service_name,tags,support,requirement,url\n".as_bytes()).unwrap();

        let outcome = index.open_or_build(&catalog).await.unwrap();
        assert_eq!(outcome.points(), 0);

        let vector = HashEmbedder::with_dim(32).embed("anything").unwrap();
        assert!(index.query(&vector, 5).await.unwrap().is_empty());
    }

    /// Store wrapper that fails every upsert into a given collection
    struct FailingUpserts {
        inner: Arc<MemoryIndex>,
        fail_collection_suffix: String,
    }

    #[async_trait]
    impl VectorIndex for FailingUpserts {
        async fn info(&self, collection: &str) -> Result<IndexInfo, RetrievalError> {
            self.inner.info(collection).await
        }

        async fn recreate(&self, collection: &str, dim: usize) -> Result<(), RetrievalError> {
            self.inner.recreate(collection, dim).await
        }

        async fn upsert(
            &self,
            collection: &str,
            points: Vec<IndexPoint>,
        ) -> Result<(), RetrievalError> {
            if collection.ends_with(&self.fail_collection_suffix) {
                return Err(RetrievalError::VectorStore("injected failure".to_string()));
            }
            self.inner.upsert(collection, points).await
        }

        async fn search(
            &self,
            collection: &str,
            vector: &[f32],
            limit: usize,
        ) -> Result<Vec<ScoredPoint>, RetrievalError> {
            self.inner.search(collection, vector, limit).await
        }

        async fn drop_collection(&self, collection: &str) -> Result<(), RetrievalError> {
            self.inner.drop_collection(collection).await
        }

        async fn list_collections(&self) -> Result<Vec<String>, RetrievalError> {
            self.inner.list_collections().await
        }
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_prior_index() {
        let memory = MemoryIndex::new();
        let store = Arc::new(FailingUpserts {
            inner: memory.clone(),
            fail_collection_suffix: "_g2".to_string(),
        });
        let index = make_index(store, 32);
        let catalog = sample_catalog();

        index.rebuild(&catalog).await.unwrap();
        let vector = HashEmbedder::with_dim(32).embed("youth").unwrap();
        let before = index.query(&vector, 3).await.unwrap();

        // Second rebuild targets generation 2, which fails
        assert!(index.rebuild(&catalog).await.is_err());

        // Prior generation still serves, untouched
        let after = index.query(&vector, 3).await.unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].id, after[0].id);
    }
}
