//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Chunks live in a `HashMap` behind `std::sync::RwLock`. Search is a
//! brute-force scan. Nothing survives the process.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    check_dims, check_owner, check_sources, check_top_k, rank_by_distance, validate_embedded,
    VectorStore,
};
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult};

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Chunk>>> {
        self.chunks
            .read()
            .map_err(|_| RagError::storage("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Chunk>>> {
        self.chunks
            .write()
            .map_err(|_| RagError::storage("in-memory store lock poisoned"))
    }
}

fn stored_dims<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Option<usize> {
    chunks
        .into_iter()
        .find_map(|c| c.embedding.as_ref().map(Vec::len))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let Some(dims) = validate_embedded(chunks)? else {
            return Ok(0);
        };
        let mut stored = self.write()?;
        if let Some(existing) = stored_dims(stored.values()) {
            check_dims(existing, dims)?;
        }
        for chunk in chunks {
            stored.insert(chunk.id.clone(), chunk.clone());
        }
        debug!(added = chunks.len(), total = stored.len(), "Stored chunks in memory");
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        check_top_k(top_k)?;
        let stored = self.read()?;
        let candidates: Vec<Chunk> = stored
            .values()
            .filter(|c| source_filter.map_or(true, |s| c.source_document == s))
            .cloned()
            .collect();
        rank_by_distance(query, candidates, top_k)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut stored = self.write()?;
        let removed = ids.iter().filter(|id| stored.remove(*id).is_some()).count();
        Ok(removed)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|_, c| c.source_document != source);
        let removed = before - stored.len();
        info!(source, removed, "Deleted chunks for source");
        Ok(removed)
    }

    async fn replace_source(&self, source: &str, chunks: &[Chunk]) -> Result<usize> {
        let dims = validate_embedded(chunks)?;
        check_sources(source, chunks)?;

        let mut stored = self.write()?;
        if let Some(dims) = dims {
            let others = stored.values().filter(|c| c.source_document != source);
            if let Some(existing) = stored_dims(others) {
                check_dims(existing, dims)?;
            }
        }
        for chunk in chunks {
            if let Some(held) = stored.get(&chunk.id) {
                check_owner(&chunk.id, &held.source_document, source)?;
            }
        }

        let before = stored.len();
        stored.retain(|_, c| c.source_document != source);
        let removed = before - stored.len();
        for chunk in chunks {
            stored.insert(chunk.id.clone(), chunk.clone());
        }
        info!(source, removed, added = chunks.len(), "Replaced chunks for source");
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let mut stored = self.write()?;
        let removed = stored.len();
        stored.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        let stored = self.read()?;
        let sources: BTreeSet<&String> = stored.values().map(|c| &c.source_document).collect();
        Ok(sources.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, source: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {}", id),
            source_document: source.to_string(),
            page_numbers: vec![1, 2],
            position: 0,
            token_count: 3,
            char_count: 10,
            has_overlap_before: false,
            has_overlap_after: false,
            overlap_with_previous: None,
            overlap_with_next: None,
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryVectorStore::new();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_all_when_top_k_exceeds_count() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[
                chunk("a", "doc1", vec![1.0, 0.0]),
                chunk("b", "doc1", vec![0.0, 1.0]),
                chunk("c", "doc2", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(results[0].chunk.id, "a");
        assert!(results.iter().all(|r| r.score > 0.0 && r.score <= 1.0));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.add(&[chunk("a", "doc", vec![1.0, 0.0])]).await.unwrap();
        let mut updated = chunk("a", "doc", vec![0.0, 1.0]);
        updated.text = "new text".to_string();
        store.add(&[updated]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.text, "new text");
        assert_eq!(got.embedding, Some(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_add_requires_embeddings() {
        let store = InMemoryVectorStore::new();
        let mut bare = chunk("a", "doc", vec![1.0]);
        bare.embedding = None;
        let err = store
            .add(&[chunk("b", "doc", vec![1.0]), bare])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Integrity(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryVectorStore::new();
        store.add(&[chunk("a", "doc", vec![1.0, 0.0])]).await.unwrap();
        assert!(store.add(&[chunk("b", "doc", vec![1.0])]).await.is_err());
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 1, None).await,
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_source_filter_and_deletion() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[
                chunk("a", "doc2", vec![1.0, 0.0]),
                chunk("b", "doc1", vec![0.0, 1.0]),
                chunk("c", "doc1", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let filtered = store.search(&[1.0, 0.0], 10, Some("doc1")).await.unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.chunk.source_document == "doc1"));
        assert!(store
            .search(&[1.0, 0.0], 10, Some("nope"))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(store.list_sources().await.unwrap(), vec!["doc1", "doc2"]);
        assert_eq!(
            store
                .delete(&["a".to_string(), "zzz".to_string()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.delete_by_source("doc1").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_source_swaps_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[
                chunk("a_0", "/d/a.pdf", vec![1.0, 0.0]),
                chunk("b_0", "/d/b.pdf", vec![0.0, 1.0]),
                chunk("b_1", "/d/b.pdf", vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let removed = store
            .replace_source("/d/b.pdf", &[chunk("b_0", "/d/b.pdf", vec![0.2, 0.8])])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get("b_1").await.unwrap().is_none());
        assert_eq!(
            store.get("b_0").await.unwrap().unwrap().embedding,
            Some(vec![0.2, 0.8])
        );
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[
                chunk("a_0", "/d/a.pdf", vec![1.0, 0.0]),
                chunk("b_0", "/d/b.pdf", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let narrower = store
            .replace_source("/d/b.pdf", &[chunk("b_0", "/d/b.pdf", vec![1.0])])
            .await;
        assert!(matches!(narrower, Err(RagError::Validation(_))));

        let mut bare = chunk("b_0", "/d/b.pdf", vec![1.0, 0.0]);
        bare.embedding = None;
        let unembedded = store.replace_source("/d/b.pdf", &[bare]).await;
        assert!(matches!(unembedded, Err(RagError::Integrity(_))));

        let stray = store
            .replace_source("/d/b.pdf", &[chunk("b_0", "/d/c.pdf", vec![1.0, 0.0])])
            .await;
        assert!(matches!(stray, Err(RagError::Validation(_))));

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(
            store.list_sources().await.unwrap(),
            vec!["/d/a.pdf", "/d/b.pdf"]
        );
    }

    #[tokio::test]
    async fn test_replace_refuses_id_of_another_document() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[chunk("notes_chunk_000", "/x/notes.pdf", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .replace_source(
                "/y/notes.pdf",
                &[chunk("notes_chunk_000", "/y/notes.pdf", vec![0.0, 1.0])],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/x/notes.pdf"));
        assert_eq!(store.list_sources().await.unwrap(), vec!["/x/notes.pdf"]);
    }

    #[tokio::test]
    async fn test_replace_sole_source_may_change_dims() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[chunk("a_0", "/d/a.pdf", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace_source("/d/a.pdf", &[chunk("a_0", "/d/a.pdf", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_returns_count() {
        let store = InMemoryVectorStore::new();
        store
            .add(&[chunk("a", "d", vec![1.0]), chunk("b", "d", vec![2.0])])
            .await
            .unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let store = InMemoryVectorStore::new();
        assert!(store.search(&[1.0], 0, None).await.is_err());
    }
}
