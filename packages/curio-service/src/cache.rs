//! Recommendation cache keyed by the exact query and by query-embedding proximity.
//!
//! Reads fail open: any store, index, or embedding error degrades to a miss. Writes are
//! best-effort and never block the response that produced them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{CacheStore, CurioService, EmbeddingProvider, QueryIndex, Result};
use curio_config::EmbeddingProviderConfig;

/// Neighbors checked per semantic lookup. More than one, so an expired closest entry does not
/// hide a live one that is also within the threshold.
const NEIGHBOR_CANDIDATES: u64 = 4;

/// How a cached response was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHitKind {
	Exact,
	Semantic,
}
impl CacheHitKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Exact => "exact",
			Self::Semantic => "semantic",
		}
	}
}

/// The closest previously cached query to some embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNeighbor {
	pub cache_key: String,
	pub query_text: String,
	/// L2 distance between the two query embeddings.
	pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
	Exact {
		payload: Value,
	},
	Semantic {
		payload: Value,
		matched_query: String,
		distance: f32,
		embedding: Vec<f32>,
	},
	/// `embedding` is the query embedding when one was computed during the lookup, so the caller
	/// does not have to request it again.
	Miss {
		embedding: Option<Vec<f32>>,
	},
}
impl CacheLookup {
	pub fn hit_kind(&self) -> Option<CacheHitKind> {
		match self {
			Self::Exact { .. } => Some(CacheHitKind::Exact),
			Self::Semantic { .. } => Some(CacheHitKind::Semantic),
			Self::Miss { .. } => None,
		}
	}
}

#[derive(Clone)]
pub struct ExactLookup {
	store: Arc<dyn CacheStore>,
	key_prefix: String,
}
impl ExactLookup {
	pub fn new(store: Arc<dyn CacheStore>, key_prefix: impl Into<String>) -> Self {
		Self { store, key_prefix: key_prefix.into() }
	}

	/// `"{prefix}:{blake3 hex of the query}"`. The query is hashed byte for byte, no folding.
	pub fn cache_key(&self, query: &str) -> String {
		format!("{}:{}", self.key_prefix, blake3::hash(query.as_bytes()).to_hex())
	}

	pub async fn get(&self, cache_key: &str) -> Result<Option<Value>> {
		self.store.get(cache_key).await
	}

	pub async fn put(
		&self,
		cache_key: &str,
		query_text: &str,
		payload: &Value,
		ttl_secs: i64,
	) -> Result<()> {
		self.store.put(cache_key, query_text, payload, ttl_secs).await
	}

	pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<Vec<String>> {
		self.store.purge_expired(now).await
	}
}

#[derive(Clone)]
pub struct SemanticLookup {
	index: Arc<dyn QueryIndex>,
	exact: ExactLookup,
	threshold: f32,
}
impl SemanticLookup {
	pub fn new(index: Arc<dyn QueryIndex>, exact: ExactLookup, threshold: f32) -> Self {
		Self { index, exact, threshold }
	}

	/// Nearest cached query within the threshold whose entry is still live in the key-value store.
	pub async fn find(&self, embedding: &[f32]) -> Result<Option<(QueryNeighbor, Value)>> {
		let neighbors = self.index.nearest(embedding, NEIGHBOR_CANDIDATES).await?;

		for neighbor in neighbors {
			if !neighbor.distance.is_finite() || neighbor.distance > self.threshold {
				continue;
			}

			// Index entries can outlive their payloads; an expired entry reads back as absent.
			if let Some(payload) = self.exact.get(&neighbor.cache_key).await? {
				return Ok(Some((neighbor, payload)));
			}
		}

		Ok(None)
	}

	pub async fn insert(&self, cache_key: &str, query_text: &str, embedding: &[f32]) -> Result<()> {
		self.index.insert(cache_key, query_text, embedding).await
	}

	pub async fn remove(&self, cache_keys: &[String]) -> Result<()> {
		self.index.remove(cache_keys).await
	}
}

#[derive(Clone)]
pub struct SemanticCache {
	cfg: curio_config::Cache,
	embedding_cfg: EmbeddingProviderConfig,
	embedding: Arc<dyn EmbeddingProvider>,
	exact: ExactLookup,
	semantic: SemanticLookup,
}
impl SemanticCache {
	pub fn new(
		cfg: curio_config::Cache,
		embedding_cfg: EmbeddingProviderConfig,
		embedding: Arc<dyn EmbeddingProvider>,
		store: Arc<dyn CacheStore>,
		index: Arc<dyn QueryIndex>,
	) -> Self {
		let exact = ExactLookup::new(store, cfg.key_prefix.clone());
		let semantic = SemanticLookup::new(index, exact.clone(), cfg.similarity_threshold);

		Self { cfg, embedding_cfg, embedding, exact, semantic }
	}

	pub fn cache_key(&self, query: &str) -> String {
		self.exact.cache_key(query)
	}

	pub async fn lookup(&self, query: &str) -> CacheLookup {
		if !self.cfg.enabled {
			return CacheLookup::Miss { embedding: None };
		}

		let key = self.exact.cache_key(query);

		match self.exact.get(&key).await {
			Ok(Some(payload)) => {
				tracing::info!(
					cache_kind = CacheHitKind::Exact.as_str(),
					cache_key_prefix = cache_key_prefix(&key),
					hit = true,
					"Cache hit."
				);

				return CacheLookup::Exact { payload };
			},
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = CacheHitKind::Exact.as_str(),
					cache_key_prefix = cache_key_prefix(&key),
					"Cache read failed."
				);
			},
		}

		let embedding = match self.embedding.embed(&self.embedding_cfg, query).await {
			Ok(embedding) => embedding,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = CacheHitKind::Semantic.as_str(),
					"Query embedding failed; skipping semantic lookup."
				);

				return CacheLookup::Miss { embedding: None };
			},
		};

		match self.semantic.find(&embedding).await {
			Ok(Some((neighbor, payload))) => {
				tracing::info!(
					cache_kind = CacheHitKind::Semantic.as_str(),
					cache_key_prefix = cache_key_prefix(&neighbor.cache_key),
					hit = true,
					distance = neighbor.distance,
					"Cache hit."
				);

				CacheLookup::Semantic {
					payload,
					matched_query: neighbor.query_text,
					distance: neighbor.distance,
					embedding,
				}
			},
			Ok(None) => {
				tracing::info!(
					cache_kind = CacheHitKind::Semantic.as_str(),
					cache_key_prefix = cache_key_prefix(&key),
					hit = false,
					"Cache miss."
				);

				CacheLookup::Miss { embedding: Some(embedding) }
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = CacheHitKind::Semantic.as_str(),
					cache_key_prefix = cache_key_prefix(&key),
					"Cache read failed."
				);

				CacheLookup::Miss { embedding: Some(embedding) }
			},
		}
	}

	/// Writes the payload under the exact key, then indexes the query embedding under that key.
	///
	/// Returns `Ok(false)` when nothing was written: the cache is disabled or the payload is over
	/// `max_payload_bytes`. An embedding failure after the key-value write leaves the entry
	/// reachable by exact key only and is not an error.
	pub async fn store(
		&self,
		query: &str,
		embedding: Option<Vec<f32>>,
		payload: &Value,
	) -> Result<bool> {
		if !self.cfg.enabled {
			return Ok(false);
		}

		let key = self.exact.cache_key(query);
		let payload_size = serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(0);

		if let Some(max) = self.cfg.max_payload_bytes
			&& payload_size as u64 > max
		{
			tracing::warn!(
				cache_key_prefix = cache_key_prefix(&key),
				payload_size,
				"Cache payload skipped due to size."
			);

			return Ok(false);
		}

		self.exact.put(&key, query, payload, self.cfg.ttl_secs).await?;

		let embedding = match embedding {
			Some(embedding) => embedding,
			None => match self.embedding.embed(&self.embedding_cfg, query).await {
				Ok(embedding) => embedding,
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_key_prefix = cache_key_prefix(&key),
						"Query embedding failed; cached entry is exact-match only."
					);

					return Ok(true);
				},
			},
		};

		self.semantic.insert(&key, query, &embedding).await?;

		tracing::info!(
			cache_key_prefix = cache_key_prefix(&key),
			payload_size,
			ttl_secs = self.cfg.ttl_secs,
			"Cache stored."
		);

		Ok(true)
	}

	/// Drops entries that expired at or before `now` from the key-value store, then their query
	/// points from the index. Returns the number of entries removed.
	pub async fn sweep_expired(&self, now: OffsetDateTime) -> Result<usize> {
		let keys = self.exact.purge_expired(now).await?;

		if keys.is_empty() {
			return Ok(0);
		}

		// A failure here leaves orphan points; lookups skip them because their payloads are gone.
		self.semantic.remove(&keys).await?;

		tracing::info!(removed = keys.len(), "Expired cache entries swept.");

		Ok(keys.len())
	}
}

impl CurioService {
	pub async fn sweep_cache(&self) -> Result<usize> {
		self.cache.sweep_expired(OffsetDateTime::now_utc()).await
	}
}

/// First 12 hex characters of the digest, enough to correlate log lines.
pub fn cache_key_prefix(key: &str) -> &str {
	let digest = key.rsplit_once(':').map(|(_, digest)| digest).unwrap_or(key);

	match digest.char_indices().nth(12) {
		Some((end, _)) => &digest[..end],
		None => digest,
	}
}
