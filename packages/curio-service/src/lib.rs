pub mod cache;
pub mod catalog;
pub mod feedback;
pub mod recommend;
pub mod stores;
pub mod template;

mod error;

pub use cache::{
	CacheHitKind, CacheLookup, ExactLookup, QueryNeighbor, SemanticCache, SemanticLookup,
};
pub use catalog::{IngestReport, IngestRequest, TemplateInput};
pub use curio_providers::{
	explain::ExplainItem,
	intent::{Intent, SearchStrategy},
};
pub use curio_storage::models::{FeedbackRecord, InteractionRecord, TemplateRow};
pub use error::{Error, Result};
pub use feedback::{FeedbackKind, FeedbackRequest, FeedbackResponse};
pub use recommend::{
	Recommendation, RecommendRequest, RecommendResponse,
	adapters::{RetrievalAdapter, SearchCriteria},
	fusion::{FusedItem, FusionParams, RankedList},
	weights::{SourceKind, SourceSet, SourceWeights, WeightTable},
};
pub use template::Template;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use time::OffsetDateTime;

use curio_config::{Config, EmbeddingProviderConfig, ProviderConfig};
use curio_providers::{embedding, explain, intent};
use curio_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait IntentProvider
where
	Self: Send + Sync,
{
	fn resolve_intent<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Intent>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

pub trait ExplainProvider
where
	Self: Send + Sync,
{
	fn explain<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		items: &'a [ExplainItem],
	) -> BoxFuture<'a, Result<String>>;
}

/// Key-value half of the recommendation cache. Implementations only return live entries.
pub trait CacheStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, cache_key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

	fn put<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		payload: &'a Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, Result<()>>;

	/// Deletes every entry that expired at or before `now` and returns the deleted keys.
	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Embedding half of the recommendation cache: one vector per cached query.
pub trait QueryIndex
where
	Self: Send + Sync,
{
	/// Up to `limit` cached queries, closest first.
	fn nearest<'a>(
		&'a self,
		embedding: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<QueryNeighbor>>>;

	fn insert<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>>;

	fn remove<'a>(&'a self, cache_keys: &'a [String]) -> BoxFuture<'a, Result<()>>;
}

/// Template rows together with the vectors the vector adapter searches.
pub trait TemplateCatalog
where
	Self: Send + Sync,
{
	/// Writes the row, then the template's point. Rewriting a template replaces both.
	fn upsert<'a>(&'a self, row: &'a TemplateRow, embedding: &'a [f32])
	-> BoxFuture<'a, Result<()>>;

	/// Counts one view of an active template and returns it, or `None` when there is none.
	fn view<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<Option<TemplateRow>>>;
}

pub trait InteractionSink
where
	Self: Send + Sync,
{
	fn record_interaction<'a>(&'a self, record: &'a InteractionRecord)
	-> BoxFuture<'a, Result<()>>;

	fn record_feedback<'a>(&'a self, record: &'a FeedbackRecord) -> BoxFuture<'a, Result<()>>;

	/// Returns `false` when no template carries this id.
	fn increment_use_count<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<bool>>;
}

#[derive(Clone)]
pub struct Providers {
	pub intent: Arc<dyn IntentProvider>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub explain: Arc<dyn ExplainProvider>,
}
impl Providers {
	pub fn new(
		intent: Arc<dyn IntentProvider>,
		embedding: Arc<dyn EmbeddingProvider>,
		explain: Arc<dyn ExplainProvider>,
	) -> Self {
		Self { intent, embedding, explain }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { intent: provider.clone(), embedding: provider.clone(), explain: provider }
	}
}

/// Everything the service reads from or writes to, behind the seams the tests fake.
#[derive(Clone)]
pub struct Backends {
	pub vector: Arc<dyn RetrievalAdapter>,
	pub tag: Arc<dyn RetrievalAdapter>,
	pub keyword: Arc<dyn RetrievalAdapter>,
	pub cache_store: Arc<dyn CacheStore>,
	pub query_index: Arc<dyn QueryIndex>,
	pub interactions: Arc<dyn InteractionSink>,
	pub catalog: Arc<dyn TemplateCatalog>,
}
impl Backends {
	pub fn postgres_qdrant(
		cfg: &Config,
		db: Db,
		qdrant: Arc<QdrantStore>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		use recommend::adapters::{KeywordAdapter, TagAdapter, VectorAdapter};
		use stores::{PgCacheStore, PgInteractionSink, PgQdrantCatalog, QdrantQueryIndex};

		Self {
			vector: Arc::new(VectorAdapter::new(
				db.clone(),
				qdrant.clone(),
				embedding,
				cfg.providers.embedding.clone(),
			)),
			tag: Arc::new(TagAdapter::new(db.clone())),
			keyword: Arc::new(KeywordAdapter::new(db.clone())),
			cache_store: Arc::new(PgCacheStore::new(db.clone())),
			query_index: Arc::new(QdrantQueryIndex::new(qdrant.clone())),
			interactions: Arc::new(PgInteractionSink::new(db.clone())),
			catalog: Arc::new(PgQdrantCatalog::new(db, qdrant)),
		}
	}
}

pub struct CurioService {
	pub cfg: Config,
	pub providers: Providers,
	pub backends: Backends,
	pub(crate) cache: SemanticCache,
	pub(crate) fusion: FusionParams,
}
impl CurioService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_providers(cfg, db, qdrant, Providers::default())
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		let backends =
			Backends::postgres_qdrant(&cfg, db, Arc::new(qdrant), providers.embedding.clone());

		Self::with_backends(cfg, providers, backends)
	}

	pub fn with_backends(cfg: Config, providers: Providers, backends: Backends) -> Self {
		let cache = SemanticCache::new(
			cfg.cache.clone(),
			cfg.providers.embedding.clone(),
			providers.embedding.clone(),
			backends.cache_store.clone(),
			backends.query_index.clone(),
		);
		let fusion = FusionParams::from_config(&cfg.fusion);

		Self { cfg, providers, backends, cache, fusion }
	}
}

struct DefaultProviders;
impl IntentProvider for DefaultProviders {
	fn resolve_intent<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Intent>> {
		Box::pin(async move { Ok(intent::resolve_intent(cfg, query, user_id).await?) })
	}
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, text).await?) })
	}
}
impl ExplainProvider for DefaultProviders {
	fn explain<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		items: &'a [ExplainItem],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(explain::explain(cfg, query, items).await?) })
	}
}
