use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Map, Value};
use time::OffsetDateTime;

use curio_config::{Config, EmbeddingProviderConfig, ProviderConfig};
use curio_service::{
	Backends, BoxFuture, CacheStore, CurioService, EmbeddingProvider, Error, ExplainItem,
	ExplainProvider, FeedbackRecord, Intent, IntentProvider, InteractionRecord, InteractionSink,
	Providers, QueryIndex, QueryNeighbor, Result, RetrievalAdapter, SearchCriteria,
	SearchStrategy, SourceKind, Template, TemplateCatalog, TemplateRow,
};

pub const VECTOR_DIM: u32 = 3;

pub fn test_config(dsn: String, qdrant_url: String) -> Config {
	Config {
		service: curio_config::Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:1".to_string(),
			log_level: "info".to_string(),
		},
		storage: curio_config::Storage {
			postgres: curio_config::Postgres { dsn, pool_max_conns: 2 },
			qdrant: curio_config::Qdrant {
				url: qdrant_url,
				templates_collection: "templates".to_string(),
				cache_collection: "recommend_cache".to_string(),
				vector_dim: VECTOR_DIM,
			},
		},
		providers: curio_config::Providers {
			intent: dummy_provider(),
			embedding: dummy_embedding_provider(),
			explain: dummy_provider(),
		},
		recommend: Default::default(),
		fusion: Default::default(),
		cache: Default::default(),
		security: Default::default(),
	}
}

pub fn offline_config() -> Config {
	test_config("postgres://127.0.0.1:1/unused".to_string(), "http://127.0.0.1:1".to_string())
}

pub fn dummy_embedding_provider() -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/".to_string(),
		model: "test".to_string(),
		dimensions: VECTOR_DIM,
		timeout_ms: 1_000,
		default_headers: Map::new(),
	}
}

pub fn dummy_provider() -> ProviderConfig {
	ProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/".to_string(),
		model: "test".to_string(),
		timeout_ms: 1_000,
		default_headers: Map::new(),
	}
}

pub fn template(id: &str, use_count: i64) -> Template {
	Template {
		template_id: id.to_string(),
		name: format!("Template {id}"),
		description: format!("Description of {id}."),
		category: "presentation".to_string(),
		tags: vec!["business".to_string()],
		style: "minimal".to_string(),
		color_scheme: "blue".to_string(),
		use_case: "pitch".to_string(),
		thumbnail_url: format!("https://cdn.example.com/{id}/thumb.png"),
		preview_url: format!("https://cdn.example.com/{id}/preview.png"),
		view_count: 10,
		use_count,
		rating: 4.5,
		vector_score: None,
		tag_score: None,
		keyword_score: None,
	}
}

pub fn templates(ids: &[&str]) -> Vec<Template> {
	ids.iter().map(|id| template(id, 0)).collect()
}

pub fn intent(strategy: SearchStrategy, tags: &[&str], keywords: &[&str]) -> Intent {
	Intent {
		intent: "find_template".to_string(),
		features: BTreeMap::new(),
		keywords: keywords.iter().map(|value| value.to_string()).collect(),
		tags: tags.iter().map(|value| value.to_string()).collect(),
		strategy,
	}
}

/// Polls `check` until it holds, for detached writes that finish after the response.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
	for _ in 0..200 {
		if check() {
			return true;
		}

		tokio::time::sleep(Duration::from_millis(5)).await;
	}

	check()
}

pub struct FakeIntent {
	pub intent: Option<Intent>,
	pub calls: AtomicUsize,
}
impl FakeIntent {
	pub fn new(intent: Intent) -> Self {
		Self { intent: Some(intent), calls: AtomicUsize::new(0) }
	}

	pub fn failing() -> Self {
		Self { intent: None, calls: AtomicUsize::new(0) }
	}
}
impl IntentProvider for FakeIntent {
	fn resolve_intent<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		_user_id: &'a str,
	) -> BoxFuture<'a, Result<Intent>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let intent = self.intent.clone();

		Box::pin(async move {
			intent.ok_or_else(|| Error::Provider { message: "Intent service unavailable.".to_string() })
		})
	}
}

/// Returns a fixed vector per query text, or the zero vector for unknown texts.
pub struct FakeEmbedding {
	pub vectors: HashMap<String, Vec<f32>>,
	pub fail: bool,
	pub calls: AtomicUsize,
}
impl FakeEmbedding {
	pub fn new() -> Self {
		Self { vectors: HashMap::new(), fail: false, calls: AtomicUsize::new(0) }
	}

	pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
		self.vectors.insert(text.to_string(), vector);

		self
	}
}
impl EmbeddingProvider for FakeEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let outcome = if self.fail {
			Err(Error::Provider { message: "Embedding service unavailable.".to_string() })
		} else {
			Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0; VECTOR_DIM as usize]))
		};

		Box::pin(async move { outcome })
	}
}

pub struct FakeExplain {
	pub text: Option<String>,
	pub calls: AtomicUsize,
}
impl FakeExplain {
	pub fn new(text: &str) -> Self {
		Self { text: Some(text.to_string()), calls: AtomicUsize::new(0) }
	}

	pub fn failing() -> Self {
		Self { text: None, calls: AtomicUsize::new(0) }
	}
}
impl ExplainProvider for FakeExplain {
	fn explain<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		_items: &'a [ExplainItem],
	) -> BoxFuture<'a, Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let text = self.text.clone();

		Box::pin(async move {
			text.ok_or_else(|| Error::Provider { message: "Explain service unavailable.".to_string() })
		})
	}
}

pub enum AdapterBehavior {
	Items(Vec<Template>),
	Fail,
	Hang,
}

pub struct FakeAdapter {
	pub source: SourceKind,
	pub behavior: AdapterBehavior,
	pub calls: AtomicUsize,
	pub depths: Mutex<Vec<u32>>,
	pub received_embedding: AtomicBool,
}
impl FakeAdapter {
	pub fn new(source: SourceKind, behavior: AdapterBehavior) -> Self {
		Self {
			source,
			behavior,
			calls: AtomicUsize::new(0),
			depths: Mutex::new(Vec::new()),
			received_embedding: AtomicBool::new(false),
		}
	}

	pub fn returning(source: SourceKind, ids: &[&str]) -> Self {
		Self::new(source, AdapterBehavior::Items(templates(ids)))
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl RetrievalAdapter for FakeAdapter {
	fn source(&self) -> SourceKind {
		self.source
	}

	fn search<'a>(
		&'a self,
		criteria: &'a SearchCriteria,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Template>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.depths.lock().expect("Depth lock poisoned.").push(top_k);

		if criteria.embedding.is_some() {
			self.received_embedding.store(true, Ordering::SeqCst);
		}

		Box::pin(async move {
			match &self.behavior {
				AdapterBehavior::Items(items) => Ok(items.clone()),
				AdapterBehavior::Fail => {
					Err(Error::Storage { message: "Backing store unavailable.".to_string() })
				},
				AdapterBehavior::Hang => {
					tokio::time::sleep(Duration::from_secs(30)).await;

					Ok(Vec::new())
				},
			}
		})
	}
}

pub struct CachedEntry {
	pub query_text: String,
	pub payload: Value,
	pub expires_at: OffsetDateTime,
}

#[derive(Default)]
pub struct MemoryCacheStore {
	pub entries: Mutex<HashMap<String, CachedEntry>>,
	pub fail_reads: AtomicBool,
	pub fail_writes: AtomicBool,
	pub puts: AtomicUsize,
}
impl MemoryCacheStore {
	/// Stores a live entry.
	pub fn insert(&self, cache_key: &str, query_text: &str, payload: Value) {
		let expires_at = OffsetDateTime::now_utc() + time::Duration::hours(1);

		self.insert_until(cache_key, query_text, payload, expires_at);
	}

	pub fn insert_until(
		&self,
		cache_key: &str,
		query_text: &str,
		payload: Value,
		expires_at: OffsetDateTime,
	) {
		self.entries.lock().expect("Cache lock poisoned.").insert(
			cache_key.to_string(),
			CachedEntry { query_text: query_text.to_string(), payload, expires_at },
		);
	}

	pub fn len(&self) -> usize {
		self.entries.lock().expect("Cache lock poisoned.").len()
	}

	pub fn contains(&self, cache_key: &str) -> bool {
		self.entries.lock().expect("Cache lock poisoned.").contains_key(cache_key)
	}
}
impl CacheStore for MemoryCacheStore {
	fn get<'a>(&'a self, cache_key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		let outcome = if self.fail_reads.load(Ordering::SeqCst) {
			Err(Error::Storage { message: "Cache store unavailable.".to_string() })
		} else {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.entries
				.lock()
				.expect("Cache lock poisoned.")
				.get(cache_key)
				.filter(|entry| entry.expires_at > now)
				.map(|entry| entry.payload.clone()))
		};

		Box::pin(async move { outcome })
	}

	fn put<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		payload: &'a Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, Result<()>> {
		self.puts.fetch_add(1, Ordering::SeqCst);

		let outcome = if self.fail_writes.load(Ordering::SeqCst) {
			Err(Error::Storage { message: "Cache store unavailable.".to_string() })
		} else {
			let expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(ttl_secs);

			self.insert_until(cache_key, query_text, payload.clone(), expires_at);

			Ok(())
		};

		Box::pin(async move { outcome })
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<Vec<String>>> {
		let mut entries = self.entries.lock().expect("Cache lock poisoned.");
		let mut expired: Vec<String> = entries
			.iter()
			.filter(|(_, entry)| entry.expires_at <= now)
			.map(|(key, _)| key.clone())
			.collect();

		expired.sort();

		for key in &expired {
			entries.remove(key);
		}

		Box::pin(async move { Ok(expired) })
	}
}

/// Brute-force L2 nearest neighbors over the inserted query vectors.
#[derive(Default)]
pub struct MemoryQueryIndex {
	pub points: Mutex<Vec<(String, String, Vec<f32>)>>,
	pub fail_writes: AtomicBool,
}
impl MemoryQueryIndex {
	pub fn len(&self) -> usize {
		self.points.lock().expect("Index lock poisoned.").len()
	}

	pub fn contains(&self, cache_key: &str) -> bool {
		self.points.lock().expect("Index lock poisoned.").iter().any(|(key, _, _)| key == cache_key)
	}
}
impl QueryIndex for MemoryQueryIndex {
	fn nearest<'a>(
		&'a self,
		embedding: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<QueryNeighbor>>> {
		let points = self.points.lock().expect("Index lock poisoned.");
		let mut neighbors: Vec<QueryNeighbor> = points
			.iter()
			.map(|(cache_key, query_text, vector)| QueryNeighbor {
				cache_key: cache_key.clone(),
				query_text: query_text.clone(),
				distance: l2(vector, embedding),
			})
			.collect();

		neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		neighbors.truncate(limit as usize);

		Box::pin(async move { Ok(neighbors) })
	}

	fn insert<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Box::pin(async move {
				Err(Error::Qdrant { message: "Query index unavailable.".to_string() })
			});
		}

		let mut points = self.points.lock().expect("Index lock poisoned.");

		points.retain(|(key, _, _)| key != cache_key);
		points.push((cache_key.to_string(), query_text.to_string(), embedding.to_vec()));

		Box::pin(async move { Ok(()) })
	}

	fn remove<'a>(&'a self, cache_keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
		self.points
			.lock()
			.expect("Index lock poisoned.")
			.retain(|(key, _, _)| !cache_keys.contains(key));

		Box::pin(async move { Ok(()) })
	}
}

/// Template rows and vectors keyed by id, the way the Postgres and Qdrant catalog keeps them.
#[derive(Default)]
pub struct MemoryCatalog {
	pub rows: Mutex<HashMap<String, TemplateRow>>,
	pub vectors: Mutex<HashMap<String, Vec<f32>>>,
	pub fail_writes: bool,
}
impl MemoryCatalog {
	pub fn row(&self, template_id: &str) -> Option<TemplateRow> {
		self.rows.lock().expect("Catalog lock poisoned.").get(template_id).cloned()
	}

	pub fn vector(&self, template_id: &str) -> Option<Vec<f32>> {
		self.vectors.lock().expect("Catalog lock poisoned.").get(template_id).cloned()
	}
}
impl TemplateCatalog for MemoryCatalog {
	fn upsert<'a>(
		&'a self,
		row: &'a TemplateRow,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		if self.fail_writes {
			return Box::pin(async move {
				Err(Error::Storage { message: "Template store unavailable.".to_string() })
			});
		}

		let mut rows = self.rows.lock().expect("Catalog lock poisoned.");
		let mut stored = row.clone();

		if let Some(existing) = rows.get(&row.template_id) {
			stored.view_count = existing.view_count;
			stored.use_count = existing.use_count;
		}

		rows.insert(row.template_id.clone(), stored);
		self.vectors
			.lock()
			.expect("Catalog lock poisoned.")
			.insert(row.template_id.clone(), embedding.to_vec());

		Box::pin(async move { Ok(()) })
	}

	fn view<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<Option<TemplateRow>>> {
		let viewed = self.rows.lock().expect("Catalog lock poisoned.").get_mut(template_id).map(
			|row| {
				row.view_count += 1;

				row.clone()
			},
		);

		Box::pin(async move { Ok(viewed) })
	}
}

#[derive(Default)]
pub struct RecordingSink {
	pub interactions: Mutex<Vec<InteractionRecord>>,
	pub feedback: Mutex<Vec<FeedbackRecord>>,
	pub known_templates: HashSet<String>,
	pub incremented: Mutex<Vec<String>>,
	pub fail_writes: bool,
}
impl RecordingSink {
	pub fn interaction_count(&self) -> usize {
		self.interactions.lock().expect("Sink lock poisoned.").len()
	}

	fn write_outcome(&self) -> Result<()> {
		if self.fail_writes {
			return Err(Error::Storage { message: "Interaction store unavailable.".to_string() });
		}

		Ok(())
	}
}
impl InteractionSink for RecordingSink {
	fn record_interaction<'a>(
		&'a self,
		record: &'a InteractionRecord,
	) -> BoxFuture<'a, Result<()>> {
		let outcome = self.write_outcome().map(|()| {
			self.interactions.lock().expect("Sink lock poisoned.").push(record.clone());
		});

		Box::pin(async move { outcome })
	}

	fn record_feedback<'a>(&'a self, record: &'a FeedbackRecord) -> BoxFuture<'a, Result<()>> {
		let outcome = self.write_outcome().map(|()| {
			self.feedback.lock().expect("Sink lock poisoned.").push(record.clone());
		});

		Box::pin(async move { outcome })
	}

	fn increment_use_count<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		let known = self.known_templates.contains(template_id);

		if known {
			self.incremented.lock().expect("Sink lock poisoned.").push(template_id.to_string());
		}

		Box::pin(async move { Ok(known) })
	}
}

/// A service wired entirely to fakes, with handles kept for assertions.
pub struct Harness {
	pub service: CurioService,
	pub intent: Arc<FakeIntent>,
	pub embedding: Arc<FakeEmbedding>,
	pub explain: Arc<FakeExplain>,
	pub vector: Arc<FakeAdapter>,
	pub tag: Arc<FakeAdapter>,
	pub keyword: Arc<FakeAdapter>,
	pub cache_store: Arc<MemoryCacheStore>,
	pub query_index: Arc<MemoryQueryIndex>,
	pub sink: Arc<RecordingSink>,
	pub catalog: Arc<MemoryCatalog>,
}

pub struct HarnessBuilder {
	pub cfg: Config,
	pub intent: FakeIntent,
	pub embedding: FakeEmbedding,
	pub explain: FakeExplain,
	pub vector: FakeAdapter,
	pub tag: FakeAdapter,
	pub keyword: FakeAdapter,
	pub cache_store: MemoryCacheStore,
	pub query_index: MemoryQueryIndex,
	pub sink: RecordingSink,
	pub catalog: MemoryCatalog,
}
impl HarnessBuilder {
	pub fn new(intent: Intent) -> Self {
		Self {
			cfg: offline_config(),
			intent: FakeIntent::new(intent),
			embedding: FakeEmbedding::new(),
			explain: FakeExplain::new("These templates match your request."),
			vector: FakeAdapter::returning(SourceKind::Vector, &[]),
			tag: FakeAdapter::returning(SourceKind::Tag, &[]),
			keyword: FakeAdapter::returning(SourceKind::Keyword, &[]),
			cache_store: MemoryCacheStore::default(),
			query_index: MemoryQueryIndex::default(),
			sink: RecordingSink::default(),
			catalog: MemoryCatalog::default(),
		}
	}

	pub fn build(self) -> Harness {
		let intent = Arc::new(self.intent);
		let embedding = Arc::new(self.embedding);
		let explain = Arc::new(self.explain);
		let vector = Arc::new(self.vector);
		let tag = Arc::new(self.tag);
		let keyword = Arc::new(self.keyword);
		let cache_store = Arc::new(self.cache_store);
		let query_index = Arc::new(self.query_index);
		let sink = Arc::new(self.sink);
		let catalog = Arc::new(self.catalog);
		let providers = Providers::new(intent.clone(), embedding.clone(), explain.clone());
		let backends = Backends {
			vector: vector.clone(),
			tag: tag.clone(),
			keyword: keyword.clone(),
			cache_store: cache_store.clone(),
			query_index: query_index.clone(),
			interactions: sink.clone(),
			catalog: catalog.clone(),
		};
		let service = CurioService::with_backends(self.cfg, providers, backends);

		Harness {
			service,
			intent,
			embedding,
			explain,
			vector,
			tag,
			keyword,
			cache_store,
			query_index,
			sink,
			catalog,
		}
	}
}

impl Harness {
	pub fn intent_calls(&self) -> usize {
		self.intent.calls.load(Ordering::SeqCst)
	}

	pub fn embed_calls(&self) -> usize {
		self.embedding.calls.load(Ordering::SeqCst)
	}

	pub fn explain_calls(&self) -> usize {
		self.explain.calls.load(Ordering::SeqCst)
	}
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}
