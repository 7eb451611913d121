pub mod adapters;
pub mod fusion;
pub mod weights;

use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	CacheHitKind, CacheLookup, CurioService, Error, ExplainItem, Intent, InteractionRecord,
	Result, SearchStrategy, Template,
	recommend::{
		adapters::{RetrievalAdapter, SearchCriteria},
		fusion::{FusedItem, RankedList},
		weights::{SourceKind, SourceSet},
	},
};

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendRequest {
	pub query: String,
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
	#[serde(flatten)]
	pub template: Template,
	pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
	pub status: String,
	pub query: String,
	pub recommendations: Vec<Recommendation>,
	pub explanation: String,
	pub response_time_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_hit: Option<CacheHitKind>,
}

/// Which adapters a resolved intent asks for.
///
/// Tag and keyword search only run with non-empty criteria, whatever the strategy says, so a
/// `tag` strategy without tags selects nothing.
pub fn plan_sources(intent: &Intent) -> SourceSet {
	let mut sources = SourceSet::EMPTY;
	let has_tags = !intent.tags.is_empty();
	let has_keywords = !intent.keywords.is_empty();

	match intent.strategy {
		SearchStrategy::Hybrid => {
			sources = sources.with(SourceKind::Vector);

			if has_tags {
				sources = sources.with(SourceKind::Tag);
			}
			if has_keywords {
				sources = sources.with(SourceKind::Keyword);
			}
		},
		SearchStrategy::Vector => sources = sources.with(SourceKind::Vector),
		SearchStrategy::Tag if has_tags => sources = sources.with(SourceKind::Tag),
		SearchStrategy::Keyword if has_keywords => sources = sources.with(SourceKind::Keyword),
		SearchStrategy::Tag | SearchStrategy::Keyword => {},
	}

	sources
}

impl CurioService {
	pub async fn recommend(&self, req: RecommendRequest) -> Result<RecommendResponse> {
		let started = Instant::now();
		let (query, user_id, top_k) = self.validate_recommend(req)?;
		let lookup = self.cache.lookup(&query).await;
		let hit_kind = lookup.hit_kind();
		let embedding = match lookup {
			CacheLookup::Exact { payload } => match decode_cached(payload, &query) {
				Some(response) => return Ok(finish_cached(response, hit_kind, started)),
				None => None,
			},
			CacheLookup::Semantic { payload, embedding, .. } => {
				match decode_cached(payload, &query) {
					Some(response) => return Ok(finish_cached(response, hit_kind, started)),
					None => Some(embedding),
				}
			},
			CacheLookup::Miss { embedding } => embedding,
		};
		let intent = self
			.providers
			.intent
			.resolve_intent(&self.cfg.providers.intent, &query, &user_id)
			.await
			.map_err(|err| Error::IntentResolution { message: err.to_string() })?;
		let sources = plan_sources(&intent);
		let criteria = SearchCriteria {
			query: query.clone(),
			embedding: embedding.clone(),
			tags: intent.tags.clone(),
			keywords: intent.keywords.clone(),
		};
		let lists = self.fan_out(sources, &criteria, top_k).await?;
		let fused = fusion::fuse(&self.fusion, &lists, top_k as usize);
		let explanation = self.explain(&query, &fused).await;
		let recommendations: Vec<Recommendation> = fused
			.into_iter()
			.map(|item| Recommendation { template: item.template, score: item.score })
			.collect();
		let response = RecommendResponse {
			status: "success".to_string(),
			query: query.clone(),
			recommendations,
			explanation,
			response_time_ms: elapsed_ms(started),
			cache_hit: None,
		};

		self.spawn_followups(&response, &intent, &user_id, embedding);

		Ok(response)
	}

	fn validate_recommend(&self, req: RecommendRequest) -> Result<(String, String, u32)> {
		let cfg = &self.cfg.recommend;
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if query.chars().count() > cfg.max_query_chars as usize {
			return Err(Error::InvalidRequest {
				message: format!("query must be at most {} characters.", cfg.max_query_chars),
			});
		}

		let top_k = req.top_k.unwrap_or(cfg.default_top_k);

		if top_k == 0 || top_k > cfg.max_top_k {
			return Err(Error::InvalidRequest {
				message: format!("top_k must be in the range 1-{}.", cfg.max_top_k),
			});
		}

		let user_id = req
			.user_id
			.map(|user_id| user_id.trim().to_string())
			.filter(|user_id| !user_id.is_empty())
			.unwrap_or_else(|| ANONYMOUS_USER.to_string());

		Ok((query, user_id, top_k))
	}

	/// Runs every selected adapter concurrently and keeps the lists that came back.
	///
	/// Fails only when at least one adapter ran and every one that ran failed.
	async fn fan_out(
		&self,
		sources: SourceSet,
		criteria: &SearchCriteria,
		top_k: u32,
	) -> Result<Vec<RankedList>> {
		let candidates = &self.cfg.recommend.candidates;
		let (vector, tag, keyword) = tokio::join!(
			self.run_adapter(
				&self.backends.vector,
				sources.contains(SourceKind::Vector),
				criteria,
				top_k.saturating_mul(candidates.vector_factor),
			),
			self.run_adapter(
				&self.backends.tag,
				sources.contains(SourceKind::Tag),
				criteria,
				top_k.saturating_mul(candidates.tag_factor),
			),
			self.run_adapter(
				&self.backends.keyword,
				sources.contains(SourceKind::Keyword),
				criteria,
				top_k.saturating_mul(candidates.keyword_factor),
			),
		);
		let mut invoked = 0;
		let mut failures = Vec::new();
		let mut lists = Vec::new();

		for (source, outcome) in [
			(SourceKind::Vector, vector),
			(SourceKind::Tag, tag),
			(SourceKind::Keyword, keyword),
		] {
			match outcome {
				None => {},
				Some(Ok(items)) => {
					invoked += 1;

					lists.push(RankedList::new(source, items));
				},
				Some(Err(err)) => {
					invoked += 1;

					failures.push(format!("{}: {err}", source.as_str()));
				},
			}
		}

		if invoked > 0 && failures.len() == invoked {
			return Err(Error::RetrievalUnavailable { message: failures.join("; ") });
		}

		Ok(lists)
	}

	async fn run_adapter(
		&self,
		adapter: &Arc<dyn RetrievalAdapter>,
		invoke: bool,
		criteria: &SearchCriteria,
		depth: u32,
	) -> Option<Result<Vec<Template>>> {
		if !invoke {
			return None;
		}

		let source = adapter.source().as_str();
		let deadline = Duration::from_millis(self.cfg.recommend.adapter_timeout_ms);
		let outcome = match tokio::time::timeout(deadline, adapter.search(criteria, depth)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout {
				message: format!("{source} search exceeded {} ms.", deadline.as_millis()),
			}),
		};

		match &outcome {
			Ok(items) => tracing::debug!(source, count = items.len(), "Retrieval adapter finished."),
			Err(err) => tracing::warn!(error = %err, source, "Retrieval adapter failed."),
		}

		Some(outcome)
	}

	async fn explain(&self, query: &str, fused: &[FusedItem]) -> String {
		let fallback = &self.cfg.recommend.fallback_explanation;

		if fused.is_empty() {
			return fallback.clone();
		}

		let items: Vec<ExplainItem> = fused
			.iter()
			.map(|item| ExplainItem {
				template_id: item.template.template_id.clone(),
				name: item.template.name.clone(),
				description: item.template.description.clone(),
				tags: item.template.tags.clone(),
			})
			.collect();

		match self.providers.explain.explain(&self.cfg.providers.explain, query, &items).await {
			Ok(text) if !text.trim().is_empty() => text,
			Ok(_) => {
				tracing::warn!("Explanation was empty; using fallback text.");

				fallback.clone()
			},
			Err(err) => {
				tracing::warn!(error = %err, "Explanation failed; using fallback text.");

				fallback.clone()
			},
		}
	}

	/// Interaction log and cache write run detached from the request. Their failures are logged
	/// and never reach the caller.
	fn spawn_followups(
		&self,
		response: &RecommendResponse,
		intent: &Intent,
		user_id: &str,
		embedding: Option<Vec<f32>>,
	) {
		let record = InteractionRecord {
			interaction_id: Uuid::new_v4(),
			user_id: user_id.to_string(),
			query: response.query.clone(),
			intent: serde_json::to_value(intent).unwrap_or(Value::Null),
			recommended_ids: Value::from(
				response
					.recommendations
					.iter()
					.map(|item| item.template.template_id.clone())
					.collect::<Vec<_>>(),
			),
			response_time_ms: i64::try_from(response.response_time_ms).unwrap_or(i64::MAX),
			created_at: OffsetDateTime::now_utc(),
		};
		let interactions = self.backends.interactions.clone();

		tokio::spawn(async move {
			if let Err(err) = interactions.record_interaction(&record).await {
				tracing::warn!(
					error = %err,
					interaction_id = %record.interaction_id,
					"Interaction write failed."
				);
			}
		});

		let payload = match serde_json::to_value(response) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(error = %err, "Cache payload encode failed.");

				return;
			},
		};
		let cache = self.cache.clone();
		let query = response.query.clone();

		tokio::spawn(async move {
			if let Err(err) = cache.store(&query, embedding, &payload).await {
				tracing::warn!(
					error = %err,
					cache_key_prefix = crate::cache::cache_key_prefix(&cache.cache_key(&query)),
					"Cache write failed."
				);
			}
		});
	}
}

fn decode_cached(payload: Value, query: &str) -> Option<RecommendResponse> {
	match serde_json::from_value::<RecommendResponse>(payload) {
		Ok(mut response) => {
			// A semantic hit answers with the neighbor's payload; echo the caller's own query.
			response.query = query.to_string();

			Some(response)
		},
		Err(err) => {
			tracing::warn!(error = %err, "Cache payload decode failed.");

			None
		},
	}
}

fn finish_cached(
	mut response: RecommendResponse,
	hit_kind: Option<CacheHitKind>,
	started: Instant,
) -> RecommendResponse {
	response.cache_hit = hit_kind;
	response.response_time_ms = elapsed_ms(started);

	response
}

fn elapsed_ms(started: Instant) -> u64 {
	u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
