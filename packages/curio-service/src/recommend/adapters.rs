use std::{collections::HashMap, sync::Arc};

use qdrant_client::qdrant::{Query, QueryPointsBuilder, ScoredPoint, Value, value::Kind};

use crate::{BoxFuture, EmbeddingProvider, Error, Result, SourceKind, Template};
use curio_config::EmbeddingProviderConfig;
use curio_storage::{
	db::Db,
	models::MatchedTemplateRow,
	qdrant::{QdrantStore, TEMPLATE_ID_FIELD},
	queries,
};

/// What every adapter gets to search with. Each adapter reads only the fields of its signal.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
	pub query: String,
	/// Query embedding already computed upstream, if any.
	pub embedding: Option<Vec<f32>>,
	pub tags: Vec<String>,
	pub keywords: Vec<String>,
}

/// A retrieval signal behind a uniform interface.
///
/// Zero matches is an empty list, not an error. Errors are reserved for the backing store being
/// unreachable or misbehaving; the caller treats them as the signal being absent.
pub trait RetrievalAdapter
where
	Self: Send + Sync,
{
	fn source(&self) -> SourceKind;

	fn search<'a>(
		&'a self,
		criteria: &'a SearchCriteria,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Template>>>;
}

/// Nearest templates by query embedding. `vector_score` is the L2 distance, smaller is closer.
pub struct VectorAdapter {
	db: Db,
	qdrant: Arc<QdrantStore>,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
}
impl VectorAdapter {
	pub fn new(
		db: Db,
		qdrant: Arc<QdrantStore>,
		embedding: Arc<dyn EmbeddingProvider>,
		embedding_cfg: EmbeddingProviderConfig,
	) -> Self {
		Self { db, qdrant, embedding, embedding_cfg }
	}

	async fn run(&self, criteria: &SearchCriteria, top_k: u32) -> Result<Vec<Template>> {
		if top_k == 0 {
			return Ok(Vec::new());
		}

		let vector = match criteria.embedding.as_ref() {
			Some(vector) => vector.clone(),
			None => self.embedding.embed(&self.embedding_cfg, &criteria.query).await?,
		};

		if vector.len() != self.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		let search = QueryPointsBuilder::new(self.qdrant.templates_collection.clone())
			.query(Query::new_nearest(vector))
			.with_payload(true)
			.limit(u64::from(top_k));
		let response = self.qdrant.client.query(search).await?;
		let ranked = ranked_template_ids(&response.result);
		let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
		let rows = queries::fetch_templates_by_ids(&self.db, &ids).await?;
		let mut by_id: HashMap<String, Template> =
			rows.into_iter().map(|row| (row.template_id.clone(), Template::from(row))).collect();
		let mut out = Vec::with_capacity(ranked.len());

		for (template_id, distance) in ranked {
			// Points can outlive their rows; a template missing here was archived or deleted.
			let Some(mut template) = by_id.remove(&template_id) else {
				continue;
			};

			template.vector_score = Some(distance);

			out.push(template);
		}

		Ok(out)
	}
}
impl RetrievalAdapter for VectorAdapter {
	fn source(&self) -> SourceKind {
		SourceKind::Vector
	}

	fn search<'a>(
		&'a self,
		criteria: &'a SearchCriteria,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Template>>> {
		Box::pin(self.run(criteria, top_k))
	}
}

/// Templates sharing intent tags. `tag_score` is the number of shared tags.
pub struct TagAdapter {
	db: Db,
}
impl TagAdapter {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl RetrievalAdapter for TagAdapter {
	fn source(&self) -> SourceKind {
		SourceKind::Tag
	}

	fn search<'a>(
		&'a self,
		criteria: &'a SearchCriteria,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Template>>> {
		Box::pin(async move {
			let rows = queries::filter_templates_by_tags(&self.db, &criteria.tags, top_k).await?;

			Ok(rows
				.into_iter()
				.map(|row| with_match_score(row, |template, matches| template.tag_score = matches))
				.collect())
		})
	}
}

/// Templates whose text mentions intent keywords. `keyword_score` is the number of keywords hit.
pub struct KeywordAdapter {
	db: Db,
}
impl KeywordAdapter {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl RetrievalAdapter for KeywordAdapter {
	fn source(&self) -> SourceKind {
		SourceKind::Keyword
	}

	fn search<'a>(
		&'a self,
		criteria: &'a SearchCriteria,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Template>>> {
		Box::pin(async move {
			let rows =
				queries::search_templates_by_keywords(&self.db, &criteria.keywords, top_k).await?;

			Ok(rows
				.into_iter()
				.map(|row| {
					with_match_score(row, |template, matches| template.keyword_score = matches)
				})
				.collect())
		})
	}
}

fn with_match_score(
	row: MatchedTemplateRow,
	set: impl FnOnce(&mut Template, Option<f32>),
) -> Template {
	let mut template = Template::from(row.template);

	set(&mut template, Some(row.matches as f32));

	template
}

fn ranked_template_ids(points: &[ScoredPoint]) -> Vec<(String, f32)> {
	let mut out: Vec<(String, f32)> = Vec::with_capacity(points.len());

	for point in points {
		let Some(template_id) = payload_string(&point.payload, TEMPLATE_ID_FIELD) else {
			tracing::warn!(source = "vector", "Template point is missing its template_id payload.");

			continue;
		};

		if out.iter().any(|(seen, _)| seen == &template_id) {
			continue;
		}

		out.push((template_id, point.score));
	}

	out
}

pub(crate) fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) if !text.is_empty() => Some(text.clone()),
		_ => None,
	}
}
