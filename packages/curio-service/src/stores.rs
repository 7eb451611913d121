use std::sync::Arc;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Filter, PointStruct, Query, QueryPointsBuilder,
		UpsertPointsBuilder,
	},
};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	BoxFuture, CacheStore, Error, FeedbackRecord, InteractionRecord, InteractionSink, QueryIndex,
	QueryNeighbor, Result, TemplateCatalog, TemplateRow, recommend::adapters::payload_string,
};
use curio_storage::{
	db::Db,
	models::CacheEntry,
	qdrant::{CACHE_KEY_FIELD, QUERY_TEXT_FIELD, QdrantStore, TEMPLATE_ID_FIELD},
	queries,
};

/// Cache payloads in `recommend_cache`. Expired rows are invisible to reads, overwritten by the
/// next write for the same key, and deleted by the sweep.
pub struct PgCacheStore {
	db: Db,
}
impl PgCacheStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl CacheStore for PgCacheStore {
	fn get<'a>(&'a self, cache_key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let entry = queries::fetch_cache_entry(&self.db, cache_key, now).await?;

			Ok(entry.map(|entry| entry.payload))
		})
	}

	fn put<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		payload: &'a Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let created_at = OffsetDateTime::now_utc();
			let entry = CacheEntry {
				cache_key: cache_key.to_string(),
				query_text: query_text.to_string(),
				payload: payload.clone(),
				created_at,
				expires_at: expires_at(created_at, ttl_secs)?,
			};

			queries::store_cache_entry(&self.db, &entry).await?;

			Ok(())
		})
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(queries::delete_expired_cache_entries(&self.db, now).await?) })
	}
}

/// Query embeddings in the Qdrant cache collection, one point per cache key.
pub struct QdrantQueryIndex {
	qdrant: Arc<QdrantStore>,
}
impl QdrantQueryIndex {
	pub fn new(qdrant: Arc<QdrantStore>) -> Self {
		Self { qdrant }
	}
}
impl QueryIndex for QdrantQueryIndex {
	fn nearest<'a>(
		&'a self,
		embedding: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<QueryNeighbor>>> {
		Box::pin(async move {
			let search = QueryPointsBuilder::new(self.qdrant.cache_collection.clone())
				.query(Query::new_nearest(embedding.to_vec()))
				.with_payload(true)
				.limit(limit);
			let response = self.qdrant.client.query(search).await?;
			let mut out = Vec::with_capacity(response.result.len());

			for point in response.result {
				let Some(cache_key) = payload_string(&point.payload, CACHE_KEY_FIELD) else {
					tracing::warn!("Cache point is missing its cache_key payload.");

					continue;
				};

				out.push(QueryNeighbor {
					cache_key,
					query_text: payload_string(&point.payload, QUERY_TEXT_FIELD)
						.unwrap_or_default(),
					distance: point.score,
				});
			}

			Ok(out)
		})
	}

	fn insert<'a>(
		&'a self,
		cache_key: &'a str,
		query_text: &'a str,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut payload = Payload::new();

			payload.insert(CACHE_KEY_FIELD, cache_key.to_string());
			payload.insert(QUERY_TEXT_FIELD, query_text.to_string());

			let point = PointStruct::new(
				cache_point_id(cache_key).to_string(),
				embedding.to_vec(),
				payload,
			);

			self.qdrant
				.client
				.upsert_points(
					UpsertPointsBuilder::new(self.qdrant.cache_collection.clone(), vec![point])
						.wait(true),
				)
				.await?;

			Ok(())
		})
	}

	fn remove<'a>(&'a self, cache_keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if cache_keys.is_empty() {
				return Ok(());
			}

			let filter = Filter::must([Condition::matches(CACHE_KEY_FIELD, cache_keys.to_vec())]);
			let delete = DeletePointsBuilder::new(self.qdrant.cache_collection.clone())
				.points(filter)
				.wait(true);

			self.qdrant.client.delete_points(delete).await?;

			Ok(())
		})
	}
}

/// Template rows in Postgres and their vectors in the templates collection.
pub struct PgQdrantCatalog {
	db: Db,
	qdrant: Arc<QdrantStore>,
}
impl PgQdrantCatalog {
	pub fn new(db: Db, qdrant: Arc<QdrantStore>) -> Self {
		Self { db, qdrant }
	}
}
impl TemplateCatalog for PgQdrantCatalog {
	fn upsert<'a>(
		&'a self,
		row: &'a TemplateRow,
		embedding: &'a [f32],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::upsert_template(&self.db, row).await?;

			let mut payload = Payload::new();

			payload.insert(TEMPLATE_ID_FIELD, row.template_id.clone());

			let point = PointStruct::new(
				template_point_id(&row.template_id).to_string(),
				embedding.to_vec(),
				payload,
			);

			self.qdrant
				.client
				.upsert_points(
					UpsertPointsBuilder::new(self.qdrant.templates_collection.clone(), vec![point])
						.wait(true),
				)
				.await?;

			Ok(())
		})
	}

	fn view<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<Option<TemplateRow>>> {
		Box::pin(async move { Ok(queries::view_template(&self.db, template_id).await?) })
	}
}

pub struct PgInteractionSink {
	db: Db,
}
impl PgInteractionSink {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl InteractionSink for PgInteractionSink {
	fn record_interaction<'a>(
		&'a self,
		record: &'a InteractionRecord,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::insert_interaction(&self.db, record).await?) })
	}

	fn record_feedback<'a>(&'a self, record: &'a FeedbackRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(queries::insert_feedback(&self.db, record).await?) })
	}

	fn increment_use_count<'a>(&'a self, template_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(queries::increment_use_count(&self.db, template_id).await?) })
	}
}

/// Stable point id for a cache key, so rewriting a key replaces its point.
pub fn cache_point_id(cache_key: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, cache_key.as_bytes())
}

/// Stable point id for a template, so re-ingesting it replaces its point.
pub fn template_point_id(template_id: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, template_id.as_bytes())
}

fn expires_at(created_at: OffsetDateTime, ttl_secs: i64) -> Result<OffsetDateTime> {
	created_at.checked_add(Duration::seconds(ttl_secs)).ok_or_else(|| Error::InvalidRequest {
		message: format!("Cache TTL of {ttl_secs} seconds is out of range."),
	})
}
