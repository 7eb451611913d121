use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
	pub template_id: String,
	pub name: String,
	pub description: String,
	pub category: String,
	pub tags: Vec<String>,
	pub style: String,
	pub color_scheme: String,
	pub use_case: String,
	pub thumbnail_url: String,
	pub preview_url: String,
	pub view_count: i64,
	pub use_count: i64,
	pub rating: f32,
}

/// A template together with the match count a relational query ranked it by.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchedTemplateRow {
	#[sqlx(flatten)]
	pub template: TemplateRow,
	pub matches: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CacheEntry {
	pub cache_key: String,
	pub query_text: String,
	pub payload: Value,
	pub created_at: OffsetDateTime,
	pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct InteractionRecord {
	pub interaction_id: Uuid,
	pub user_id: String,
	pub query: String,
	pub intent: Value,
	pub recommended_ids: Value,
	pub response_time_ms: i64,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct FeedbackRecord {
	pub feedback_id: Uuid,
	pub user_id: String,
	pub query: String,
	pub template_id: Option<String>,
	pub feedback: String,
	pub created_at: OffsetDateTime,
}
