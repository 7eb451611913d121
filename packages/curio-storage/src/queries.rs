use time::OffsetDateTime;

use crate::{
	Result,
	db::Db,
	models::{CacheEntry, FeedbackRecord, InteractionRecord, MatchedTemplateRow, TemplateRow},
};

const TEMPLATE_COLUMNS: &str = "\
	template_id,
	name,
	description,
	category,
	tags,
	style,
	color_scheme,
	use_case,
	thumbnail_url,
	preview_url,
	view_count,
	use_count,
	rating";

/// Inserts or refreshes a template. `view_count` and `use_count` seed new rows only; an existing
/// row keeps the counters it has accumulated.
pub async fn upsert_template(db: &Db, template: &TemplateRow) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO templates (
	template_id,
	name,
	description,
	category,
	tags,
	style,
	color_scheme,
	use_case,
	thumbnail_url,
	preview_url,
	view_count,
	use_count,
	rating
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
ON CONFLICT (template_id) DO UPDATE SET
	name = EXCLUDED.name,
	description = EXCLUDED.description,
	category = EXCLUDED.category,
	tags = EXCLUDED.tags,
	style = EXCLUDED.style,
	color_scheme = EXCLUDED.color_scheme,
	use_case = EXCLUDED.use_case,
	thumbnail_url = EXCLUDED.thumbnail_url,
	preview_url = EXCLUDED.preview_url,
	rating = EXCLUDED.rating,
	updated_at = now()",
	)
	.bind(template.template_id.as_str())
	.bind(template.name.as_str())
	.bind(template.description.as_str())
	.bind(template.category.as_str())
	.bind(template.tags.as_slice())
	.bind(template.style.as_str())
	.bind(template.color_scheme.as_str())
	.bind(template.use_case.as_str())
	.bind(template.thumbnail_url.as_str())
	.bind(template.preview_url.as_str())
	.bind(template.view_count)
	.bind(template.use_count)
	.bind(template.rating)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Active templates for the given ids. Row order is unspecified; callers restore their own order.
pub async fn fetch_templates_by_ids(db: &Db, ids: &[String]) -> Result<Vec<TemplateRow>> {
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!(
		"SELECT {TEMPLATE_COLUMNS}\nFROM templates\nWHERE status = 'active' AND template_id = ANY($1)"
	);
	let rows = sqlx::query_as::<_, TemplateRow>(&sql).bind(ids).fetch_all(&db.pool).await?;

	Ok(rows)
}

/// Active templates sharing at least one tag, most overlapping tags first.
pub async fn filter_templates_by_tags(
	db: &Db,
	tags: &[String],
	limit: u32,
) -> Result<Vec<MatchedTemplateRow>> {
	if tags.is_empty() || limit == 0 {
		return Ok(Vec::new());
	}

	let sql = format!(
		"\
SELECT
	{TEMPLATE_COLUMNS},
	cardinality(ARRAY(SELECT unnest(tags) INTERSECT SELECT unnest($1::text[])))::bigint AS matches
FROM templates
WHERE status = 'active' AND tags && $1::text[]
ORDER BY matches DESC, template_id ASC
LIMIT $2"
	);
	let rows = sqlx::query_as::<_, MatchedTemplateRow>(&sql)
		.bind(tags)
		.bind(i64::from(limit))
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Active templates whose text fields contain any keyword, most matching keywords first.
pub async fn search_templates_by_keywords(
	db: &Db,
	keywords: &[String],
	limit: u32,
) -> Result<Vec<MatchedTemplateRow>> {
	if keywords.is_empty() || limit == 0 {
		return Ok(Vec::new());
	}

	let patterns: Vec<String> =
		keywords.iter().map(|keyword| format!("%{}%", escape_like(keyword))).collect();
	let sql = format!(
		"\
SELECT
	{TEMPLATE_COLUMNS},
	(
		SELECT count(*)
		FROM unnest($1::text[]) AS pattern
		WHERE name ILIKE pattern
			OR description ILIKE pattern
			OR category ILIKE pattern
			OR style ILIKE pattern
			OR use_case ILIKE pattern
	)::bigint AS matches
FROM templates
WHERE status = 'active'
	AND EXISTS (
		SELECT 1
		FROM unnest($1::text[]) AS pattern
		WHERE name ILIKE pattern
			OR description ILIKE pattern
			OR category ILIKE pattern
			OR style ILIKE pattern
			OR use_case ILIKE pattern
	)
ORDER BY matches DESC, template_id ASC
LIMIT $2"
	);
	let rows = sqlx::query_as::<_, MatchedTemplateRow>(&sql)
		.bind(patterns.as_slice())
		.bind(i64::from(limit))
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Counts one view of an active template and returns it with the updated counter.
pub async fn view_template(db: &Db, template_id: &str) -> Result<Option<TemplateRow>> {
	let sql = format!(
		"\
UPDATE templates
SET view_count = view_count + 1
WHERE template_id = $1 AND status = 'active'
RETURNING {TEMPLATE_COLUMNS}"
	);
	let row =
		sqlx::query_as::<_, TemplateRow>(&sql).bind(template_id).fetch_optional(&db.pool).await?;

	Ok(row)
}

/// Returns whether a template row was updated.
pub async fn increment_use_count(db: &Db, template_id: &str) -> Result<bool> {
	let result = sqlx::query(
		"UPDATE templates SET use_count = use_count + 1, updated_at = now() WHERE template_id = $1",
	)
	.bind(template_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn fetch_cache_entry(
	db: &Db,
	cache_key: &str,
	now: OffsetDateTime,
) -> Result<Option<CacheEntry>> {
	let row = sqlx::query_as::<_, CacheEntry>(
		"\
SELECT cache_key, query_text, payload, created_at, expires_at
FROM recommend_cache
WHERE cache_key = $1 AND expires_at > $2",
	)
	.bind(cache_key)
	.bind(now)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn store_cache_entry(db: &Db, entry: &CacheEntry) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO recommend_cache (cache_key, query_text, payload, created_at, expires_at)
VALUES ($1,$2,$3,$4,$5)
ON CONFLICT (cache_key) DO UPDATE SET
	query_text = EXCLUDED.query_text,
	payload = EXCLUDED.payload,
	created_at = EXCLUDED.created_at,
	expires_at = EXCLUDED.expires_at",
	)
	.bind(entry.cache_key.as_str())
	.bind(entry.query_text.as_str())
	.bind(&entry.payload)
	.bind(entry.created_at)
	.bind(entry.expires_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Deletes every entry that expired at or before `now` and returns their keys.
pub async fn delete_expired_cache_entries(db: &Db, now: OffsetDateTime) -> Result<Vec<String>> {
	let keys = sqlx::query_scalar::<_, String>(
		"DELETE FROM recommend_cache WHERE expires_at <= $1 RETURNING cache_key",
	)
	.bind(now)
	.fetch_all(&db.pool)
	.await?;

	Ok(keys)
}

pub async fn insert_interaction(db: &Db, record: &InteractionRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO user_interactions (
	interaction_id,
	user_id,
	query,
	intent,
	recommended_ids,
	response_time_ms,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7)",
	)
	.bind(record.interaction_id)
	.bind(record.user_id.as_str())
	.bind(record.query.as_str())
	.bind(&record.intent)
	.bind(&record.recommended_ids)
	.bind(record.response_time_ms)
	.bind(record.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn insert_feedback(db: &Db, record: &FeedbackRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO user_feedback (feedback_id, user_id, query, template_id, feedback, created_at)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(record.feedback_id)
	.bind(record.user_id.as_str())
	.bind(record.query.as_str())
	.bind(record.template_id.as_deref())
	.bind(record.feedback.as_str())
	.bind(record.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}
