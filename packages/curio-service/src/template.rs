use serde::{Deserialize, Serialize};

use curio_storage::models::TemplateRow;

/// A recommendable template as one retrieval source saw it.
///
/// Attributes are a read-only snapshot of the template store. The per-source scores are only
/// set by the adapter that returned the template and are informational: fusion ranks by
/// position, never by these raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
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
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vector_score: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag_score: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub keyword_score: Option<f32>,
}
impl Template {
	/// Copies any source score this template lacks from another sighting of the same template.
	pub fn absorb_scores(&mut self, other: &Template) {
		self.vector_score = self.vector_score.or(other.vector_score);
		self.tag_score = self.tag_score.or(other.tag_score);
		self.keyword_score = self.keyword_score.or(other.keyword_score);
	}
}
impl From<TemplateRow> for Template {
	fn from(row: TemplateRow) -> Self {
		Self {
			template_id: row.template_id,
			name: row.name,
			description: row.description,
			category: row.category,
			tags: row.tags,
			style: row.style,
			color_scheme: row.color_scheme,
			use_case: row.use_case,
			thumbnail_url: row.thumbnail_url,
			preview_url: row.preview_url,
			view_count: row.view_count,
			use_count: row.use_count,
			rating: row.rating,
			vector_score: None,
			tag_score: None,
			keyword_score: None,
		}
	}
}
