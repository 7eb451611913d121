use serde::{Deserialize, Serialize};

use crate::{CurioService, Error, Result, Template, TemplateRow};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateInput {
	pub template_id: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub style: String,
	#[serde(default)]
	pub color_scheme: String,
	#[serde(default)]
	pub use_case: String,
	#[serde(default)]
	pub thumbnail_url: String,
	#[serde(default)]
	pub preview_url: String,
	/// Starting counters for a template seen for the first time. Existing rows keep theirs.
	#[serde(default)]
	pub view_count: i64,
	#[serde(default)]
	pub use_count: i64,
	#[serde(default)]
	pub rating: f32,
}
impl TemplateInput {
	/// The text a template's vector is embedded from.
	pub fn embedding_text(&self) -> String {
		format!(
			"{}. {}. Category: {}. Style: {}. Colors: {}. Use case: {}. Tags: {}",
			self.name,
			self.description,
			self.category,
			self.style,
			self.color_scheme,
			self.use_case,
			self.tags.join(", ")
		)
	}

	fn into_row(self) -> TemplateRow {
		TemplateRow {
			template_id: self.template_id,
			name: self.name,
			description: self.description,
			category: self.category,
			tags: self.tags,
			style: self.style,
			color_scheme: self.color_scheme,
			use_case: self.use_case,
			thumbnail_url: self.thumbnail_url,
			preview_url: self.preview_url,
			view_count: self.view_count,
			use_count: self.use_count,
			rating: self.rating,
		}
	}

	fn normalize(&mut self) {
		self.template_id = self.template_id.trim().to_string();
		self.name = self.name.trim().to_string();
		self.tags = self
			.tags
			.iter()
			.map(|tag| tag.trim().to_string())
			.filter(|tag| !tag.is_empty())
			.collect();
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestRequest {
	pub templates: Vec<TemplateInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
	pub ingested_count: u64,
	/// Templates skipped because their embedding failed or had the wrong dimension.
	pub error_count: u64,
}

impl CurioService {
	/// Embeds each template and writes its row and vector point.
	///
	/// Malformed input rejects the whole batch before anything is written. A template whose
	/// embedding fails is skipped and counted; a store failure aborts the batch.
	pub async fn ingest_templates(&self, req: IngestRequest) -> Result<IngestReport> {
		let mut templates = req.templates;

		if templates.is_empty() {
			return Err(Error::InvalidRequest {
				message: "templates must be non-empty.".to_string(),
			});
		}

		for (idx, template) in templates.iter_mut().enumerate() {
			template.normalize();

			if template.template_id.is_empty() {
				return Err(Error::InvalidRequest {
					message: format!("templates[{idx}].template_id must be non-empty."),
				});
			}
			if template.name.is_empty() {
				return Err(Error::InvalidRequest {
					message: format!("templates[{idx}].name must be non-empty."),
				});
			}
			if !template.rating.is_finite() {
				return Err(Error::InvalidRequest {
					message: format!("templates[{idx}].rating must be a finite number."),
				});
			}
		}

		let expected_dim = self.cfg.storage.qdrant.vector_dim as usize;
		let mut report = IngestReport { ingested_count: 0, error_count: 0 };

		for template in templates {
			let text = template.embedding_text();
			let embedding =
				match self.providers.embedding.embed(&self.cfg.providers.embedding, &text).await {
					Ok(embedding) => embedding,
					Err(err) => {
						tracing::warn!(
							error = %err,
							template_id = %template.template_id,
							"Template embedding failed; skipping."
						);

						report.error_count += 1;

						continue;
					},
				};

			if embedding.len() != expected_dim {
				tracing::warn!(
					template_id = %template.template_id,
					expected_dim,
					actual_dim = embedding.len(),
					"Template embedding dimension mismatch; skipping."
				);

				report.error_count += 1;

				continue;
			}

			let row = template.into_row();

			self.backends.catalog.upsert(&row, &embedding).await?;

			report.ingested_count += 1;
		}

		tracing::info!(
			ingested_count = report.ingested_count,
			error_count = report.error_count,
			"Templates ingested."
		);

		Ok(report)
	}

	/// Returns an active template and counts the view.
	pub async fn get_template(&self, template_id: &str) -> Result<Template> {
		let template_id = template_id.trim();

		if template_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "template_id must be non-empty.".to_string(),
			});
		}

		match self.backends.catalog.view(template_id).await? {
			Some(row) => Ok(Template::from(row)),
			None => Err(Error::NotFound { message: format!("No active template {template_id}.") }),
		}
	}
}
