use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CurioService, Error, FeedbackRecord, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
	Positive,
	Negative,
	Neutral,
}
impl FeedbackKind {
	pub fn parse(label: &str) -> Option<Self> {
		match label.trim().to_ascii_lowercase().as_str() {
			"positive" => Some(Self::Positive),
			"negative" => Some(Self::Negative),
			"neutral" => Some(Self::Neutral),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Positive => "positive",
			Self::Negative => "negative",
			Self::Neutral => "neutral",
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
	pub user_id: String,
	pub query: String,
	#[serde(default)]
	pub template_id: Option<String>,
	pub feedback: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
	pub status: String,
}

impl CurioService {
	/// Stores a feedback record. Positive feedback naming a template also bumps its `use_count`.
	pub async fn record_feedback(&self, req: FeedbackRequest) -> Result<FeedbackResponse> {
		let user_id = req.user_id.trim();
		let query = req.query.trim();

		if user_id.is_empty() {
			return Err(Error::InvalidRequest { message: "user_id must be non-empty.".to_string() });
		}
		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let Some(kind) = FeedbackKind::parse(&req.feedback) else {
			return Err(Error::InvalidRequest {
				message: "feedback must be one of positive, negative, or neutral.".to_string(),
			});
		};
		let template_id = req
			.template_id
			.map(|template_id| template_id.trim().to_string())
			.filter(|template_id| !template_id.is_empty());
		let record = FeedbackRecord {
			feedback_id: Uuid::new_v4(),
			user_id: user_id.to_string(),
			query: query.to_string(),
			template_id: template_id.clone(),
			feedback: kind.as_str().to_string(),
			created_at: OffsetDateTime::now_utc(),
		};

		self.backends.interactions.record_feedback(&record).await?;

		if kind == FeedbackKind::Positive
			&& let Some(template_id) = template_id.as_deref()
			&& !self.backends.interactions.increment_use_count(template_id).await?
		{
			tracing::info!(template_id, "Positive feedback names an unknown template.");
		}

		Ok(FeedbackResponse { status: "success".to_string() })
	}
}
