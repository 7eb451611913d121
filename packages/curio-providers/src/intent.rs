use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Which retrieval signals a query should be answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
	Vector,
	Tag,
	Keyword,
	Hybrid,
}
impl SearchStrategy {
	/// Unknown labels fall back to [`SearchStrategy::Hybrid`] so a drifting model never disables
	/// retrieval outright.
	pub fn parse(label: &str) -> Self {
		match label.trim().to_ascii_lowercase().as_str() {
			"vector" => Self::Vector,
			"tag" | "tags" | "tag_only" => Self::Tag,
			"keyword" | "keywords" | "keyword_only" => Self::Keyword,
			_ => Self::Hybrid,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Tag => "tag",
			Self::Keyword => "keyword",
			Self::Hybrid => "hybrid",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
	pub intent: String,
	#[serde(default)]
	pub features: BTreeMap<String, String>,
	#[serde(default)]
	pub keywords: Vec<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	pub strategy: SearchStrategy,
}

#[derive(Debug, Deserialize)]
struct IntentWire {
	#[serde(default)]
	intent: String,
	#[serde(default)]
	features: BTreeMap<String, String>,
	#[serde(default)]
	keywords: Vec<String>,
	#[serde(default)]
	tags: Vec<String>,
	#[serde(default, alias = "strategy")]
	search_strategy: String,
}

pub async fn resolve_intent(
	cfg: &curio_config::ProviderConfig,
	query: &str,
	user_id: &str,
) -> Result<Intent> {
	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({
		"model": cfg.model,
		"query": query,
		"user_id": user_id,
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_intent_response(json)
}

fn parse_intent_response(json: Value) -> Result<Intent> {
	let wire: IntentWire = if let Some(content) = crate::chat_content(&json) {
		serde_json::from_str(content).map_err(|_| Error::InvalidResponse {
			message: "Intent content is not valid JSON.".to_string(),
		})?
	} else if json.is_object() {
		serde_json::from_value(json)?
	} else {
		return Err(Error::InvalidResponse {
			message: "Intent response is missing JSON content.".to_string(),
		});
	};

	Ok(Intent {
		intent: wire.intent,
		features: wire.features,
		keywords: clean_terms(wire.keywords),
		tags: clean_terms(wire.tags),
		strategy: SearchStrategy::parse(&wire.search_strategy),
	})
}

fn clean_terms(terms: Vec<String>) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(terms.len());

	for term in terms {
		let trimmed = term.trim();

		if trimmed.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(trimmed)) {
			continue;
		}

		out.push(trimmed.to_string());
	}

	out
}
