use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// The slice of a recommended template the explanation model gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainItem {
	pub template_id: String,
	pub name: String,
	pub description: String,
	pub tags: Vec<String>,
}

pub async fn explain(
	cfg: &curio_config::ProviderConfig,
	query: &str,
	items: &[ExplainItem],
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({
		"model": cfg.model,
		"query": query,
		"templates": items,
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_explain_response(&json)
}

fn parse_explain_response(json: &Value) -> Result<String> {
	let text = crate::chat_content(json)
		.or_else(|| json.get("explanation").and_then(|v| v.as_str()))
		.map(str::trim)
		.unwrap_or_default();

	if text.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Explanation response is empty.".to_string(),
		});
	}

	Ok(text.to_string())
}
