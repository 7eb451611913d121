use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub recommend: Recommend,
	#[serde(default)]
	pub fusion: Fusion,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	/// Listener for ingestion and maintenance routes. Always loopback.
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	/// Collection holding one point per template, payload `template_id`.
	pub templates_collection: String,
	/// Collection holding one point per cached query, payload `cache_key` and `query_text`.
	pub cache_collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub intent: ProviderConfig,
	pub embedding: EmbeddingProviderConfig,
	pub explain: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Recommend {
	pub default_top_k: u32,
	pub max_top_k: u32,
	pub max_query_chars: u32,
	/// Deadline applied to every retrieval adapter call. A timeout counts as an adapter failure.
	pub adapter_timeout_ms: u64,
	pub fallback_explanation: String,
	pub candidates: RecommendCandidates,
}
impl Default for Recommend {
	fn default() -> Self {
		Self {
			default_top_k: 5,
			max_top_k: 20,
			max_query_chars: 500,
			adapter_timeout_ms: 3_000,
			fallback_explanation: "Here are the templates we recommend for you.".to_string(),
			candidates: RecommendCandidates::default(),
		}
	}
}

/// Multipliers over the requested `top_k` that decide how deep each adapter searches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendCandidates {
	pub vector_factor: u32,
	pub tag_factor: u32,
	pub keyword_factor: u32,
}
impl Default for RecommendCandidates {
	fn default() -> Self {
		Self { vector_factor: 2, tag_factor: 2, keyword_factor: 1 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Fusion {
	pub rrf_k: f64,
	pub weights: FusionWeights,
	pub pair_weights: FusionPairWeights,
	pub popularity: FusionPopularity,
}
impl Default for Fusion {
	fn default() -> Self {
		Self {
			rrf_k: 60.0,
			weights: FusionWeights::default(),
			pair_weights: FusionPairWeights::default(),
			popularity: FusionPopularity::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
	pub vector: f64,
	pub tag: f64,
	pub keyword: f64,
}
impl Default for FusionWeights {
	fn default() -> Self {
		Self { vector: 0.5, tag: 0.3, keyword: 0.2 }
	}
}

/// Optional weights used when exactly two sources are present. Each pair is normalized to sum
/// to 1.0; a missing pair falls back to the base weights' ratio.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionPairWeights {
	pub vector_tag: Option<[f64; 2]>,
	pub vector_keyword: Option<[f64; 2]>,
	pub tag_keyword: Option<[f64; 2]>,
}
impl Default for FusionPairWeights {
	fn default() -> Self {
		Self { vector_tag: Some([0.6, 0.4]), vector_keyword: None, tag_keyword: None }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionPopularity {
	pub divisor: f64,
	pub cap: f64,
}
impl Default for FusionPopularity {
	fn default() -> Self {
		Self { divisor: 1_000.0, cap: 0.1 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub key_prefix: String,
	pub ttl_secs: i64,
	/// Maximum L2 distance between query embeddings that still counts as a semantic hit.
	pub similarity_threshold: f32,
	pub max_payload_bytes: Option<u64>,
	/// Period of the background pass that drops expired entries from both cache stores.
	pub sweep_interval_secs: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			enabled: true,
			key_prefix: "recommend".to_string(),
			ttl_secs: 86_400,
			similarity_threshold: 0.15,
			max_payload_bytes: Some(262_144),
			sweep_interval_secs: 600,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}
impl Default for Security {
	fn default() -> Self {
		Self { bind_localhost_only: true, api_auth_token: None }
	}
}
