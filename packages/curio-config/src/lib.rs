mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, Fusion, FusionPairWeights, FusionPopularity,
	FusionWeights, Postgres, ProviderConfig, Providers, Qdrant, Recommend, RecommendCandidates,
	Security, Service, Storage,
};

use std::{fs, path::Path};

/// Ten years. Longer lifetimes would push `expires_at` toward the end of the representable range.
pub const MAX_CACHE_TTL_SECS: i64 = 315_360_000;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim() == cfg.service.http_bind.trim() {
		return Err(Error::Validation {
			message: "service.admin_bind must differ from service.http_bind.".to_string(),
		});
	}
	if cfg.storage.qdrant.templates_collection.trim().is_empty()
		|| cfg.storage.qdrant.cache_collection.trim().is_empty()
	{
		return Err(Error::Validation {
			message: "storage.qdrant collections must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.templates_collection == cfg.storage.qdrant.cache_collection {
		return Err(Error::Validation {
			message: "storage.qdrant.templates_collection and storage.qdrant.cache_collection must differ."
				.to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("intent", &cfg.providers.intent.api_key),
		("embedding", &cfg.providers.embedding.api_key),
		("explain", &cfg.providers.explain.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	validate_recommend(cfg)?;
	validate_fusion(cfg)?;
	validate_cache(cfg)?;

	Ok(())
}

fn validate_recommend(cfg: &Config) -> Result<()> {
	let recommend = &cfg.recommend;

	if recommend.max_top_k == 0 {
		return Err(Error::Validation {
			message: "recommend.max_top_k must be greater than zero.".to_string(),
		});
	}
	if recommend.default_top_k == 0 || recommend.default_top_k > recommend.max_top_k {
		return Err(Error::Validation {
			message: "recommend.default_top_k must be in the range 1-recommend.max_top_k."
				.to_string(),
		});
	}
	if recommend.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "recommend.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if recommend.adapter_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "recommend.adapter_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, factor) in [
		("vector_factor", recommend.candidates.vector_factor),
		("tag_factor", recommend.candidates.tag_factor),
		("keyword_factor", recommend.candidates.keyword_factor),
	] {
		if factor == 0 {
			return Err(Error::Validation {
				message: format!("recommend.candidates.{label} must be greater than zero."),
			});
		}
	}

	Ok(())
}

fn validate_fusion(cfg: &Config) -> Result<()> {
	let fusion = &cfg.fusion;

	if !fusion.rrf_k.is_finite() || fusion.rrf_k < 0.0 {
		return Err(Error::Validation {
			message: "fusion.rrf_k must be a finite number, zero or greater.".to_string(),
		});
	}

	for (label, weight) in [
		("vector", fusion.weights.vector),
		("tag", fusion.weights.tag),
		("keyword", fusion.weights.keyword),
	] {
		if !weight.is_finite() || weight <= 0.0 {
			return Err(Error::Validation {
				message: format!("fusion.weights.{label} must be a finite number greater than zero."),
			});
		}
	}

	for (label, pair) in [
		("vector_tag", fusion.pair_weights.vector_tag),
		("vector_keyword", fusion.pair_weights.vector_keyword),
		("tag_keyword", fusion.pair_weights.tag_keyword),
	] {
		if let Some(pair) = pair
			&& pair.iter().any(|weight| !weight.is_finite() || *weight <= 0.0)
		{
			return Err(Error::Validation {
				message: format!(
					"fusion.pair_weights.{label} entries must be finite numbers greater than zero."
				),
			});
		}
	}

	if !fusion.popularity.divisor.is_finite() || fusion.popularity.divisor <= 0.0 {
		return Err(Error::Validation {
			message: "fusion.popularity.divisor must be a finite number greater than zero."
				.to_string(),
		});
	}
	if !fusion.popularity.cap.is_finite() || fusion.popularity.cap < 0.0 {
		return Err(Error::Validation {
			message: "fusion.popularity.cap must be a finite number, zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn validate_cache(cfg: &Config) -> Result<()> {
	let cache = &cfg.cache;

	if cache.key_prefix.trim().is_empty() {
		return Err(Error::Validation {
			message: "cache.key_prefix must be non-empty.".to_string(),
		});
	}
	if cache.ttl_secs <= 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cache.ttl_secs > MAX_CACHE_TTL_SECS {
		return Err(Error::Validation {
			message: format!("cache.ttl_secs must be at most {MAX_CACHE_TTL_SECS}."),
		});
	}
	if cache.sweep_interval_secs == 0 {
		return Err(Error::Validation {
			message: "cache.sweep_interval_secs must be greater than zero.".to_string(),
		});
	}
	if !cache.similarity_threshold.is_finite() || cache.similarity_threshold < 0.0 {
		return Err(Error::Validation {
			message: "cache.similarity_threshold must be a finite number, zero or greater."
				.to_string(),
		});
	}

	if let Some(max) = cache.max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "cache.max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}

	cfg.cache.key_prefix = cfg.cache.key_prefix.trim().trim_end_matches(':').to_string();
}
