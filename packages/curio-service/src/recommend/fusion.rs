use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use crate::{
	Template,
	recommend::weights::{SourceKind, SourceSet, WeightTable},
};

/// One adapter's answer. Only the position of each template matters to fusion.
#[derive(Debug, Clone)]
pub struct RankedList {
	pub source: SourceKind,
	pub items: Vec<Template>,
}
impl RankedList {
	pub fn new(source: SourceKind, items: Vec<Template>) -> Self {
		Self { source, items }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedItem {
	pub template: Template,
	pub score: f64,
}

#[derive(Debug, Clone)]
pub struct FusionParams {
	pub rrf_k: f64,
	pub popularity_divisor: f64,
	pub popularity_cap: f64,
	pub table: WeightTable,
}
impl FusionParams {
	pub fn from_config(cfg: &curio_config::Fusion) -> Self {
		Self {
			rrf_k: cfg.rrf_k,
			popularity_divisor: cfg.popularity.divisor,
			popularity_cap: cfg.popularity.cap,
			table: WeightTable::from_config(cfg),
		}
	}

	pub fn popularity_boost(&self, use_count: i64) -> f64 {
		if use_count <= 0 || self.popularity_divisor <= 0.0 {
			return 0.0;
		}

		(use_count as f64 / self.popularity_divisor).min(self.popularity_cap)
	}
}

/// Weighted reciprocal rank fusion over the lists that returned anything.
///
/// Weights come from the presence state of the non-empty lists, so a source that failed or found
/// nothing hands its share to the others. Each template appears once, scored by the sum of
/// `weight / (rrf_k + rank + 1)` over the lists containing it plus its popularity boost. Ties keep
/// first-seen order across the lists as given.
pub fn fuse(params: &FusionParams, lists: &[RankedList], top_k: usize) -> Vec<FusedItem> {
	let present: SourceSet =
		lists.iter().filter(|list| !list.items.is_empty()).map(|list| list.source).collect();

	if present.is_empty() || top_k == 0 {
		return Vec::new();
	}

	let weights = params.table.weights(present);
	let mut fused: Vec<FusedItem> = Vec::new();
	let mut positions: HashMap<String, usize> = HashMap::new();

	for list in lists {
		let weight = weights.get(list.source);
		let mut seen_in_list = HashSet::new();

		for (rank, template) in list.items.iter().enumerate() {
			if !seen_in_list.insert(template.template_id.as_str()) {
				continue;
			}

			let contribution = rrf_contribution(params.rrf_k, rank, weight);

			match positions.get(&template.template_id) {
				Some(&idx) => {
					let entry = &mut fused[idx];

					entry.score += contribution;
					entry.template.absorb_scores(template);
				},
				None => {
					positions.insert(template.template_id.clone(), fused.len());
					fused.push(FusedItem { template: template.clone(), score: contribution });
				},
			}
		}
	}

	for item in &mut fused {
		item.score += params.popularity_boost(item.template.use_count);
	}

	fused.sort_by(|a, b| cmp_f64_desc(a.score, b.score));
	fused.truncate(top_k);

	fused
}

pub fn rrf_contribution(rrf_k: f64, rank: usize, weight: f64) -> f64 {
	weight / (rrf_k + rank as f64 + 1.0)
}

pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
