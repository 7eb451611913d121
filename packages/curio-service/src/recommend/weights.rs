use serde::{Deserialize, Serialize};

/// One retrieval signal. The discriminant doubles as the index into per-source arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
	Vector = 0,
	Tag = 1,
	Keyword = 2,
}
impl SourceKind {
	pub const ALL: [Self; 3] = [Self::Vector, Self::Tag, Self::Keyword];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Tag => "tag",
			Self::Keyword => "keyword",
		}
	}

	fn index(self) -> usize {
		self as usize
	}

	fn bit(self) -> u8 {
		1 << self.index()
	}
}

/// A subset of [`SourceKind`], stored as a 3-bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceSet(u8);
impl SourceSet {
	pub const EMPTY: Self = Self(0);

	pub fn with(mut self, source: SourceKind) -> Self {
		self.0 |= source.bit();

		self
	}

	pub fn contains(self, source: SourceKind) -> bool {
		self.0 & source.bit() != 0
	}

	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	pub fn len(self) -> usize {
		self.0.count_ones() as usize
	}

	pub fn iter(self) -> impl Iterator<Item = SourceKind> {
		SourceKind::ALL.into_iter().filter(move |source| self.contains(*source))
	}

	fn mask(self) -> usize {
		usize::from(self.0)
	}

	fn from_mask(mask: usize) -> Self {
		Self((mask & 0b111) as u8)
	}
}
impl FromIterator<SourceKind> for SourceSet {
	fn from_iter<I: IntoIterator<Item = SourceKind>>(iter: I) -> Self {
		iter.into_iter().fold(Self::EMPTY, Self::with)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceWeights([f64; 3]);
impl SourceWeights {
	pub fn get(&self, source: SourceKind) -> f64 {
		self.0[source.index()]
	}

	pub fn total(&self) -> f64 {
		self.0.iter().sum()
	}
}

/// Normalized fusion weights for every combination of sources that returned results.
///
/// Built once from config. A lone source always weighs 1.0, a pair uses its override when one is
/// configured and the base ratio otherwise, all three use the base weights. Every non-empty row
/// sums to 1.0 and absent sources weigh 0.0.
#[derive(Debug, Clone)]
pub struct WeightTable {
	rows: [SourceWeights; 8],
}
impl WeightTable {
	pub fn new(base: [f64; 3], pairs: &[(SourceKind, SourceKind, [f64; 2])]) -> Self {
		let mut rows = [SourceWeights::default(); 8];

		for (mask, row) in rows.iter_mut().enumerate() {
			let present = SourceSet::from_mask(mask);
			let mut raw = [0.0; 3];

			for source in present.iter() {
				raw[source.index()] = base[source.index()];
			}

			if present.len() == 2 {
				for (first, second, weights) in pairs {
					if present == SourceSet::EMPTY.with(*first).with(*second) {
						raw[first.index()] = weights[0];
						raw[second.index()] = weights[1];
					}
				}
			}

			*row = normalize(raw);
		}

		Self { rows }
	}

	pub fn from_config(cfg: &curio_config::Fusion) -> Self {
		let base = [cfg.weights.vector, cfg.weights.tag, cfg.weights.keyword];
		let pairs = [
			(SourceKind::Vector, SourceKind::Tag, cfg.pair_weights.vector_tag),
			(SourceKind::Vector, SourceKind::Keyword, cfg.pair_weights.vector_keyword),
			(SourceKind::Tag, SourceKind::Keyword, cfg.pair_weights.tag_keyword),
		]
		.into_iter()
		.filter_map(|(first, second, weights)| weights.map(|weights| (first, second, weights)))
		.collect::<Vec<_>>();

		Self::new(base, &pairs)
	}

	pub fn weights(&self, present: SourceSet) -> SourceWeights {
		self.rows[present.mask()]
	}
}

fn normalize(raw: [f64; 3]) -> SourceWeights {
	let total: f64 = raw.iter().sum();

	if total <= 0.0 || !total.is_finite() {
		return SourceWeights::default();
	}

	SourceWeights(raw.map(|weight| weight / total))
}
