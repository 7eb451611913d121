use qdrant_client::qdrant::{CreateCollectionBuilder, Distance, VectorParamsBuilder};

use crate::Result;

pub const TEMPLATE_ID_FIELD: &str = "template_id";
pub const CACHE_KEY_FIELD: &str = "cache_key";
pub const QUERY_TEXT_FIELD: &str = "query_text";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub templates_collection: String,
	pub cache_collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &curio_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			templates_collection: cfg.templates_collection.clone(),
			cache_collection: cfg.cache_collection.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	/// Creates both collections with L2 distance when they are missing. Existing collections are
	/// left untouched.
	pub async fn ensure_collections(&self) -> Result<()> {
		for collection in [&self.templates_collection, &self.cache_collection] {
			if self.client.collection_exists(collection.as_str()).await? {
				continue;
			}

			let builder = CreateCollectionBuilder::new(collection.clone()).vectors_config(
				VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Euclid),
			);

			self.client.create_collection(builder).await?;
		}

		Ok(())
	}
}
