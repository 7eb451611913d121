use std::sync::Arc;

use curio_service::CurioService;
use curio_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<CurioService>,
	pub auth_token: Option<Arc<str>>,
}
impl AppState {
	/// Connects both stores and makes sure the schema and collections exist before serving.
	pub async fn new(config: curio_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collections().await?;

		Ok(Self::from_service(CurioService::new(config, db, qdrant)))
	}

	pub fn from_service(service: CurioService) -> Self {
		let auth_token = service.cfg.security.api_auth_token.as_deref().map(Arc::from);

		Self { service: Arc::new(service), auth_token }
	}
}
