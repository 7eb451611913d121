pub mod routes;
pub mod state;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::eyre;
use tokio::{net::TcpListener, time as tokio_time};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use curio_cli::ConfigArgs;
use curio_service::CurioService;

#[derive(Debug, Parser)]
#[command(
	version = curio_cli::VERSION,
	rename_all = "kebab",
	styles = curio_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = curio_config::load(&args.config.config)?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}
	if !admin_addr.ip().is_loopback() {
		return Err(eyre::eyre!("admin_bind must be a loopback address."));
	}

	let state = AppState::new(config).await?;

	if state.service.cfg.cache.enabled {
		let period = Duration::from_secs(state.service.cfg.cache.sweep_interval_secs);

		tokio::spawn(sweep_cache_forever(state.service.clone(), period));
	}

	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app);
	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app);

	tokio::try_join!(http_server, admin_server)?;

	Ok(())
}

async fn sweep_cache_forever(service: Arc<CurioService>, period: Duration) {
	loop {
		tokio_time::sleep(period).await;

		if let Err(err) = service.sweep_cache().await {
			tracing::error!(error = %err, "Cache sweep failed.");
		}
	}
}

fn init_tracing(config: &curio_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
