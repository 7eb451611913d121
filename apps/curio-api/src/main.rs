use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = curio_api::Args::parse();

	curio_api::run(args).await
}
