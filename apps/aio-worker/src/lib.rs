pub mod worker;

mod error;

pub use error::{Error, Result};

use std::sync::Arc;

use clap::Parser;

use aio_service::{AioService, Stores};

#[derive(Debug, Parser)]
#[command(
	version = aio_cli::VERSION,
	rename_all = "kebab",
	styles = aio_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: aio_cli::ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = aio_config::load(&args.config.config)?;

	aio_cli::init_tracing(&config.service.log_level);

	let stores = Stores::connect(&config).await?;
	let service = Arc::new(AioService::new(config, stores));

	worker::run_worker(service).await
}
