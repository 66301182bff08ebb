use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = aio_worker::Args::parse();

	aio_worker::run(args).await
}
