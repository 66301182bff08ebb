use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = aio_api::Args::parse();

	aio_api::run(args).await
}
