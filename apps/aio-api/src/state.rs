use std::sync::Arc;

use aio_service::{AioService, Stores};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<AioService>,
}
impl AppState {
	pub async fn new(config: aio_config::Config) -> color_eyre::Result<Self> {
		let stores = Stores::connect(&config).await?;

		Ok(Self::from_service(AioService::new(config, stores)))
	}

	pub fn from_service(service: AioService) -> Self {
		Self { service: Arc::new(service) }
	}
}
