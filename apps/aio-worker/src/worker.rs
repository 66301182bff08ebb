//! Queue consumers. Each queue gets its own poll loop: claim a message under a lease, run the
//! handler, then ack, schedule a retry with backoff, or fail it for good.

use std::{sync::Arc, time::Duration as StdDuration};

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinSet;

use crate::{Error, Result};
use aio_config::Queues;
use aio_service::AioService;
use aio_storage::models::{JobMessage, QueueMessage, StorageEvent};

const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_ERROR_CHARS: usize = 1_024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueKind {
	StorageEvents,
	Documents,
	Media,
}
impl QueueKind {
	pub fn all() -> [Self; 3] {
		[Self::StorageEvents, Self::Documents, Self::Media]
	}

	pub fn queue_name(self, cfg: &Queues) -> &str {
		match self {
			Self::StorageEvents => &cfg.storage_events,
			Self::Documents => &cfg.document_processing,
			Self::Media => &cfg.media_processing,
		}
	}

	/// Transcription jobs poll an external service, so media messages get the longer lease.
	fn lease_seconds(self, cfg: &Queues) -> i64 {
		match self {
			Self::Media => cfg.media_lease_seconds,
			Self::StorageEvents | Self::Documents => cfg.lease_seconds,
		}
	}
}

pub async fn run_worker(service: Arc<AioService>) -> color_eyre::Result<()> {
	let mut tasks = JoinSet::new();

	for kind in QueueKind::all() {
		let service = service.clone();

		tasks.spawn(async move { poll_queue(&service, kind).await });
	}

	tracing::info!("Worker started.");

	while let Some(joined) = tasks.join_next().await {
		joined?;
	}

	Ok(())
}

async fn poll_queue(service: &AioService, kind: QueueKind) {
	let interval = StdDuration::from_millis(service.cfg.queues.poll_interval_ms);

	loop {
		match process_once(service, kind).await {
			// Keep draining while there is work.
			Ok(true) => continue,
			Ok(false) => {},
			Err(err) => {
				tracing::error!(
					error = %err,
					queue = kind.queue_name(&service.cfg.queues),
					"Queue processing failed."
				);
			},
		}

		tokio::time::sleep(interval).await;
	}
}

/// Handles at most one message from `kind`'s queue. Returns whether a message was claimed.
pub async fn process_once(service: &AioService, kind: QueueKind) -> Result<bool> {
	let queues = &service.cfg.queues;
	let queue = kind.queue_name(queues);
	let Some(message) = service
		.stores
		.queue
		.claim(queue, OffsetDateTime::now_utc(), kind.lease_seconds(queues))
		.await?
	else {
		return Ok(false);
	};

	match dispatch(service, kind, &message.body).await {
		Ok(()) => {
			service.stores.queue.ack(message.message_id, OffsetDateTime::now_utc()).await?;

			tracing::debug!(queue, message_id = %message.message_id, "Queue message done.");
		},
		Err(err) => record_failure(service, queue, &message, &err).await?,
	}

	Ok(true)
}

async fn dispatch(service: &AioService, kind: QueueKind, body: &Value) -> Result<()> {
	match kind {
		QueueKind::StorageEvents => {
			let event: StorageEvent = serde_json::from_value(body.clone())?;
			let outcome = service.handle_storage_event(&event).await?;

			tracing::debug!(?outcome, "Handled storage event.");
		},
		QueueKind::Documents => {
			let job: JobMessage = serde_json::from_value(body.clone())?;
			let outcome = service.handle_document_job(&job).await?;

			tracing::debug!(?outcome, "Handled document job.");
		},
		QueueKind::Media => {
			let job: JobMessage = serde_json::from_value(body.clone())?;
			let outcome = service.handle_media_job(&job).await?;

			tracing::debug!(?outcome, "Handled media job.");
		},
	}

	Ok(())
}

async fn record_failure(
	service: &AioService,
	queue: &str,
	message: &QueueMessage,
	err: &Error,
) -> Result<()> {
	let attempts = message.attempts.saturating_add(1);
	let error_text = truncate_error(&err.to_string());
	let now = OffsetDateTime::now_utc();

	if !err.is_retryable() || attempts >= service.cfg.queues.max_attempts {
		service.stores.queue.fail(message.message_id, attempts, &error_text, now).await?;

		tracing::error!(
			error = %err,
			queue,
			message_id = %message.message_id,
			attempts,
			"Queue message failed permanently."
		);

		return Ok(());
	}

	let available_at = now + backoff_for_attempt(attempts);

	service
		.stores
		.queue
		.retry(message.message_id, attempts, &error_text, available_at, now)
		.await?;

	tracing::warn!(
		error = %err,
		queue,
		message_id = %message.message_id,
		attempts,
		"Queue message failed; scheduled a retry."
	);

	Ok(())
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}

fn truncate_error(text: &str) -> String {
	if text.chars().count() <= MAX_ERROR_CHARS {
		return text.to_string();
	}

	let mut out: String = text.chars().take(MAX_ERROR_CHARS).collect();

	out.push_str("...");

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_up_to_the_cap() {
		let millis: Vec<i128> =
			[0, 1, 2, 3, 7, 50].iter().map(|&n| backoff_for_attempt(n).whole_milliseconds()).collect();

		assert_eq!(millis, vec![500, 500, 1_000, 2_000, 30_000, 30_000]);
	}

	#[test]
	fn long_errors_are_truncated() {
		let long = "x".repeat(MAX_ERROR_CHARS + 10);
		let truncated = truncate_error(&long);

		assert_eq!(truncated.chars().count(), MAX_ERROR_CHARS + 3);
		assert_eq!(truncate_error("short"), "short");
	}
}
