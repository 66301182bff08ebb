//! Named message queues backed by one Postgres table.
//!
//! A claim is a lease: `available_at` is pushed past the lease, and a message whose lease
//! expires without being acknowledged becomes claimable again.

use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, Result, db::Db, models::QueueMessage};

pub trait MessageQueue: Send + Sync {
	/// Enqueues `body` unless `(queue, dedupe_key)` was sent before. Returns whether it was new.
	fn send<'a>(
		&'a self,
		queue: &'a str,
		dedupe_key: &'a str,
		body: &'a Value,
	) -> BoxFuture<'a, Result<bool>>;

	fn claim<'a>(
		&'a self,
		queue: &'a str,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<QueueMessage>>>;

	fn ack<'a>(&'a self, message_id: Uuid, now: OffsetDateTime) -> BoxFuture<'a, Result<()>>;

	/// Records a failed attempt and makes the message claimable again at `available_at`.
	fn retry<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		available_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Records a final failure; the message is never claimed again.
	fn fail<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;
}

impl MessageQueue for Db {
	fn send<'a>(
		&'a self,
		queue: &'a str,
		dedupe_key: &'a str,
		body: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { send_message(&self.pool, queue, dedupe_key, body).await })
	}

	fn claim<'a>(
		&'a self,
		queue: &'a str,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<QueueMessage>>> {
		Box::pin(async move { claim_next_message(self, queue, now, lease_seconds).await })
	}

	fn ack<'a>(&'a self, message_id: Uuid, now: OffsetDateTime) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { mark_message_done(&self.pool, message_id, now).await })
	}

	fn retry<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		available_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			mark_message_retry(&self.pool, message_id, attempts, error_text, available_at, now)
				.await
		})
	}

	fn fail<'a>(
		&'a self,
		message_id: Uuid,
		attempts: i32,
		error_text: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			mark_message_failed(&self.pool, message_id, attempts, error_text, now).await
		})
	}
}

pub async fn send_message<'e, E>(
	executor: E,
	queue: &str,
	dedupe_key: &str,
	body: &Value,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO queue_messages (message_id, queue, dedupe_key, body, status)
VALUES ($1, $2, $3, $4, 'PENDING')
ON CONFLICT (queue, dedupe_key) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(queue)
	.bind(dedupe_key)
	.bind(body)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn claim_next_message(
	db: &Db,
	queue: &str,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<QueueMessage>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, QueueMessage>(
		"\
SELECT
\tmessage_id,
\tqueue,
\tdedupe_key,
\tbody,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
FROM queue_messages
WHERE queue = $1 AND status IN ('PENDING','CLAIMED') AND available_at <= $2
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(queue)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let message = if let Some(mut message) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE queue_messages SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE message_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(message.message_id)
		.execute(&mut *tx)
		.await?;

		message.status = "CLAIMED".to_string();
		message.available_at = lease_until;
		message.updated_at = now;

		Some(message)
	} else {
		None
	};

	tx.commit().await?;

	Ok(message)
}

pub async fn mark_message_done<'e, E>(
	executor: E,
	message_id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("UPDATE queue_messages SET status = 'DONE', updated_at = $1 WHERE message_id = $2")
		.bind(now)
		.bind(message_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn mark_message_retry<'e, E>(
	executor: E,
	message_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE queue_messages
SET status = 'PENDING',
\tattempts = $1,
\tlast_error = $2,
\tavailable_at = $3,
\tupdated_at = $4
WHERE message_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(message_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn mark_message_failed<'e, E>(
	executor: E,
	message_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE queue_messages
SET status = 'FAILED',
\tattempts = $1,
\tlast_error = $2,
\tupdated_at = $3
WHERE message_id = $4",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(message_id)
	.execute(executor)
	.await?;

	Ok(())
}
