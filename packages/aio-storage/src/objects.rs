//! Object storage: a filesystem-backed store and a decorator that emits storage events.

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
};

use tokio::fs;
use url::form_urlencoded;
use uuid::Uuid;

use crate::{BoxFuture, Error, Result, models::StorageEvent, queue::MessageQueue};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectMeta {
	pub key: String,
	pub size: u64,
}

pub trait ObjectStore: Send + Sync {
	fn bucket(&self) -> &str;

	fn put<'a>(&'a self, key: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>>;

	/// Reads the object, failing with [`Error::NotFound`] when it does not exist.
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

	fn head<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<ObjectMeta>>>;

	/// Removes the object. Deleting a missing object succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Keys starting with `prefix`, sorted.
	fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Stores each object as a file at `{root}/{key}`.
pub struct LocalObjectStore {
	root: PathBuf,
	bucket: String,
}
impl LocalObjectStore {
	pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
		Self { root: root.into(), bucket: bucket.into() }
	}

	pub fn from_config(cfg: &aio_config::Objects) -> Self {
		Self::new(cfg.root.clone(), cfg.bucket.clone())
	}

	fn path_for(&self, key: &str) -> Result<PathBuf> {
		validate_key(key)?;

		Ok(self.root.join(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
		let start_dir = match prefix.rfind('/') {
			Some(idx) => &prefix[..idx],
			None => "",
		};
		let mut pending = vec![self.root.join(start_dir)];
		let mut keys = Vec::new();

		while let Some(dir) = pending.pop() {
			let mut entries = match fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(err) if err.kind() == ErrorKind::NotFound => continue,
				Err(err) if err.kind() == ErrorKind::NotADirectory => continue,
				Err(err) => return Err(err.into()),
			};

			while let Some(entry) = entries.next_entry().await? {
				let path = entry.path();

				if entry.file_type().await?.is_dir() {
					pending.push(path);

					continue;
				}

				let Some(key) = key_for(&self.root, &path) else {
					continue;
				};

				if key.starts_with(prefix) {
					keys.push(key);
				}
			}
		}

		keys.sort();

		Ok(keys)
	}
}
impl ObjectStore for LocalObjectStore {
	fn bucket(&self) -> &str {
		&self.bucket
	}

	fn put<'a>(&'a self, key: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let path = self.path_for(key)?;

			if let Some(parent) = path.parent() {
				fs::create_dir_all(parent).await?;
			}

			fs::write(&path, body).await?;

			Ok(())
		})
	}

	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let path = self.path_for(key)?;

			match fs::read(&path).await {
				Ok(bytes) => Ok(bytes),
				Err(err) if is_missing(&err) => Err(Error::NotFound(format!("object {key}"))),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn head<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<ObjectMeta>>> {
		Box::pin(async move {
			let path = self.path_for(key)?;

			match fs::metadata(&path).await {
				Ok(meta) if meta.is_file() =>
					Ok(Some(ObjectMeta { key: key.to_string(), size: meta.len() })),
				Ok(_) => Ok(None),
				Err(err) if is_missing(&err) => Ok(None),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let path = self.path_for(key)?;

			match fs::remove_file(&path).await {
				Ok(()) => Ok(()),
				Err(err) if is_missing(&err) => Ok(()),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { self.list_keys(prefix).await })
	}
}

/// Wraps a store and enqueues a [`StorageEvent`] for every write under a notify prefix.
pub struct NotifyingObjectStore<S> {
	inner: S,
	queue: Arc<dyn MessageQueue>,
	queue_name: String,
	prefixes: Vec<String>,
}
impl<S> NotifyingObjectStore<S>
where
	S: ObjectStore,
{
	pub fn new(
		inner: S,
		queue: Arc<dyn MessageQueue>,
		queue_name: impl Into<String>,
		prefixes: Vec<String>,
	) -> Self {
		Self { inner, queue, queue_name: queue_name.into(), prefixes }
	}

	fn notifies(&self, key: &str) -> bool {
		self.prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
	}
}
impl<S> ObjectStore for NotifyingObjectStore<S>
where
	S: ObjectStore,
{
	fn bucket(&self) -> &str {
		self.inner.bucket()
	}

	fn put<'a>(&'a self, key: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.inner.put(key, body).await?;

			if !self.notifies(key) {
				return Ok(());
			}

			// Every write is its own event, so overwrites notify again.
			let sequencer = Uuid::new_v4().to_string();
			let dedupe_key = format!("{key}#{sequencer}");
			let event = StorageEvent {
				bucket: self.inner.bucket().to_string(),
				key: encode_event_key(key),
				sequencer: Some(sequencer),
			};
			let body = serde_json::to_value(&event)?;

			self.queue.send(&self.queue_name, &dedupe_key, &body).await?;

			tracing::debug!(key, queue = %self.queue_name, "Emitted storage event.");

			Ok(())
		})
	}

	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		self.inner.get(key)
	}

	fn head<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<ObjectMeta>>> {
		self.inner.head(key)
	}

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
		self.inner.delete(key)
	}

	fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		self.inner.list(prefix)
	}
}

/// Form-url-encodes each key segment, keeping the `/` separators.
pub fn encode_event_key(key: &str) -> String {
	key.split('/')
		.map(|segment| form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>())
		.collect::<Vec<_>>()
		.join("/")
}

/// Reverses [`encode_event_key`]: `+` becomes a space and percent escapes are decoded.
pub fn decode_event_key(raw: &str) -> String {
	raw.split('/')
		.map(|segment| {
			form_urlencoded::parse(format!("k={segment}").as_bytes())
				.next()
				.map(|(_, value)| value.into_owned())
				.unwrap_or_default()
		})
		.collect::<Vec<_>>()
		.join("/")
}

/// Keys are relative `/`-separated paths without empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<()> {
	if key.is_empty() || key.contains('\\') || key.contains('\0') {
		return Err(Error::InvalidArgument(format!("invalid object key {key:?}")));
	}
	if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
		return Err(Error::InvalidArgument(format!("invalid object key {key:?}")));
	}

	Ok(())
}

fn key_for(root: &Path, path: &Path) -> Option<String> {
	let relative = path.strip_prefix(root).ok()?;
	let segments = relative
		.components()
		.map(|component| component.as_os_str().to_str())
		.collect::<Option<Vec<_>>>()?;

	Some(segments.join("/"))
}

fn is_missing(err: &std::io::Error) -> bool {
	matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
