use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use aio_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("aio_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> aio_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = aio_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(payload: String, needle: &str) {
	let err = load_payload(payload).expect_err("Expected a validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");
	assert!(err.to_string().contains(needle), "Unexpected error message: {err}");
}

#[test]
fn sample_config_loads_and_normalizes() {
	let cfg = load_payload(SAMPLE_CONFIG_TOML.to_string()).expect("Sample config must load.");

	assert_eq!(cfg.service.public_base_url, "http://127.0.0.1:8080");
	assert_eq!(cfg.service.user_header, "x-aio-user");
	assert_eq!(cfg.storage.objects.notify_prefixes, vec!["uploads/".to_string()]);
	assert_eq!(cfg.presign.user_ttl_secs, 500);
	assert_eq!(cfg.presign.bulk_ttl_secs, 300);
	assert_eq!(cfg.answer.video_top_k, 7);
}

#[test]
fn tuning_sections_fall_back_to_defaults() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");

	table.remove("transcription");
	table.remove("indexing");
	table.remove("answer");

	let cfg = load_payload(toml::to_string(&root).expect("Failed to render config."))
		.expect("Config without tuning sections must load.");

	assert_eq!(cfg.transcription.poll_interval_ms, 5_000);
	assert_eq!(cfg.indexing.max_chars, 1_000);
	assert_eq!(cfg.indexing.overlap_chars, 0);
	assert_eq!(cfg.answer.document_top_k, 4);
	assert_eq!(cfg.answer.default_language, "en");
}

#[test]
fn default_language_is_trimmed_but_keeps_its_region_casing() {
	let cfg = load_payload(sample_with(
		"answer",
		"default_language",
		Value::String(" pt-BR ".to_string()),
	))
	.expect("Config with a regional language must load.");

	assert_eq!(cfg.answer.default_language, "pt-BR");
}

#[test]
fn presign_ttl_must_be_bounded() {
	expect_validation(
		sample_with("presign", "user_ttl_secs", Value::Integer(7_200)),
		"presign.user_ttl_secs must be in the range 1-3600.",
	);
	expect_validation(
		sample_with("presign", "bulk_ttl_secs", Value::Integer(0)),
		"presign.bulk_ttl_secs must be in the range 1-3600.",
	);
}

#[test]
fn signing_secret_must_be_long_enough() {
	expect_validation(
		sample_with("presign", "signing_secret", Value::String("short".to_string())),
		"presign.signing_secret must be at least 16 bytes.",
	);
}

#[test]
fn queue_names_must_be_distinct() {
	expect_validation(
		sample_with("queues", "media_processing", Value::String("document_processing".to_string())),
		"Queue names must be distinct.",
	);
}

#[test]
fn overlap_must_be_smaller_than_chunk() {
	expect_validation(
		sample_with("indexing", "overlap_chars", Value::Integer(1_000)),
		"indexing.overlap_chars must be less than indexing.max_chars.",
	);
}

#[test]
fn provider_keys_must_be_present() {
	expect_validation(
		sample_with("providers.translation", "api_key", Value::String("  ".to_string())),
		"Provider translation api_key must be non-empty.",
	);
}

#[test]
fn public_base_url_must_be_http() {
	expect_validation(
		sample_with("service", "public_base_url", Value::String("ftp://example".to_string())),
		"service.public_base_url must start with http:// or https://.",
	);
}

#[test]
fn missing_file_reports_read_error() {
	let err = aio_config::load(&PathBuf::from("/nonexistent/aio.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
