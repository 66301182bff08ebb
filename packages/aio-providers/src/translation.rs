use color_eyre::{Result, eyre};
use serde_json::Value;

/// Translates `text` from `source_language` into `target_language`.
pub async fn translate(
	cfg: &aio_config::ProviderConfig,
	text: &str,
	source_language: &str,
	target_language: &str,
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::endpoint(&cfg.api_base, &cfg.path);
	let body = serde_json::json!({
		"text": text,
		"source_language": source_language,
		"target_language": target_language,
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_translation(json)
}

fn parse_translation(json: Value) -> Result<String> {
	json.get("translated_text")
		.or_else(|| json.get("TranslatedText"))
		.and_then(|v| v.as_str())
		.map(str::to_string)
		.ok_or_else(|| eyre::eyre!("Translation response is missing translated_text."))
}
