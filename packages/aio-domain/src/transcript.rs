use serde::Deserialize;

/// The subset of a transcription result document this pipeline reads.
#[derive(Debug, Deserialize)]
pub struct TranscriptDocument {
	pub results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptResults {
	#[serde(default)]
	pub transcripts: Vec<TranscriptSegment>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptSegment {
	pub transcript: Option<String>,
}

pub fn parse(raw: &[u8]) -> serde_json::Result<TranscriptDocument> {
	serde_json::from_slice(raw)
}

/// Joins segment texts in order with single spaces; segments without text are skipped.
pub fn concat_segments(doc: &TranscriptDocument) -> String {
	concat_texts(doc.results.transcripts.iter().filter_map(|segment| segment.transcript.as_deref()))
}

pub fn concat_texts<'a, I>(texts: I) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	texts.into_iter().collect::<Vec<_>>().join(" ").trim().to_string()
}
