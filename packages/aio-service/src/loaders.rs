//! Text extraction per document format.

use crate::{Error, Result};
use aio_domain::files::DocumentFormat;

/// Text extracted from one source, before chunking.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedText {
	pub source: String,
	pub text: String,
}

pub fn load(format: DocumentFormat, source: &str, bytes: &[u8]) -> Result<Vec<LoadedText>> {
	let texts = match format {
		DocumentFormat::Pdf => vec![single(source, load_pdf(source, bytes)?)],
		DocumentFormat::Csv => load_csv(source, bytes)?,
		DocumentFormat::Txt => vec![single(source, String::from_utf8_lossy(bytes).into_owned())],
		DocumentFormat::Docx => vec![single(source, load_docx(source, bytes)?)],
	};

	Ok(texts.into_iter().filter(|loaded| !loaded.text.trim().is_empty()).collect())
}

fn single(source: &str, text: String) -> LoadedText {
	LoadedText { source: source.to_string(), text }
}

fn load_pdf(source: &str, bytes: &[u8]) -> Result<String> {
	pdf_extract::extract_text_from_mem(bytes).map_err(|err| parse_error(source, err))
}

/// One text per row, each field rendered as `header: value` on its own line.
fn load_csv(source: &str, bytes: &[u8]) -> Result<Vec<LoadedText>> {
	let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
	let headers = reader.headers().map_err(|err| parse_error(source, err))?.clone();
	let mut rows = Vec::new();

	for (row, record) in reader.records().enumerate() {
		let record = record.map_err(|err| parse_error(source, err))?;
		let text = record
			.iter()
			.enumerate()
			.map(|(idx, value)| {
				let header = headers.get(idx).unwrap_or_default();

				format!("{header}: {value}")
			})
			.collect::<Vec<_>>()
			.join("\n");

		rows.push(LoadedText { source: format!("{source}#row={row}"), text });
	}

	Ok(rows)
}

fn load_docx(source: &str, bytes: &[u8]) -> Result<String> {
	let doc = docx_rs::read_docx(bytes).map_err(|err| parse_error(source, err))?;
	let mut text = String::new();

	for child in doc.document.children {
		let docx_rs::DocumentChild::Paragraph(paragraph) = child else {
			continue;
		};

		for child in paragraph.children {
			if let docx_rs::ParagraphChild::Run(run) = child {
				for child in run.children {
					if let docx_rs::RunChild::Text(t) = child {
						text.push_str(&t.text);
					}
				}
			}
		}

		text.push('\n');
	}

	Ok(text)
}

fn parse_error(source: &str, err: impl std::fmt::Display) -> Error {
	Error::InvalidRequest { message: format!("Failed to read {source}: {err}.") }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn csv_rows_become_header_value_lines() {
		let csv = b"name,city\nAda,London\nGrace,Arlington\n";
		let rows = load(DocumentFormat::Csv, "people.csv", csv).expect("load failed");

		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].text, "name: Ada\ncity: London");
		assert_eq!(rows[1].source, "people.csv#row=1");
	}

	#[test]
	fn text_is_decoded_lossily() {
		let loaded = load(DocumentFormat::Txt, "job.txt", b"caf\xe9 menu").expect("load failed");

		assert_eq!(loaded.len(), 1);
		assert!(loaded[0].text.starts_with("caf"));
		assert!(loaded[0].text.ends_with(" menu"));
	}

	#[test]
	fn blank_sources_are_dropped() {
		assert!(load(DocumentFormat::Txt, "empty.txt", b"  \n").expect("load failed").is_empty());
	}

	#[test]
	fn malformed_binary_documents_are_errors() {
		assert!(load(DocumentFormat::Docx, "broken.docx", b"not a zip").is_err());
		assert!(load(DocumentFormat::Pdf, "broken.pdf", b"not a pdf").is_err());
	}
}
