pub const MEDIA_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".m4v"];
pub const DOCUMENT_EXTENSIONS: [&str; 4] = [".pdf", ".csv", ".txt", ".docx"];
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
	Media,
	Document,
	Other,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentFormat {
	Pdf,
	Csv,
	Txt,
	Docx,
}
impl DocumentFormat {
	pub fn from_extension(extension: &str) -> Option<Self> {
		match extension.to_ascii_lowercase().as_str() {
			".pdf" => Some(Self::Pdf),
			".csv" => Some(Self::Csv),
			".txt" => Some(Self::Txt),
			".docx" => Some(Self::Docx),
			_ => None,
		}
	}

	pub fn folder(self) -> &'static str {
		match self {
			Self::Pdf => "pdf",
			Self::Csv => "csv",
			Self::Txt => "txt",
			Self::Docx => "docx",
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			Self::Pdf => ".pdf",
			Self::Csv => ".csv",
			Self::Txt => ".txt",
			Self::Docx => ".docx",
		}
	}

	pub fn all() -> [Self; 4] {
		[Self::Pdf, Self::Csv, Self::Txt, Self::Docx]
	}
}

/// Splits `name` into base and extension, the extension keeping its leading dot.
///
/// Leading dots belong to the base, so `.env` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
	let leading_dots = name.len() - name.trim_start_matches('.').len();

	match name[leading_dots..].rfind('.') {
		Some(idx) => name.split_at(leading_dots + idx),
		None => (name, ""),
	}
}

pub fn extension_of(name: &str) -> String {
	split_extension(name).1.to_ascii_lowercase()
}

pub fn classify(name: &str) -> FileKind {
	let extension = extension_of(name);

	if MEDIA_EXTENSIONS.contains(&extension.as_str()) {
		FileKind::Media
	} else if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
		FileKind::Document
	} else {
		FileKind::Other
	}
}

pub fn is_media(name: &str) -> bool {
	classify(name) == FileKind::Media
}

pub fn content_type(extension: &str) -> &'static str {
	match extension.to_ascii_lowercase().as_str() {
		".pdf" => "application/pdf",
		".csv" => "text/csv",
		".txt" => "text/plain",
		".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
		".mp4" => "video/mp4",
		".m4v" => "video/x-m4v",
		".mov" => "video/quicktime",
		_ => OCTET_STREAM,
	}
}

/// Folder used by the bulk upload layout; unknown extensions land in `other`.
pub fn bulk_folder(extension: &str) -> &'static str {
	DocumentFormat::from_extension(extension).map(DocumentFormat::folder).unwrap_or("other")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_like_a_path_extension() {
		assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
		assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
		assert_eq!(split_extension("README"), ("README", ""));
		assert_eq!(split_extension(".env"), (".env", ""));
		assert_eq!(split_extension("..hidden.txt"), ("..hidden", ".txt"));
	}

	#[test]
	fn classifies_case_insensitively() {
		assert_eq!(classify("clip.MP4"), FileKind::Media);
		assert_eq!(classify("notes.Docx"), FileKind::Document);
		assert_eq!(classify("index.json"), FileKind::Other);
		assert_eq!(classify("noext"), FileKind::Other);
	}
}
