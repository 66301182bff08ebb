use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_chars: u32,
	pub overlap_chars: u32,
}

#[derive(Clone, Debug)]
pub struct Chunk {
	pub chunk_index: i32,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// Splits `text` on sentence boundaries into chunks of at most `max_chars` characters.
///
/// A single sentence longer than the budget is split on word boundaries, and a single word
/// longer than the budget is split on grapheme boundaries. Consecutive chunks share up to
/// `overlap_chars` trailing characters.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
	let max_chars = cfg.max_chars.max(1) as usize;
	let mut pieces = Vec::new();

	for (idx, sentence) in text.split_sentence_bound_indices() {
		push_bounded(&mut pieces, idx, sentence, max_chars);
	}

	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_chars = 0_usize;
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;
	let mut chunk_index = 0_i32;

	for (idx, piece) in pieces {
		let piece_chars = piece.chars().count();

		if current_chars + piece_chars > max_chars && !current.trim().is_empty() {
			chunks.push(Chunk {
				chunk_index,
				start_offset: current_start,
				end_offset: last_end,
				text: current.trim().to_string(),
			});

			chunk_index += 1;

			let overlap = overlap_tail(&current, cfg.overlap_chars as usize, max_chars - piece_chars.min(max_chars));

			current_start = last_end.saturating_sub(overlap.len());
			current_chars = overlap.chars().count();
			current = overlap;
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(piece);

		current_chars += piece_chars;
		last_end = idx + piece.len();
	}

	if !current.trim().is_empty() {
		chunks.push(Chunk {
			chunk_index,
			start_offset: current_start,
			end_offset: last_end,
			text: current.trim().to_string(),
		});
	}

	chunks
}

fn push_bounded<'a>(out: &mut Vec<(usize, &'a str)>, idx: usize, piece: &'a str, max_chars: usize) {
	if piece.chars().count() <= max_chars {
		out.push((idx, piece));

		return;
	}

	let words: Vec<(usize, &str)> = piece.split_word_bound_indices().collect();

	if words.len() > 1 {
		for (offset, word) in words {
			push_bounded(out, idx + offset, word, max_chars);
		}

		return;
	}

	let mut start = 0_usize;
	let mut count = 0_usize;

	for (offset, grapheme) in piece.grapheme_indices(true) {
		if count == max_chars {
			out.push((idx + start, &piece[start..offset]));

			start = offset;
			count = 0;
		}

		count += grapheme.chars().count().max(1);
	}

	if start < piece.len() {
		out.push((idx + start, &piece[start..]));
	}
}

/// Last `overlap_chars` characters of `text`, capped at `room`, starting on a char boundary.
fn overlap_tail(text: &str, overlap_chars: usize, room: usize) -> String {
	let take = overlap_chars.min(room);

	if take == 0 {
		return String::new();
	}

	let total = text.chars().count();
	let skip = total.saturating_sub(take);

	text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_into_chunks_with_overlap() {
		let cfg = ChunkingConfig { max_chars: 12, overlap_chars: 4 };
		let chunks = split_text("One. Two. Three. Four.", &cfg);

		assert!(chunks.len() > 1);
		assert!(chunks[0].text.contains("One"));
		assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 12));
	}

	#[test]
	fn long_words_are_split_on_graphemes() {
		let cfg = ChunkingConfig { max_chars: 5, overlap_chars: 0 };
		let chunks = split_text("abcdefghijkl", &cfg);
		let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();

		assert_eq!(texts, vec!["abcde", "fghij", "kl"]);
	}

	#[test]
	fn blank_text_has_no_chunks() {
		let cfg = ChunkingConfig { max_chars: 100, overlap_chars: 0 };

		assert!(split_text("   \n ", &cfg).is_empty());
	}

	#[test]
	fn short_text_is_one_chunk() {
		let cfg = ChunkingConfig { max_chars: 1_000, overlap_chars: 0 };
		let chunks = split_text("A short note. Another sentence.", &cfg);

		assert_eq!(chunks.len(), 1);
		assert_eq!(chunks[0].text, "A short note. Another sentence.");
		assert_eq!(chunks[0].start_offset, 0);
	}
}
