//! Flat cosine-similarity index persisted as two objects.
//!
//! `index.vec` holds the vectors: the `AIOV` magic, then little-endian `u32` version, dimension
//! and row count, then `count * dim` little-endian `f32` values. `index.json` holds one chunk
//! entry per row, in row order. Rows are stored unit-normalized, so a dot product is the cosine
//! similarity.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"AIOV";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IndexChunk {
	pub source: String,
	pub chunk_index: i32,
	pub text: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IndexMetadata {
	pub embedding_model: String,
	pub dim: u32,
	pub chunks: Vec<IndexChunk>,
}

#[derive(Clone, Debug)]
pub struct ScoredChunk<'a> {
	pub score: f32,
	pub chunk: &'a IndexChunk,
}

#[derive(Clone, Debug)]
pub struct FlatIndex {
	metadata: IndexMetadata,
	vectors: Vec<f32>,
}
impl FlatIndex {
	pub fn build(
		embedding_model: &str,
		dim: u32,
		chunks: Vec<IndexChunk>,
		vectors: Vec<Vec<f32>>,
	) -> Result<Self> {
		if chunks.len() != vectors.len() {
			return Err(index_error(format!(
				"{} chunks but {} vectors.",
				chunks.len(),
				vectors.len()
			)));
		}

		let mut flat = Vec::with_capacity(vectors.len() * dim as usize);

		for vector in vectors {
			if vector.len() != dim as usize {
				return Err(index_error(format!(
					"Vector has dimension {} but the index expects {dim}.",
					vector.len()
				)));
			}

			flat.extend(normalized(&vector));
		}

		Ok(Self {
			metadata: IndexMetadata { embedding_model: embedding_model.to_string(), dim, chunks },
			vectors: flat,
		})
	}

	pub fn decode(vectors: &[u8], metadata: &[u8]) -> Result<Self> {
		if vectors.len() < HEADER_LEN || &vectors[..4] != MAGIC {
			return Err(index_error("Vector file has no AIOV header.".to_string()));
		}

		let version = read_u32(vectors, 4);
		let dim = read_u32(vectors, 8);
		let count = read_u32(vectors, 12) as usize;

		if version != FORMAT_VERSION {
			return Err(index_error(format!("Unsupported vector file version {version}.")));
		}

		let expected_len = count
			.checked_mul(dim as usize)
			.and_then(|values| values.checked_mul(4))
			.and_then(|bytes| bytes.checked_add(HEADER_LEN))
			.ok_or_else(|| index_error(format!("Vector file header is too large: {count} x {dim}.")))?;

		if vectors.len() != expected_len {
			return Err(index_error(format!(
				"Vector file is {} bytes, expected {expected_len}.",
				vectors.len()
			)));
		}

		let metadata: IndexMetadata = serde_json::from_slice(metadata)
			.map_err(|err| index_error(format!("Index metadata is not valid JSON: {err}.")))?;

		if metadata.dim != dim || metadata.chunks.len() != count {
			return Err(index_error("Index metadata does not match the vector file.".to_string()));
		}

		let values = vectors[HEADER_LEN..]
			.chunks_exact(4)
			.map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
			.collect();

		Ok(Self { metadata, vectors: values })
	}

	pub fn encode_vectors(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);

		out.extend_from_slice(MAGIC);
		out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
		out.extend_from_slice(&self.metadata.dim.to_le_bytes());
		out.extend_from_slice(&(self.len() as u32).to_le_bytes());

		for value in &self.vectors {
			out.extend_from_slice(&value.to_le_bytes());
		}

		out
	}

	pub fn encode_metadata(&self) -> Result<Vec<u8>> {
		serde_json::to_vec(&self.metadata)
			.map_err(|err| index_error(format!("Failed to encode index metadata: {err}.")))
	}

	pub fn metadata(&self) -> &IndexMetadata {
		&self.metadata
	}

	pub fn len(&self) -> usize {
		self.metadata.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.metadata.chunks.is_empty()
	}

	/// The `top_k` rows most similar to `query`, best first. Ties keep row order.
	pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk<'_>>> {
		let dim = self.metadata.dim as usize;

		if query.len() != dim {
			return Err(index_error(format!(
				"Query has dimension {} but the index has {dim}.",
				query.len()
			)));
		}

		let query = normalized(query);
		let mut scored: Vec<ScoredChunk<'_>> = self
			.metadata
			.chunks
			.iter()
			.enumerate()
			.map(|(row, chunk)| {
				let vector = &self.vectors[row * dim..(row + 1) * dim];
				let score = vector.iter().zip(&query).map(|(a, b)| a * b).sum();

				ScoredChunk { score, chunk }
			})
			.collect();

		scored.sort_by(|a, b| b.score.total_cmp(&a.score));
		scored.truncate(top_k);

		Ok(scored)
	}
}

fn normalized(vector: &[f32]) -> Vec<f32> {
	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm == 0.0 || !norm.is_finite() {
		return vector.to_vec();
	}

	vector.iter().map(|value| value / norm).collect()
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
	u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn index_error(message: String) -> Error {
	Error::Index { message }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk(text: &str, chunk_index: i32) -> IndexChunk {
		IndexChunk { source: "notes.txt".to_string(), chunk_index, text: text.to_string() }
	}

	fn sample() -> FlatIndex {
		FlatIndex::build(
			"embed-small",
			2,
			vec![chunk("east", 0), chunk("north", 1), chunk("north-east", 2)],
			vec![vec![3.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]],
		)
		.expect("build failed")
	}

	#[test]
	fn search_ranks_by_cosine_similarity() {
		let index = sample();
		let hits = index.search(&[0.0, 5.0], 2).expect("search failed");
		let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();

		assert_eq!(texts, vec!["north", "north-east"]);
		assert!((hits[0].score - 1.0).abs() < 1e-6);
	}

	#[test]
	fn decoding_restores_the_encoded_index() {
		let index = sample();
		let vectors = index.encode_vectors();
		let metadata = index.encode_metadata().expect("encode failed");

		assert_eq!(&vectors[..4], b"AIOV");
		assert_eq!(vectors.len(), 16 + 3 * 2 * 4);

		let decoded = FlatIndex::decode(&vectors, &metadata).expect("decode failed");
		let hits = decoded.search(&[1.0, 0.0], 1).expect("search failed");

		assert_eq!(decoded.len(), 3);
		assert_eq!(hits[0].chunk.text, "east");
	}

	#[test]
	fn rejects_mismatched_artifacts() {
		let index = sample();
		let mut vectors = index.encode_vectors();

		vectors.truncate(vectors.len() - 4);

		let metadata = index.encode_metadata().expect("encode failed");

		assert!(FlatIndex::decode(&vectors, &metadata).is_err());
		assert!(FlatIndex::decode(b"NOPE", &metadata).is_err());
		assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
	}

	#[test]
	fn oversized_headers_are_errors() {
		let mut vectors = b"AIOV".to_vec();

		vectors.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
		vectors.extend_from_slice(&u32::MAX.to_le_bytes());
		vectors.extend_from_slice(&u32::MAX.to_le_bytes());

		let result = FlatIndex::decode(&vectors, b"{}");

		assert!(matches!(result, Err(Error::Index { .. })), "unexpected {result:?}");
	}

	#[test]
	fn build_rejects_wrong_dimensions() {
		let result = FlatIndex::build("m", 3, vec![chunk("a", 0)], vec![vec![1.0, 2.0]]);

		assert!(result.is_err());
	}
}
