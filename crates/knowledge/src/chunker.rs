//! Text chunking with configurable size and overlap.

use crate::types::{ChunkCandidate, ChunkSpan};

/// Chunk text into overlapping segments.
///
/// Sizes are in bytes, snapped to UTF-8 boundaries. Once a chunk reaches the
/// end of the text no further chunks are produced, so the tail is never
/// emitted twice.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkCandidate> {
    if text.trim().is_empty() || chunk_size == 0 {
        return vec![];
    }

    let step = if chunk_size > overlap {
        chunk_size - overlap
    } else {
        chunk_size
    };

    let mut chunks = Vec::new();
    let mut position = 0u32;
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            break;
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(ChunkCandidate {
                position,
                text: piece.to_string(),
                span: ChunkSpan { start, end },
            });
            position += 1;
        }

        if end == text.len() {
            break;
        }

        let mut next_start = start + step;
        while next_start < text.len() && !text.is_char_boundary(next_start) {
            next_start += 1;
        }
        start = next_start;
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_positions_are_sequential() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, 200, 50);

        assert_eq!(chunks.len(), 7);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i as u32);
            assert_eq!(chunk.span.start, i * 150);
        }
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, 100, 0);

        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("Recycling pickup is on Tuesdays.", 2000, 400);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Recycling pickup is on Tuesdays.");
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_chunk_overlap_repeats_text() {
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(10);
        let chunks = chunk_text(&text, 50, 10);

        let first_tail = &chunks[0].text[40..];
        assert!(chunks[1].text.starts_with(first_tail));
    }

    #[test]
    fn test_multibyte_text_does_not_split_characters() {
        let text = "déclaration d'impôts à la mairie ".repeat(20);
        let chunks = chunk_text(&text, 37, 5);

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }
}
