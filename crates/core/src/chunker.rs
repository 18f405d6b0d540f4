//! Splits extracted text into stable, bounded, boundary-respecting chunks
//! (§4.2).

use crate::config::ChunkerConfig;
use crate::types::Chunk;

pub struct Chunker {
    config: ChunkerConfig,
}

/// A stable id derived from (path, chunk-index); re-chunking the same input
/// yields identical ids.
pub fn compute_chunk_id(path: &str, chunk_index: usize) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    chunk_index.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl Chunker {
    pub fn new(mut config: ChunkerConfig) -> Self {
        if config.min_size > config.target_size {
            config.min_size = config.target_size;
        }
        if config.target_size > config.max_size {
            config.target_size = config.max_size;
        }
        Self { config }
    }

    /// Split `content` into chunks. Returns an empty vector for empty input.
    /// Chunks are returned as (chunk_index, content, char_offset); the
    /// caller assigns item ids and stable chunk ids via `compute_chunk_id`.
    pub fn chunk_content(&self, content: &str) -> Vec<(usize, String, usize)> {
        let chars: Vec<char> = content.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut pos = 0usize;
        let mut chunk_index = 0usize;

        while pos < total {
            let remaining = total - pos;
            let mut chunk_end = if remaining <= self.config.target_size {
                total
            } else {
                let target_end = (pos + self.config.target_size).min(total);
                self.find_split_point(&chars, pos, target_end)
            };

            if chunk_end - pos > self.config.max_size {
                chunk_end = pos + self.config.max_size;
            }

            if chunk_end < total {
                let leftover = total - chunk_end;
                if leftover < self.config.min_size && remaining <= self.config.max_size {
                    chunk_end = total;
                }
            }

            let text: String = chars[pos..chunk_end].iter().collect();
            chunks.push((chunk_index, text, pos));

            pos = chunk_end;
            chunk_index += 1;
        }

        chunks
    }

    /// Builds full `Chunk` records for the given item, assigning stable ids.
    pub fn chunk_for_item(&self, path: &str, item_id: i64, content: &str) -> Vec<Chunk> {
        self.chunk_content(content)
            .into_iter()
            .map(|(index, text, offset)| Chunk {
                chunk_id: compute_chunk_id(path, index),
                item_id,
                chunk_index: index,
                content: text,
                byte_offset: offset,
            })
            .collect()
    }

    /// Search backward from `target_end` toward `chunk_start + min_size` for
    /// the best boundary, trying paragraph, sentence, then word boundaries
    /// in priority order. Falls back to a hard split at `target_end`.
    fn find_split_point(&self, chars: &[char], chunk_start: usize, target_end: usize) -> usize {
        let search_floor =
            if chunk_start + self.config.min_size > target_end { chunk_start } else { chunk_start + self.config.min_size };

        // 1. Paragraph boundary: \n\n
        let mut i = target_end;
        while i > search_floor {
            if i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n' {
                return i;
            }
            i -= 1;
        }

        // 2. Sentence boundary: ". " or "!\n" or "?\n"
        let mut i = target_end;
        while i > search_floor {
            let prev = chars[i - 1];
            let curr = chars.get(i).copied().unwrap_or('\0');
            if prev == '.' && curr == ' ' {
                return i;
            }
            if (prev == '!' || prev == '?') && curr == '\n' {
                return i;
            }
            i -= 1;
        }

        // 3. Word boundary: space
        let mut i = target_end;
        while i > search_floor {
            if chars[i - 1] == ' ' {
                return i;
            }
            i -= 1;
        }

        // 4. Force split.
        target_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target: usize, min: usize, max: usize) -> Chunker {
        Chunker::new(ChunkerConfig { target_size: target, min_size: min, max_size: max })
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let c = chunker(1000, 500, 2000);
        assert!(c.chunk_content("").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let c = chunker(1000, 500, 2000);
        let chunks = c.chunk_content("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1, "hello world");
    }

    #[test]
    fn splits_on_paragraph_boundary() {
        let c = chunker(10, 2, 30);
        let text = "one two\n\nthree four five six seven";
        let chunks = c.chunk_content(text);
        let reassembled: String = chunks.iter().map(|(_, t, _)| t.as_str()).collect();
        assert_eq!(reassembled, text);
        for (_, t, _) in &chunks {
            assert!(t.chars().count() <= 30);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let c = chunker(50, 20, 100);
        let text = "a".repeat(500);
        let a = c.chunk_content(&text);
        let b = c.chunk_content(&text);
        assert_eq!(a, b);
        for i in 0..a.len() {
            assert_eq!(compute_chunk_id("/x", i), compute_chunk_id("/x", i));
        }
    }

    #[test]
    fn no_chunk_exceeds_max_size() {
        let c = chunker(50, 20, 80);
        let text = "word ".repeat(400);
        let chunks = c.chunk_content(&text);
        for (_, t, _) in &chunks {
            assert!(t.chars().count() <= 80);
        }
        let reassembled: String = chunks.iter().map(|(_, t, _)| t.as_str()).collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn chunk_ids_are_stable_per_path_and_index() {
        assert_eq!(compute_chunk_id("/a/b.txt", 0), compute_chunk_id("/a/b.txt", 0));
        assert_ne!(compute_chunk_id("/a/b.txt", 0), compute_chunk_id("/a/b.txt", 1));
        assert_ne!(compute_chunk_id("/a/b.txt", 0), compute_chunk_id("/a/c.txt", 0));
    }
}
