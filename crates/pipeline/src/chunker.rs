//! Text chunker (spec §4.9): boundary detection over a rolling buffer of
//! streamed model text, emitting TTS-sized segments.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    Sentence,
    Paragraph,
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub mode: ChunkMode,
    pub min_chunk_len: usize,
    pub max_chunk_len: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            mode: ChunkMode::Sentence,
            min_chunk_len: 10,
            max_chunk_len: 500,
        }
    }
}

/// The closed abbreviation exception list (spec §4.9, §9: "the abbreviation
/// exception list is closed and small; extending it is a data-only
/// change"). Entries are lowercase with the trailing period stripped, since
/// that period is the one the scanner is deciding whether to treat as a
/// boundary.
fn default_abbreviations() -> HashSet<&'static str> {
    ["mr", "mrs", "dr", "e.g", "i.e", "etc", "vs", "jr", "sr", "inc", "ltd", "co"]
        .into_iter()
        .collect()
}

pub struct TextChunker {
    buffer: String,
    config: ChunkerConfig,
    abbreviations: HashSet<&'static str>,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            buffer: String::new(),
            config,
            abbreviations: default_abbreviations(),
        }
    }

    /// Appends a streamed fragment and returns any chunks now ready to
    /// submit to TTS, in order.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        self.drain()
    }

    /// Call once the main layer's stream ends. Returns the residual buffer
    /// as a final chunk regardless of length (the one exception to
    /// `min_chunk_len`), or `None` if nothing is left.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    fn drain(&mut self) -> Vec<String> {
        let mut chunks = Vec::new();
        loop {
            if self.buffer.is_empty() {
                break;
            }

            if self.buffer.len() > self.config.max_chunk_len {
                let cut = self.forced_cut_point();
                chunks.push(self.take_chunk(cut));
                continue;
            }

            match self.next_ready_boundary() {
                Some(cut) => chunks.push(self.take_chunk(cut)),
                None => break,
            }
        }
        chunks
    }

    fn take_chunk(&mut self, cut: usize) -> String {
        let chunk = self.buffer[..cut].to_string();
        self.buffer.drain(..cut);
        let trimmed_len = self.buffer.trim_start().len();
        let drop_len = self.buffer.len() - trimmed_len;
        self.buffer.drain(..drop_len);
        chunk
    }

    /// Earliest boundary whose resulting chunk is at least `min_chunk_len`
    /// long. Boundaries shorter than that are skipped over (not cut at) so
    /// they coalesce into the next one, per spec.
    fn next_ready_boundary(&self) -> Option<usize> {
        self.boundaries(self.buffer.len())
            .into_iter()
            .find(|&b| b >= self.config.min_chunk_len)
    }

    /// Used once the buffer has exceeded `max_chunk_len`: nearest sentence
    /// break at or under the cap, else a comma, else a space, else a hard
    /// split exactly at the cap.
    fn forced_cut_point(&self) -> usize {
        let max = self.config.max_chunk_len;

        if let Some(&b) = self.boundaries(max).iter().filter(|&&b| b <= max).max() {
            return b;
        }
        if let Some(idx) = self.buffer[..max].rfind(',') {
            return idx + 1;
        }
        if let Some(idx) = self.buffer[..max].rfind(char::is_whitespace) {
            return idx;
        }
        max
    }

    /// All mode-appropriate boundary cut points within `buffer[..limit]`,
    /// ascending.
    fn boundaries(&self, limit: usize) -> Vec<usize> {
        match self.config.mode {
            ChunkMode::Sentence => self.sentence_boundaries(limit),
            ChunkMode::Paragraph => self.paragraph_boundaries(limit),
        }
    }

    fn sentence_boundaries(&self, limit: usize) -> Vec<usize> {
        let bytes = self.buffer.as_bytes();
        let limit = limit.min(bytes.len());
        let mut boundaries = Vec::new();

        for i in 0..limit {
            let c = bytes[i] as char;
            if c != '.' && c != '!' && c != '?' {
                continue;
            }
            let Some(&next) = bytes.get(i + 1) else {
                continue;
            };
            if !(next as char).is_whitespace() {
                continue;
            }
            if c == '.' && self.preceding_word_is_abbreviation(i) {
                continue;
            }
            boundaries.push(i + 1);
        }
        boundaries
    }

    fn paragraph_boundaries(&self, limit: usize) -> Vec<usize> {
        let bytes = self.buffer.as_bytes();
        let limit = limit.min(bytes.len());
        let mut boundaries = Vec::new();

        for i in 0..limit {
            if bytes[i] != b'\n' {
                continue;
            }
            if bytes.get(i + 1) == Some(&b'\n') {
                boundaries.push(i);
                continue;
            }
            let mut spaces = 0;
            let mut j = i + 1;
            while bytes.get(j) == Some(&b' ') {
                spaces += 1;
                j += 1;
            }
            if spaces >= 2 {
                boundaries.push(i);
            }
        }
        boundaries
    }

    /// Scans backward from the period at `period_idx` for the word it
    /// terminates (letters and internal periods, so `"e.g."` resolves to
    /// `"e.g"`), and checks it against the abbreviation list.
    fn preceding_word_is_abbreviation(&self, period_idx: usize) -> bool {
        let bytes = self.buffer.as_bytes();
        let mut start = period_idx;
        while start > 0 {
            let c = bytes[start - 1] as char;
            if c.is_alphanumeric() || c == '.' {
                start -= 1;
            } else {
                break;
            }
        }
        if start == period_idx {
            return false;
        }
        let word = &self.buffer[start..period_idx];
        self.abbreviations.contains(word.to_lowercase().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(chunker: &mut TextChunker, tokens: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        for token in tokens {
            chunks.extend(chunker.push(token));
        }
        if let Some(last) = chunker.flush() {
            chunks.push(last);
        }
        chunks
    }

    #[test]
    fn abbreviation_safe_chunking_s4() {
        let mut chunker = TextChunker::new(ChunkerConfig {
            mode: ChunkMode::Sentence,
            min_chunk_len: 10,
            max_chunk_len: 500,
        });
        let chunks = push_all(&mut chunker, &["Dr. Smith went to the dock. Then he left."]);
        assert_eq!(chunks, vec!["Dr. Smith went to the dock.", "Then he left."]);
    }

    #[test]
    fn p6_concatenation_is_preserved_modulo_boundary_trimming() {
        let input = "The quick fox ran. It jumped high! Did it land? Yes it did.";
        let mut chunker = TextChunker::new(ChunkerConfig::default());
        let chunks = push_all(&mut chunker, &[input]);
        let reconstructed: String = chunks.join(" ");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&reconstructed), normalize(input));
    }

    #[test]
    fn short_sentences_coalesce_until_min_length() {
        let mut chunker = TextChunker::new(ChunkerConfig {
            mode: ChunkMode::Sentence,
            min_chunk_len: 20,
            max_chunk_len: 500,
        });
        let chunks = push_all(&mut chunker, &["Hi. Ok. This is long enough now."]);
        assert!(chunks.iter().all(|c| c.len() >= 1));
        assert!(chunks[0].len() >= 20 || chunks.len() == 1);
    }

    #[test]
    fn forced_split_at_max_length_prefers_sentence_break() {
        let mut chunker = TextChunker::new(ChunkerConfig {
            mode: ChunkMode::Sentence,
            min_chunk_len: 1,
            max_chunk_len: 30,
        });
        let chunks = chunker.push("This is exactly thirty chars. And this continues on past the limit without punctuation for a long while");
        assert!(!chunks.is_empty());
        assert!(chunks[0].len() <= 30);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn paragraph_mode_splits_on_blank_line() {
        let mut chunker = TextChunker::new(ChunkerConfig {
            mode: ChunkMode::Paragraph,
            min_chunk_len: 1,
            max_chunk_len: 500,
        });
        let chunks = push_all(&mut chunker, &["First paragraph here.\n\nSecond paragraph here."]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "First paragraph here.");
        assert_eq!(chunks[1], "Second paragraph here.");
    }

    #[test]
    fn residual_shorter_than_min_is_still_flushed() {
        let mut chunker = TextChunker::new(ChunkerConfig {
            mode: ChunkMode::Sentence,
            min_chunk_len: 100,
            max_chunk_len: 500,
        });
        chunker.push("short.");
        let flushed = chunker.flush().unwrap();
        assert_eq!(flushed, "short.");
    }
}
