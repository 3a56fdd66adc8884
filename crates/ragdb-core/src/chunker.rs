//! Splits raw text into overlapping, size-bounded segments with stable
//! ordering. Chunking is deterministic: the same input always produces the
//! same sequence, which keeps re-ingestion idempotent at the text level.

use crate::config::ChunkingConfig;

pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` must be strictly smaller than `chunk_size`.
    pub fn new(config: &ChunkingConfig) -> anyhow::Result<Self> {
        if config.chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if config.overlap >= config.chunk_size {
            anyhow::bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                config.overlap,
                config.chunk_size
            );
        }
        Ok(Self { chunk_size: config.chunk_size, overlap: config.overlap })
    }

    /// Split `text` into ordered chunk texts.
    ///
    /// Paragraphs are packed greedily up to `chunk_size` characters; a
    /// paragraph longer than `chunk_size` is split into character windows
    /// carrying `overlap` characters between neighbors. The final chunk may
    /// be shorter than `chunk_size`; text that fits yields exactly one
    /// chunk; whitespace-only text yields none.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            let para_len = paragraph.chars().count();
            if para_len > self.chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(self.split_with_overlap(paragraph));
                continue;
            }

            let current_len = current.chars().count();
            if current.is_empty() {
                current.push_str(paragraph);
            } else if current_len + 2 + para_len <= self.chunk_size {
                current.push_str("\n\n");
                current.push_str(paragraph);
            } else {
                chunks.push(std::mem::take(&mut current));
                current.push_str(paragraph);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn split_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let chars: Vec<char> = paragraph.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            if !window.trim().is_empty() {
                windows.push(window);
            }
            if end >= chars.len() {
                break;
            }
            start += step;
        }
        windows
    }
}
