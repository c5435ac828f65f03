
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Configuration for content chunking
///
/// Both values are measured in characters (Unicode scalar values), not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub size: usize,
    /// Number of characters shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    /// Distance between the starts of two consecutive windows.
    ///
    /// Never zero, even when `overlap >= size`.
    #[inline]
    pub fn step(&self) -> usize {
        let size = self.size.max(1);
        size.saturating_sub(self.overlap.min(size - 1)).max(1)
    }
}

/// Collapse every run of whitespace into a single space and trim both ends
#[inline]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Split a single page of text into overlapping windows.
///
/// The text is normalized first. The returned iterator is lazy and owns its
/// input, so it can be held across await points.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> TextWindows {
    TextWindows::new(normalize_whitespace(text), config)
}

/// Chunk every page independently; windows never span two pages.
#[inline]
pub fn chunk_pages<I, S>(pages: I, config: ChunkingConfig) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pages
        .into_iter()
        .flat_map(move |page| chunk_text(page.as_ref(), &config))
}

/// Lazy iterator over the windows of one normalized page
#[derive(Debug, Clone)]
pub struct TextWindows {
    text: String,
    /// Byte offset of every character start, plus `text.len()` as a sentinel
    offsets: Vec<usize>,
    position: usize,
    size: usize,
    step: usize,
}

impl TextWindows {
    fn new(text: String, config: &ChunkingConfig) -> Self {
        let offsets = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect::<Vec<_>>();

        debug!(
            "Windowing {} characters (size {}, step {})",
            offsets.len() - 1,
            config.size.max(1),
            config.step()
        );

        Self {
            text,
            offsets,
            position: 0,
            size: config.size.max(1),
            step: config.step(),
        }
    }

    /// Number of characters in the normalized text
    #[inline]
    pub fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// The normalized text being windowed
    #[inline]
    pub fn normalized(&self) -> &str {
        &self.text
    }
}

impl Iterator for TextWindows {
    type Item = String;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let char_len = self.char_len();
        if self.position >= char_len {
            return None;
        }

        let end = (self.position + self.size).min(char_len);
        let start_byte = *self.offsets.get(self.position)?;
        let end_byte = *self.offsets.get(end)?;
        let window = self.text.get(start_byte..end_byte)?.to_owned();

        self.position += self.step;
        Some(window)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.char_len().saturating_sub(self.position);
        let count = remaining.div_ceil(self.step);
        (count, Some(count))
    }
}
