//! Markdown-aware splitting of documents into indexable chunks.
//!
//! A document is first cut into sections at ATX headings (the unit the
//! retrieval pipeline treats as one node); sections longer than the
//! configured window are further split at word boundaries. Chunk offsets are
//! byte offsets into the original text, UTF-8 safe.

/// Chunking configuration, taken from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub max_chars: usize,
    /// Overlap between adjacent window chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 4096,
            overlap: 0,
        }
    }
}

/// A chunk of text from a larger document.
///
/// Each chunk represents one future index node, with a document-wide index
/// and a byte offset for mapping back to the source.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split a document into chunks: one per markdown section, with oversized
/// sections windowed down to `max_chars`.
///
/// Whitespace-only sections are skipped. Text without any headings behaves
/// like a single section.
pub fn split_markdown(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (offset, section) in split_sections(text) {
        split_window(section, offset, config, &mut chunks);
    }

    chunks
}

/// Cut text into (byte_offset, section) pairs at ATX heading lines.
fn split_sections(text: &str) -> Vec<(usize, &str)> {
    let mut sections = Vec::new();
    let mut start = 0usize;
    let mut pos = 0usize;

    for line in text.split_inclusive('\n') {
        if is_heading(line) && pos > start {
            sections.push((start, &text[start..pos]));
            start = pos;
        }
        pos += line.len();
    }
    if pos > start {
        sections.push((start, &text[start..pos]));
    }

    sections
}

fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    (1..=6).contains(&hashes)
        && trimmed.as_bytes().get(hashes).is_some_and(|&b| b == b' ')
}

/// Split a single section into window chunks of at most `max_chars`
/// characters, breaking at word boundaries where possible.
fn split_window(
    section: &str,
    base_offset: usize,
    config: ChunkingConfig,
    chunks: &mut Vec<Chunk>,
) {
    if section.trim().is_empty() {
        return;
    }

    let char_count = section.chars().count();
    if char_count <= config.max_chars {
        push_chunk(chunks, section, base_offset);
        return;
    }

    // Map of char index -> byte index for O(1) slicing.
    let char_to_byte: Vec<usize> = section
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(section.len()))
        .collect();

    let step = config.max_chars.saturating_sub(config.overlap).max(1);
    let mut start_char = 0;

    while start_char < char_count {
        let mut end_char = (start_char + config.max_chars).min(char_count);

        // Fold a small tail into this chunk instead of emitting a sliver.
        if char_count - end_char < config.max_chars / 4 {
            end_char = char_count;
        } else {
            end_char = find_word_boundary(section, &char_to_byte, end_char);
        }

        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[end_char];
        push_chunk(
            chunks,
            &section[start_byte..end_byte],
            base_offset + start_byte,
        );

        if end_char == char_count {
            break;
        }
        start_char += step;
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, start_offset: usize) {
    if text.trim().is_empty() {
        return;
    }
    chunks.push(Chunk {
        text: text.to_string(),
        index: chunks.len(),
        start_offset,
    });
}

/// Find a word boundary near the given char position, preferring to break
/// at whitespace. Looks back at most 100 chars.
fn find_word_boundary(
    text: &str,
    char_to_byte: &[usize],
    pos_char: usize,
) -> usize {
    let search_start_char = pos_char.saturating_sub(100);

    let start_byte = char_to_byte[search_start_char];
    let end_byte = char_to_byte[pos_char];
    let search_region = &text[start_byte..end_byte];

    if let Some(ws_byte_offset) =
        search_region.rfind(|c: char| c.is_whitespace())
    {
        let ws_byte = start_byte + ws_byte_offset;
        for (char_idx, &byte_idx) in char_to_byte.iter().enumerate() {
            if byte_idx > ws_byte {
                return char_idx;
            }
        }
    }

    pos_char
}
