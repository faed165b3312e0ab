//! Fixed-size character chunking with overlap.

/// Characters per chunk.
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 150;

/// Split `text` into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// Whitespace-only windows are dropped. An `overlap >= size` is clamped so
/// the window always advances by at least one character.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
