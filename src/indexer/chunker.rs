use std::fs;
use std::path::Path;

use crate::store::Chunk;

/// An owned chunk of file text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub position: usize,
}

impl TextChunk {
    pub fn as_chunk(&self) -> Chunk<'_> {
        Chunk {
            position: self.position,
            content: &self.content,
        }
    }
}

/// Reads a file and splits it into chunks.
pub fn chunk_file<P: AsRef<Path>>(
    filepath: P,
    chunk_size: usize,
) -> std::io::Result<Vec<TextChunk>> {
    let content = fs::read_to_string(filepath)?;
    Ok(split_into_chunks(&content, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(position, content)| TextChunk { content, position })
        .collect())
}

/// Splits text into chunks of at most about `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are packed together while they fit;
/// a paragraph longer than `chunk_size` is cut on its own, preferring
/// sentence and line ends.
pub fn split_into_chunks(content: &str, chunk_size: usize) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for para in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();

        if current_len > 0 && current_len + para_len + 2 > chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if para_len > chunk_size {
            chunks.extend(split_large_paragraph(para, chunk_size));
            continue;
        }

        if current_len > 0 {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(para);
        current_len += para_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn is_boundary(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n' | '。' | ';' | '}')
}

/// Cut a paragraph into pieces of at most `chunk_size` chars, searching the
/// second half of each window backwards for a boundary.
fn split_large_paragraph(para: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let chars: Vec<char> = para.chars().collect();
    let mut start = 0;

    while chars.len() - start > chunk_size {
        let window = &chars[start..start + chunk_size];
        let cut = (chunk_size / 2..chunk_size)
            .rev()
            .find(|&i| is_boundary(window[i]))
            .map_or(chunk_size, |i| i + 1);

        let piece: String = window[..cut].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        start += cut;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }

    let rest: String = chars[start..].iter().collect();
    let rest = rest.trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    chunks
}
