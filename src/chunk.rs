//! Paragraph-boundary text chunker.
//!
//! Splits a normalized document body into retrieval units bounded by
//! `max_chars`. Splitting occurs on paragraph boundaries (`\n\n`) first to
//! preserve semantic coherence; a single paragraph that still exceeds the
//! limit is split at sentence ends, then at whitespace, and only as a last
//! resort at a hard character window.
//!
//! Units that are empty after trimming are dropped silently. Boundaries are
//! not required to be stable across re-ingestion — an edited document is
//! modeled as a fresh resource, not an in-place diff.

/// Split text into chunks on paragraph boundaries, respecting `max_chars`.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(std::mem::take(&mut current_buf));
            }
            split_oversized(trimmed, max_chars, &mut chunks);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(current_buf);
    }

    chunks
}

/// Split a paragraph that exceeds the limit: prefer a sentence end within
/// the window, then any whitespace, then a hard cut at a char boundary.
fn split_oversized(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            push_trimmed(remaining, out);
            break;
        }

        let window = floor_char_boundary(remaining, max_chars);
        let head = &remaining[..window];

        // rfind yields the whitespace char's start; step past its full
        // UTF-8 width so the split lands on a char boundary.
        let split_at = find_sentence_end(head)
            .or_else(|| {
                head.rfind(|c: char| c.is_whitespace())
                    .map(|p| p + head[p..].chars().next().map_or(1, char::len_utf8))
            })
            .filter(|&p| p > 0)
            .unwrap_or(window);

        push_trimmed(&remaining[..split_at], out);
        remaining = &remaining[split_at..];
    }
}

fn push_trimmed(piece: &str, out: &mut Vec<String>) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Byte offset just after the last sentence terminator in `head`, if any.
fn find_sentence_end(head: &str) -> Option<usize> {
    head.char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
