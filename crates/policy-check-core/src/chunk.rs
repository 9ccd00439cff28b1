//! Fixed-window text chunker.
//!
//! Splits extracted policy text into overlapping windows of `chunk_size`
//! characters. Windows are counted in `char`s, not bytes, so a window never
//! cuts a multi-byte character. There is no awareness of sentence or section
//! boundaries.
//!
//! Each window starts `chunk_size - overlap` characters after the previous
//! one. When `overlap >= chunk_size` the next window starts where the previous
//! one ended instead, so the chunker always makes forward progress.

/// Compute the `(start, end)` char offsets of every window over the trimmed
/// text. Offsets index into `text.trim().chars()`.
pub fn split_offsets(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let n = text.trim().chars().count();
    let size = chunk_size.max(1);

    if n == 0 {
        return Vec::new();
    }
    if n <= size {
        return vec![(0, n)];
    }

    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        let end = n.min(start + size);
        windows.push((start, end));

        if end == n {
            break;
        }

        let mut next_start = end.saturating_sub(overlap);
        if next_start <= start {
            next_start = end;
        }
        start = next_start;
    }

    windows
}

/// Split text into trimmed, overlapping chunks.
///
/// Empty (or whitespace-only) input yields no chunks. Input no longer than
/// `chunk_size` yields exactly one chunk equal to the trimmed input.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    let chars: Vec<char> = trimmed.chars().collect();

    if chars.len() <= chunk_size.max(1) {
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    split_offsets(trimmed, chunk_size, overlap)
        .into_iter()
        .filter_map(|(start, end)| {
            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if window.is_empty() {
                None
            } else {
                Some(window.to_string())
            }
        })
        .collect()
}
