//! Message chunking for platform length limits.

/// Split `text` into chunks of at most `limit` characters, preferring to cut
/// at the last newline inside each window.
///
/// When a cut lands on a newline, that newline is the separator and is not
/// carried into the next chunk; rejoining the chunks with `"\n"` at those
/// points reconstructs the input exactly. When no newline exists inside the
/// window, the cut is exactly at `limit` characters. Never slices inside a
/// UTF-8 code point.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if char_count_at_most(text, limit) {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    loop {
        if char_count_at_most(rest, limit) {
            chunks.push(rest.to_string());
            break;
        }

        let window_end = byte_index_of_char(rest, limit);
        match rest[..window_end].rfind('\n') {
            Some(cut) => {
                chunks.push(rest[..cut].to_string());
                // Skip the separator newline; it is not content.
                rest = &rest[cut + 1..];
            }
            None => {
                chunks.push(rest[..window_end].to_string());
                rest = &rest[window_end..];
            }
        }
    }

    chunks
}

/// Whether `s` has at most `n` characters, without scanning past `n`.
fn char_count_at_most(s: &str, n: usize) -> bool {
    s.chars().nth(n).is_none()
}

/// Byte index of the `n`-th character of `s` (assumes `s` has more than `n`
/// characters).
fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within_limit(chunks: &[String], limit: usize) {
        for chunk in chunks {
            assert!(
                chunk.chars().count() <= limit,
                "chunk exceeds limit: {chunk:?}"
            );
        }
    }

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert_eq!(split_message("", 10), vec![""]);
    }

    #[test]
    fn test_exact_limit_unchanged() {
        assert_eq!(split_message("abcde", 5), vec!["abcde"]);
    }

    #[test]
    fn test_cuts_at_last_newline_in_window() {
        let chunks = split_message("one\ntwo\nthree", 9);
        assert_eq!(chunks, vec!["one\ntwo", "three"]);
        assert_within_limit(&chunks, 9);
    }

    #[test]
    fn test_hard_cut_without_newline() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_round_trip_with_newline_cuts() {
        let text = "alpha\nbeta\ngamma\ndelta\nepsilon";
        let chunks = split_message(text, 12);
        assert_within_limit(&chunks, 12);
        // Newline cuts consume the separator, so joining with "\n" restores
        // the input.
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_round_trip_hard_cuts() {
        let text = "x".repeat(41_000);
        let chunks = split_message(&text, 40_000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 40_000);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_minimal_chunk_count() {
        // Each chunk except the last must extend as far as the newline rule
        // allows: a 3-line text where two lines fit per window splits into
        // two chunks, not three.
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaaa\nbbbb");
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "héllo wörld ".repeat(100);
        let chunks = split_message(&text, 7);
        assert_within_limit(&chunks, 7);
        for chunk in &chunks {
            assert!(chunk.is_char_boundary(chunk.len()));
        }
    }

}
