//! NDJSON line handling.

/// Iterate the non-blank lines of an NDJSON document, trimmed, paired with
/// their 1-based line numbers for diagnostics.
pub fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_but_keeps_numbering() {
        let text = "{\"a\":1}\n\n  \n{\"b\":2}\n";
        let collected: Vec<(usize, &str)> = lines(text).collect();
        assert_eq!(collected, vec![(1, "{\"a\":1}"), (4, "{\"b\":2}")]);
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert_eq!(lines("").count(), 0);
        assert_eq!(lines("\n\n").count(), 0);
    }
}
