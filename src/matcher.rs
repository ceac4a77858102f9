//! Word-boundary matching of tracked words inside page text.

use fst::Set;
use fst::raw::Fst;
use tracing::warn;

/// One occurrence of a tracked word. Offsets are byte offsets into the
/// scanned text and always fall on char boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    /// Text as it appears on the page, original casing preserved.
    pub matched_text: String,
}

impl MatchSpan {
    /// Canonical (lowercase) form of the matched word.
    pub fn word(&self) -> String {
        self.matched_text.to_lowercase()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Index of the active words, reusable across many text nodes.
///
/// Words live in an FST keyed by their lowercase bytes, so one walk from a
/// text position yields every candidate ending there; the longest one that
/// satisfies the boundary rule wins.
pub struct WordMatcher {
    index: Option<Set<Vec<u8>>>,
}

impl WordMatcher {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        words.sort_unstable();
        words.dedup();
        if words.is_empty() {
            return Self::empty();
        }
        let index = match Set::from_iter(words.iter()) {
            Ok(set) => Some(set),
            Err(err) => {
                warn!(error = %err, "failed to index active words");
                None
            }
        };
        Self { index }
    }

    pub fn empty() -> Self {
        Self { index: None }
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, |set| set.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index
            .as_ref()
            .is_some_and(|set| set.contains(word.trim().to_lowercase()))
    }

    /// Finds every tracked word in `text`, left to right, without overlaps.
    pub fn find_matches(&self, text: &str) -> Vec<MatchSpan> {
        let mut spans = Vec::new();
        let Some(index) = self.index.as_ref() else {
            return spans;
        };
        let bytes = text.as_bytes();
        let fst = index.as_fst();
        let mut candidates = Vec::new();
        let mut cursor = 0;

        while cursor < bytes.len() {
            if !text.is_char_boundary(cursor) || (cursor > 0 && is_letter(bytes[cursor - 1])) {
                cursor += 1;
                continue;
            }
            candidates.clear();
            collect_candidate_ends(fst, &bytes[cursor..], &mut candidates);

            let accepted = candidates
                .iter()
                .rev()
                .map(|len| cursor + len)
                .find(|&end| bytes.get(end).is_none_or(|&next| !is_letter(next)));

            match accepted.and_then(|end| text.get(cursor..end).map(|slice| (end, slice))) {
                Some((end, slice)) => {
                    spans.push(MatchSpan {
                        start: cursor,
                        end,
                        matched_text: slice.to_string(),
                    });
                    cursor = end;
                }
                None => cursor += 1,
            }
        }
        spans
    }
}

/// Convenience wrapper building a one-off matcher.
pub fn find_matches<I, S>(text: &str, active_words: I) -> Vec<MatchSpan>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    WordMatcher::new(active_words).find_matches(text)
}

fn is_letter(byte: u8) -> bool {
    byte.is_ascii_alphabetic()
}

/// Pushes the byte length of every indexed word that prefixes `input`
/// (ASCII case folded), shortest first.
fn collect_candidate_ends(fst: &Fst<Vec<u8>>, input: &[u8], out: &mut Vec<usize>) {
    let mut node = fst.root();
    for (offset, byte) in input.iter().enumerate() {
        let Some(idx) = node.find_input(byte.to_ascii_lowercase()) else {
            return;
        };
        node = fst.node(node.transition(idx).addr);
        if node.is_final() {
            out.push(offset + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(spans: &[MatchSpan]) -> Vec<&str> {
        spans.iter().map(|span| span.matched_text.as_str()).collect()
    }

    #[test]
    fn prefers_longest_candidate() {
        let spans = find_matches("a category", ["cat", "category"]);
        assert_eq!(texts(&spans), vec!["category"]);
        assert_eq!((spans[0].start, spans[0].end), (2, 10));
    }

    #[test]
    fn respects_word_boundaries() {
        assert!(find_matches("category", ["cat"]).is_empty());
        assert!(find_matches("concat", ["cat"]).is_empty());
        let spans = find_matches("cat, cats and a cat.", ["cat"]);
        assert_eq!(texts(&spans), vec!["cat", "cat"]);
        assert_eq!(spans[1].start, 16);
    }

    #[test]
    fn digits_and_punctuation_are_boundaries() {
        let spans = find_matches("3cat_(cat)-cat", ["cat"]);
        assert_eq!(texts(&spans), vec!["cat", "cat", "cat"]);
    }

    #[test]
    fn falls_back_to_shorter_word_when_longer_breaks_boundary() {
        // "cats" is a prefix hit for "cat" and "cats"; "catsup" rejects "cats"
        // but also rejects "cat", so nothing matches there.
        let spans = find_matches("catsup cats", ["cat", "cats"]);
        assert_eq!(texts(&spans), vec!["cats"]);
        let spans = find_matches("cat-like", ["cat", "cat-li"]);
        assert_eq!(texts(&spans), vec!["cat"]);
    }

    #[test]
    fn detection_ignores_case_but_keeps_page_casing() {
        let spans = find_matches("Hello HELLO hello", ["hello"]);
        assert_eq!(texts(&spans), vec!["Hello", "HELLO", "hello"]);
        assert!(spans.iter().all(|span| span.word() == "hello"));
        let spans = find_matches("hello", ["HeLLo"]);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn hyphenated_words_match_whole() {
        let spans = find_matches("a well-known fact", ["well-known", "well"]);
        assert_eq!(texts(&spans), vec!["well-known"]);
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        assert!(find_matches("", ["cat"]).is_empty());
        assert!(find_matches("a cat", Vec::<String>::new()).is_empty());
        assert!(find_matches("a cat", ["", "   "]).is_empty());
    }

    #[test]
    fn multibyte_text_keeps_offsets_on_char_boundaries() {
        let text = "naïve café cat über";
        let spans = find_matches(text, ["cat", "café"]);
        assert_eq!(texts(&spans), vec!["café", "cat"]);
        for span in &spans {
            assert_eq!(&text[span.start..span.end], span.matched_text);
        }
    }

    #[test]
    fn matcher_is_reusable_and_reports_contents() {
        let matcher = WordMatcher::new(["Apple", "apple", "pear"]);
        assert_eq!(matcher.len(), 2);
        assert!(matcher.contains("APPLE"));
        assert!(!matcher.contains("plum"));
        assert_eq!(matcher.find_matches("apple pie").len(), 1);
        assert_eq!(matcher.find_matches("pear tart").len(), 1);
        assert!(WordMatcher::empty().find_matches("apple").is_empty());
    }

    proptest! {
        #[test]
        fn spans_are_sorted_and_disjoint(
            text in "[a-zA-Z .,-]{0,80}",
            words in proptest::collection::vec("[a-z]{1,6}", 0..6),
        ) {
            let spans = find_matches(&text, &words);
            for pair in spans.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
                prop_assert!(pair[0].start < pair[1].start);
            }
        }

        #[test]
        fn spans_sit_on_word_boundaries(
            text in "[a-zA-Z .,-]{0,80}",
            words in proptest::collection::vec("[a-z]{1,6}", 0..6),
        ) {
            let bytes = text.as_bytes();
            for span in find_matches(&text, &words) {
                prop_assert!(span.start == 0 || !bytes[span.start - 1].is_ascii_alphabetic());
                prop_assert!(span.end == bytes.len() || !bytes[span.end].is_ascii_alphabetic());
                prop_assert!(words.contains(&span.word()));
                prop_assert_eq!(&text[span.start..span.end], span.matched_text.as_str());
            }
        }
    }
}
