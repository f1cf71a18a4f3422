//! Text matching rules shared by the listing search and the related-video
//! scorer.
//!
//! Three rules are combined disjunctively by [`matches`]: an in-order
//! subsequence check, a plain substring check and a "every word is present"
//! check. All comparisons are case-insensitive and count lengths in chars.

/// Terms shorter than this never match under the subsequence rule and are
/// ignored by the word-coverage rule.
pub const MIN_TERM_CHARS: usize = 2;

fn lowercase_chars(value: &str) -> Vec<char> {
    value.chars().flat_map(char::to_lowercase).collect()
}

/// Returns true when every char of `query` appears in `text` in order, not
/// necessarily adjacent. Queries shorter than [`MIN_TERM_CHARS`] never match.
pub fn subsequence_match(text: &str, query: &str) -> bool {
    if query.chars().count() < MIN_TERM_CHARS {
        return false;
    }
    let text = lowercase_chars(text);
    let query = lowercase_chars(query);

    let mut query_index = 0;
    for ch in text {
        if query_index == query.len() {
            break;
        }
        if ch == query[query_index] {
            query_index += 1;
        }
    }
    query_index == query.len()
}

/// Case-insensitive `contains`.
pub fn substring_match(text: &str, query: &str) -> bool {
    text.to_lowercase().contains(&query.to_lowercase())
}

/// Splits `query` on spaces and requires every word with at least
/// [`MIN_TERM_CHARS`] chars to be a substring of `text`.
///
/// Words below the length floor are skipped, so a query made only of short
/// words is vacuously covered.
pub fn word_coverage_match(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    query
        .to_lowercase()
        .split(' ')
        .filter(|word| word.chars().count() >= MIN_TERM_CHARS)
        .all(|word| text.contains(word))
}

/// Decides whether `candidate` plausibly matches the user supplied `term`.
pub fn matches(candidate: &str, term: &str) -> bool {
    subsequence_match(candidate, term)
        || substring_match(candidate, term)
        || word_coverage_match(candidate, term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsequence_requires_two_chars() {
        assert!(!subsequence_match("cat video", "c"));
        assert!(!subsequence_match("cat video", ""));
        assert!(subsequence_match("cat video", "cv"));
    }

    #[test]
    fn subsequence_keeps_order() {
        assert!(subsequence_match("Cat Video One", "cvo"));
        assert!(!subsequence_match("Cat Video One", "ovc"));
        assert!(!subsequence_match("ab", "abc"));
    }

    #[test]
    fn mixed_case_term_matches_title() {
        assert!(subsequence_match("Cat Video", "cAt"));
        assert!(substring_match("Cat Video", "cAt"));
        assert!(matches("Cat Video", "cAt"));
    }

    #[test]
    fn substring_accepts_single_char() {
        assert!(substring_match("Dog Clip", "g"));
        assert!(matches("Dog Clip", "g"));
        assert!(!substring_match("Dog Clip", "z"));
        assert!(!subsequence_match("Dog Clip", "z"));
    }

    #[test]
    fn single_char_terms_match_through_word_coverage() {
        // Known permissive edge: a one-char term leaves word coverage with
        // nothing to check, so the combined rule accepts it.
        assert!(matches("Dog Clip", "z"));
        assert!(matches("Dog Clip", ""));
    }

    #[test]
    fn word_coverage_needs_every_long_word() {
        assert!(word_coverage_match("Summer Beach Trip", "trip summer"));
        assert!(!word_coverage_match("Summer Beach Trip", "trip winter"));
    }

    #[test]
    fn word_coverage_is_vacuous_for_short_words() {
        // Known permissive edge: "a b" has no word of two chars, so
        // nothing constrains the match.
        assert!(word_coverage_match("Dog Clip", "a b"));
        assert!(matches("Dog Clip", "x y"));
    }

    #[test]
    fn empty_candidate_only_matches_vacuously() {
        assert!(!matches("", "cat"));
        assert!(!subsequence_match("", "ca"));
    }

    #[test]
    fn dropping_the_last_char_keeps_a_match() {
        let candidates = ["Cat Video One", "Beach Trip Part 2", "Dog Clip", "xyz"];
        let terms = ["cat", "cvo", "beach trip", "trip ", "dg", "ov", "zz", "clip dog"];
        for candidate in candidates {
            for term in terms {
                if matches(candidate, term) {
                    let mut shorter: Vec<char> = term.chars().collect();
                    shorter.pop();
                    let shorter: String = shorter.into_iter().collect();
                    assert!(
                        matches(candidate, &shorter),
                        "{candidate:?} matched {term:?} but not {shorter:?}"
                    );
                }
            }
        }
    }
}
