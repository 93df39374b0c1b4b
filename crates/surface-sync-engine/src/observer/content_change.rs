//! Classification of an observed text change into a minimal edit.
//!
//! Offsets here are char offsets into a branch's rendered text (which is
//! offset-aligned with the branch's inner model range).

/// The smallest edit that turns the previous text into the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEdit {
    /// Text identical; only structure (the hash) may have drifted
    Unchanged,
    Insert { at: usize, text: String },
    Remove { start: usize, end: usize },
    /// Differing middle span between the common prefix and suffix
    Replace {
        start: usize,
        end: usize,
        text: String,
    },
}

/// Classify a change given the collapsed carets before and after it.
///
/// Fast paths: an insertion at the previous caret that the caret moved
/// across, a backspace-style removal ending at the previous caret, or a
/// delete-style removal starting at it. Anything else is a replacement of
/// the span between the longest common prefix and suffix.
pub fn classify(
    previous: &str,
    next: &str,
    previous_caret: Option<usize>,
    next_caret: Option<usize>,
) -> ContentEdit {
    let prev: Vec<char> = previous.chars().collect();
    let next: Vec<char> = next.chars().collect();
    if prev == next {
        return ContentEdit::Unchanged;
    }

    if let (Some(pc), Some(nc)) = (previous_caret, next_caret)
        && pc <= prev.len()
        && nc <= next.len()
    {
        if nc > pc
            && next.len() == prev.len() + (nc - pc)
            && prev[..pc] == next[..pc]
            && prev[pc..] == next[nc..]
        {
            return ContentEdit::Insert {
                at: pc,
                text: next[pc..nc].iter().collect(),
            };
        }
        if prev.len() > next.len() {
            let removed = prev.len() - next.len();
            if nc + removed == pc && prev[..nc] == next[..nc] && prev[pc..] == next[nc..] {
                return ContentEdit::Remove { start: nc, end: pc };
            }
            if nc == pc
                && pc + removed <= prev.len()
                && prev[..pc] == next[..pc]
                && prev[pc + removed..] == next[pc..]
            {
                return ContentEdit::Remove {
                    start: pc,
                    end: pc + removed,
                };
            }
        }
    }

    let prefix = prev
        .iter()
        .zip(next.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = prev.len().min(next.len()) - prefix;
    let suffix = prev
        .iter()
        .rev()
        .zip(next.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    ContentEdit::Replace {
        start: prefix,
        end: prev.len() - suffix,
        text: next[prefix..next.len() - suffix].iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn insert(at: usize, text: &str) -> ContentEdit {
        ContentEdit::Insert {
            at,
            text: text.to_string(),
        }
    }

    fn replace(start: usize, end: usize, text: &str) -> ContentEdit {
        ContentEdit::Replace {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[rstest]
    #[case("hello", "hello!", Some(5), Some(6), insert(5, "!"))]
    #[case("helo", "hello", Some(3), Some(4), insert(3, "l"))]
    #[case("hello world", "hello", Some(11), Some(5), ContentEdit::Remove { start: 5, end: 11 })]
    #[case("hello", "hllo", Some(1), Some(1), ContentEdit::Remove { start: 1, end: 2 })]
    #[case("cat", "bat", Some(3), Some(3), replace(0, 1, "b"))]
    #[case("aaa", "aaaa", None, None, replace(3, 3, "a"))]
    #[case("abc", "abc", Some(1), Some(2), ContentEdit::Unchanged)]
    fn test_classify(
        #[case] previous: &str,
        #[case] next: &str,
        #[case] previous_caret: Option<usize>,
        #[case] next_caret: Option<usize>,
        #[case] expected: ContentEdit,
    ) {
        assert_eq!(classify(previous, next, previous_caret, next_caret), expected);
    }

    #[test]
    fn test_insertion_elsewhere_than_caret_falls_back_to_replace() {
        // Autocorrect rewrote an earlier word while the caret moved on
        assert_eq!(
            classify("teh cat", "the cat!", Some(7), Some(8)),
            replace(1, 7, "he cat!")
        );
    }

    #[test]
    fn test_suffix_never_overlaps_prefix() {
        assert_eq!(classify("aa", "aaa", Some(0), Some(0)), replace(2, 2, "a"));
    }
}
