// Multi-keyword matcher
//
// Aho-Corasick automaton over normalized characters. Keywords and scanned
// text go through the same accent and case folding, so a keyword matches
// regardless of diacritics or capitalisation in either.

use std::collections::{HashMap, VecDeque};

use famshield_common::text::{normalize, normalized_chars};

const ROOT: usize = 0;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    fail: usize,
    /// Keyword ending exactly at this node.
    output: Option<usize>,
    /// Nearest proper suffix node that has an output.
    suffix_output: Option<usize>,
}

/// A keyword occurrence in scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Index of the keyword in the list the matcher was built from.
    pub index: usize,
    /// Offset, in normalized characters, just past the last matched character.
    pub end: usize,
}

#[derive(Debug)]
pub struct TextMatcher {
    nodes: Vec<Node>,
    keywords: Vec<String>,
}

impl TextMatcher {
    /// Build the automaton in time linear in the total keyword length.
    ///
    /// Keywords that fold to the empty string are skipped. When two keywords
    /// fold to the same string the first one is reported.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self { nodes: vec![Node::default()], keywords: Vec::new() };

        for keyword in keywords {
            let original = keyword.as_ref();
            let index = matcher.keywords.len();
            matcher.keywords.push(original.to_string());
            matcher.insert(&normalize(original), index);
        }

        matcher.build_links();
        matcher
    }

    fn insert(&mut self, folded: &str, index: usize) {
        if folded.is_empty() {
            return;
        }

        let mut state = ROOT;
        for c in folded.chars() {
            state = match self.nodes[state].children.get(&c) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[state].children.insert(c, next);
                    next
                }
            };
        }

        self.nodes[state].output.get_or_insert(index);
    }

    fn build_links(&mut self) {
        let mut queue: VecDeque<usize> = self.nodes[ROOT].children.values().copied().collect();

        while let Some(state) = queue.pop_front() {
            let children: Vec<(char, usize)> =
                self.nodes[state].children.iter().map(|(&c, &n)| (c, n)).collect();

            for (c, child) in children {
                let mut fallback = self.nodes[state].fail;
                let fail = loop {
                    if let Some(&next) = self.nodes[fallback].children.get(&c) {
                        if next != child {
                            break next;
                        }
                    }
                    if fallback == ROOT {
                        break ROOT;
                    }
                    fallback = self.nodes[fallback].fail;
                };

                self.nodes[child].fail = fail;
                self.nodes[child].suffix_output = if self.nodes[fail].output.is_some() {
                    Some(fail)
                } else {
                    self.nodes[fail].suffix_output
                };

                queue.push_back(child);
            }
        }
    }

    fn step(&self, mut state: usize, c: char) -> usize {
        loop {
            if let Some(&next) = self.nodes[state].children.get(&c) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.nodes[state].fail;
        }
    }

    /// Longest keyword ending at `state`, checking the node before its suffixes.
    fn output_at(&self, state: usize) -> Option<usize> {
        self.nodes[state]
            .output
            .or_else(|| self.nodes[state].suffix_output.and_then(|s| self.nodes[s].output))
    }

    /// Keyword whose occurrence ends earliest in `text`.
    pub fn find_first_match(&self, text: &str) -> Option<KeywordMatch> {
        if self.is_empty() {
            return None;
        }

        let mut state = ROOT;
        for (position, c) in normalized_chars(text).enumerate() {
            state = self.step(state, c);
            if let Some(index) = self.output_at(state) {
                return Some(KeywordMatch { index, end: position + 1 });
            }
        }

        None
    }

    /// The original (unnormalized) keyword that matched first.
    pub fn find_first(&self, text: &str) -> Option<&str> {
        self.find_first_match(text).map(|m| self.keywords[m.index].as_str())
    }

    /// Every occurrence in `text`, in order of end position. Overlapping and
    /// nested occurrences are all reported.
    pub fn find_all(&self, text: &str) -> Vec<KeywordMatch> {
        let mut matches = Vec::new();
        if self.is_empty() {
            return matches;
        }

        let mut state = ROOT;
        for (position, c) in normalized_chars(text).enumerate() {
            state = self.step(state, c);

            let mut node = Some(state);
            while let Some(current) = node {
                if let Some(index) = self.nodes[current].output {
                    matches.push(KeywordMatch { index, end: position + 1 });
                }
                node = self.nodes[current].suffix_output;
            }
        }

        matches
    }

    pub fn keyword(&self, index: usize) -> Option<&str> {
        self.keywords.get(index).map(String::as_str)
    }

    /// True when no keyword can ever match.
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_ushers() {
        let matcher = TextMatcher::new(["he", "she", "his", "hers"]);
        // "she" and "he" both end at index 3; the longer one is reported
        assert_eq!(matcher.find_first("ushers"), Some("she"));

        let all: Vec<&str> =
            matcher.find_all("ushers").iter().filter_map(|m| matcher.keyword(m.index)).collect();
        assert_eq!(all, vec!["she", "he", "hers"]);
    }

    #[test]
    fn test_accent_and_case_insensitive() {
        let matcher = TextMatcher::new(["sebevražda"]);
        assert_eq!(matcher.find_first("SEBEVRAŽDA"), Some("sebevražda"));
        assert_eq!(matcher.find_first("sebevrazda"), Some("sebevražda"));
        assert_eq!(matcher.find_first("Sebevražda není řešení"), Some("sebevražda"));
        assert_eq!(matcher.find_first("sebevrah"), None);
    }

    #[test]
    fn test_empty_inputs_never_match() {
        let empty = TextMatcher::new(Vec::<String>::new());
        assert!(empty.is_empty());
        assert_eq!(empty.find_first("anything at all"), None);

        let matcher = TextMatcher::new(["drogy"]);
        assert_eq!(matcher.find_first(""), None);
    }

    #[test]
    fn test_blank_keywords_are_skipped() {
        let matcher = TextMatcher::new(["", "\u{301}", "knife"]);
        assert_eq!(matcher.len(), 3);
        assert_eq!(matcher.find_first("a plain sentence"), None);
        assert_eq!(matcher.find_first("a knife"), Some("knife"));
    }

    #[test]
    fn test_earliest_ending_wins() {
        let matcher = TextMatcher::new(["abcd", "bc"]);
        assert_eq!(matcher.find_first("xabcd"), Some("bc"));
    }

    #[test]
    fn test_suffix_ancestor_is_checked() {
        // the automaton is deep inside "abcx" when "bc" completes
        let matcher = TextMatcher::new(["abcx", "bc"]);
        let found = matcher.find_first_match("abcy").unwrap();
        assert_eq!(matcher.keyword(found.index), Some("bc"));
        assert_eq!(found.end, 3);
    }

    #[test]
    fn test_duplicate_folded_keywords_report_first() {
        let matcher = TextMatcher::new(["Drogy", "drogy"]);
        assert_eq!(matcher.find_first("prodám drogy"), Some("Drogy"));
    }
}
