//! Character-level trie used for common-prefix piece lookup.
//!
//! The lattice builder asks, for every symbol boundary, which vocabulary
//! pieces start at that boundary. A trie over piece surfaces answers this
//! with a single walk down the suffix.

use ahash::AHashMap;

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: AHashMap<char, u32>,
    value: Option<u32>,
}

/// A trie mapping piece surfaces to piece ids.
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<TrieNode>,
}

impl Trie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    /// Insert a key with the given piece id.
    ///
    /// Re-inserting a key overwrites its value.
    pub fn insert(&mut self, key: &str, value: u32) {
        let mut node = 0usize;
        for c in key.chars() {
            let next = match self.nodes[node].children.get(&c) {
                Some(&next) => next as usize,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(c, next as u32);
                    next
                }
            };
            node = next;
        }
        self.nodes[node].value = Some(value);
    }

    /// Find all pieces that are prefixes of `chars`.
    ///
    /// Returns `(piece_id, length_in_chars)` for each match, shortest first.
    pub fn common_prefix_search(&self, chars: &[char]) -> Vec<(u32, usize)> {
        let mut matches = Vec::new();
        let mut node = 0usize;
        for (i, c) in chars.iter().enumerate() {
            match self.nodes[node].children.get(c) {
                Some(&next) => node = next as usize,
                None => break,
            }
            if let Some(value) = self.nodes[node].value {
                matches.push((value, i + 1));
            }
        }
        matches
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_prefix_search() {
        let mut trie = Trie::new();
        trie.insert("a", 0);
        trie.insert("ab", 1);
        trie.insert("abc", 2);
        trie.insert("b", 3);

        let chars: Vec<char> = "abcd".chars().collect();
        let matches = trie.common_prefix_search(&chars);
        assert_eq!(matches, vec![(0, 1), (1, 2), (2, 3)]);

        let chars: Vec<char> = "ba".chars().collect();
        let matches = trie.common_prefix_search(&chars);
        assert_eq!(matches, vec![(3, 1)]);
    }

    #[test]
    fn test_no_match() {
        let mut trie = Trie::new();
        trie.insert("xy", 0);
        let chars: Vec<char> = "ab".chars().collect();
        assert!(trie.common_prefix_search(&chars).is_empty());
    }

    #[test]
    fn test_unicode_keys() {
        let mut trie = Trie::new();
        trie.insert("▁低", 7);
        let chars: Vec<char> = "▁低い".chars().collect();
        assert_eq!(trie.common_prefix_search(&chars), vec![(7, 2)]);
    }
}
