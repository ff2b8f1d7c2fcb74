use std::collections::HashMap;
use std::sync::RwLock;

use crate::message::topic::Part;

/// A topic known to the trie: its hash plus the head offset of its window
/// chain on disk (zero while the topic only has staged entries).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TopicRef {
    pub hash: u64,
    pub offset: i64,
}

#[derive(Default)]
struct Node {
    children: HashMap<Part, Node>,
    /// Hashes of topics terminating at this node.
    topics: Vec<u64>,
}

/// Trie over topic parts. Published topics may carry wildcards (a message
/// published to `teams.alpha.*` is retrieved by queries for any literal
/// leaf), and queries may carry wildcards over literal topics; lookup
/// matches both directions.
pub(crate) struct Trie {
    inner: RwLock<TrieInner>,
}

#[derive(Default)]
struct TrieInner {
    root: Node,
    /// topic hash -> window chain head offset.
    summary: HashMap<u64, i64>,
}

impl Trie {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TrieInner::default()),
        }
    }

    /// Inserts a topic. Returns false when the hash was already present;
    /// a topic enters the trie exactly once per `(parts, depth)`.
    pub fn add(&self, hash: u64, parts: &[Part], offset: i64) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.summary.contains_key(&hash) {
            return false;
        }
        inner.summary.insert(hash, offset);

        let mut node = &mut inner.root;
        for part in parts {
            node = node.children.entry(part.clone()).or_default();
        }
        if !node.topics.contains(&hash) {
            node.topics.push(hash);
        }
        true
    }

    /// Head offset for a topic hash, None when the topic is unknown.
    pub fn get_offset(&self, hash: u64) -> Option<i64> {
        self.inner.read().unwrap().summary.get(&hash).copied()
    }

    /// Updates the head offset for a known topic hash.
    pub fn set_offset(&self, hash: u64, offset: i64) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.summary.get_mut(&hash) {
            Some(slot) => {
                *slot = offset;
                true
            }
            None => false,
        }
    }

    /// All topics matching the query parts under wildcard semantics.
    pub fn lookup(&self, parts: &[Part]) -> Vec<TopicRef> {
        let inner = self.inner.read().unwrap();
        let mut hashes = Vec::new();
        walk(&inner.root, parts, &mut hashes);
        hashes.sort_unstable();
        hashes.dedup();
        hashes
            .into_iter()
            .map(|hash| TopicRef {
                hash,
                offset: inner.summary.get(&hash).copied().unwrap_or(0),
            })
            .collect()
    }

    /// Number of distinct topics.
    pub fn count(&self) -> usize {
        self.inner.read().unwrap().summary.len()
    }
}

fn walk(node: &Node, query: &[Part], out: &mut Vec<u64>) {
    // A stored `...` child matches the rest of the query at any depth,
    // including the empty rest.
    if let Some(multi) = node.children.get(&Part::MultiWildcard) {
        out.extend(&multi.topics);
    }

    let Some(part) = query.first() else {
        out.extend(&node.topics);
        return;
    };
    let rest = &query[1..];

    match part {
        // A query `...` collects every topic at or below this node.
        Part::MultiWildcard => collect_subtree(node, out),
        Part::SingleWildcard => {
            for (edge, child) in &node.children {
                if *edge != Part::MultiWildcard {
                    walk(child, rest, out);
                }
            }
        }
        Part::Literal(_) => {
            if let Some(child) = node.children.get(part) {
                walk(child, rest, out);
            }
            // Stored single wildcards match any literal query part.
            if let Some(child) = node.children.get(&Part::SingleWildcard) {
                walk(child, rest, out);
            }
        }
    }
}

fn collect_subtree(node: &Node, out: &mut Vec<u64>) {
    out.extend(&node.topics);
    for child in node.children.values() {
        collect_subtree(child, out);
    }
}
