// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Subscription topic tree.
//!
//! Filters are stored level by level; wildcard levels keep their `+`/`#`
//! tokens as child keys. A publish walks the tree along its concrete topic
//! and collects every subscriber whose filter terminates on the walk.
//!
//! Matching order is deterministic: within one node subscribers stay in
//! insertion order, across nodes the walk visits the literal child first,
//! then `+`, then `#`.

use codec::{QoS, TopicFilter, TopicLevel};
use std::collections::BTreeMap;

use crate::types::PipeId;

const SINGLE_WILDCARD: &str = "+";
const MULTI_WILDCARD: &str = "#";

/// One subscription entry at a terminal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub pipe_id: PipeId,
    pub qos: QoS,
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<String, Node>,
    subscribers: Vec<Subscriber>,
}

impl Node {
    fn is_unused(&self) -> bool {
        self.children.is_empty() && self.subscribers.is_empty()
    }
}

/// Trie over topic filters with `+`/`#` wildcard matching.
#[derive(Debug, Default)]
pub struct SubTrie {
    root: Node,
}

fn level_key(level: &TopicLevel) -> &str {
    match level {
        TopicLevel::Literal(literal) => literal.as_str(),
        TopicLevel::Single => SINGLE_WILDCARD,
        TopicLevel::Multi => MULTI_WILDCARD,
    }
}

impl SubTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. A duplicate (pipe, filter) pair replaces the
    /// old entry in place, keeping its position in the delivery order.
    pub fn insert(&mut self, filter: &TopicFilter, pipe_id: PipeId, qos: QoS) {
        let mut node = &mut self.root;
        for level in filter.levels() {
            node = node
                .children
                .entry(level_key(level).to_string())
                .or_default();
        }
        match node
            .subscribers
            .iter_mut()
            .find(|sub| sub.pipe_id == pipe_id)
        {
            Some(subscriber) => subscriber.qos = qos,
            None => node.subscribers.push(Subscriber { pipe_id, qos }),
        }
    }

    /// Collect all subscribers whose filter matches the concrete `topic`.
    ///
    /// Topics whose first level starts with `$` are only reachable through
    /// an identical literal root level [MQTT-4.7.2-1].
    #[must_use]
    pub fn search(&self, topic: &str) -> Vec<Subscriber> {
        let parts: Vec<&str> = topic.split('/').collect();
        let mut result = Vec::new();
        let reserved = parts[0].starts_with('$');
        Self::search_node(&self.root, &parts, 0, reserved, &mut result);
        result
    }

    fn search_node(
        node: &Node,
        parts: &[&str],
        index: usize,
        reserved_root: bool,
        result: &mut Vec<Subscriber>,
    ) {
        if index == parts.len() {
            result.extend_from_slice(&node.subscribers);
            // "sport/#" also matches "sport" itself [MQTT-4.7.1-2].
            if let Some(child) = node.children.get(MULTI_WILDCARD) {
                result.extend_from_slice(&child.subscribers);
            }
            return;
        }

        let part = parts[index];
        if let Some(child) = node.children.get(part) {
            Self::search_node(child, parts, index + 1, false, result);
        }

        // Wildcards never match a `$` level at the topic root.
        if index == 0 && reserved_root {
            return;
        }
        if !part.is_empty() {
            if let Some(child) = node.children.get(SINGLE_WILDCARD) {
                Self::search_node(child, parts, index + 1, false, result);
            }
        }
        if let Some(child) = node.children.get(MULTI_WILDCARD) {
            result.extend_from_slice(&child.subscribers);
        }
    }

    /// Remove the subscription of `pipe_id` on `filter`, pruning nodes left
    /// without subscribers and children.
    ///
    /// Returns the removed entry so the caller can release its resources.
    pub fn delete(&mut self, filter: &TopicFilter, pipe_id: PipeId) -> Option<Subscriber> {
        Self::delete_node(&mut self.root, filter.levels(), pipe_id)
    }

    fn delete_node(
        node: &mut Node,
        levels: &[TopicLevel],
        pipe_id: PipeId,
    ) -> Option<Subscriber> {
        let Some((level, rest)) = levels.split_first() else {
            let index = node
                .subscribers
                .iter()
                .position(|sub| sub.pipe_id == pipe_id)?;
            return Some(node.subscribers.remove(index));
        };

        let key = level_key(level);
        let child = node.children.get_mut(key)?;
        let removed = Self::delete_node(child, rest, pipe_id);
        if child.is_unused() {
            node.children.remove(key);
        }
        removed
    }

    /// Whether any node still references `pipe_id`. Teardown leaves no
    /// orphan entries behind; checked in tests.
    #[must_use]
    pub fn contains_pipe(&self, pipe_id: PipeId) -> bool {
        fn walk(node: &Node, pipe_id: PipeId) -> bool {
            node.subscribers.iter().any(|sub| sub.pipe_id == pipe_id)
                || node.children.values().any(|child| walk(child, pipe_id))
        }
        walk(&self.root, pipe_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_unused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(s: &str) -> TopicFilter {
        TopicFilter::parse(s).unwrap()
    }

    #[test]
    fn test_literal_match() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("sensors/room1/temp"), 1, QoS::AtMostOnce);

        assert_eq!(trie.search("sensors/room1/temp").len(), 1);
        assert!(trie.search("sensors/room1/hum").is_empty());
        assert!(trie.search("sensors/room1").is_empty());
    }

    #[test]
    fn test_wildcard_match() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("sensors/+/temp"), 1, QoS::AtLeastOnce);
        trie.insert(&filter("sensors/#"), 2, QoS::AtMostOnce);
        trie.insert(&filter("#"), 3, QoS::AtMostOnce);

        let subs = trie.search("sensors/room1/temp");
        let pipes: Vec<PipeId> = subs.iter().map(|s| s.pipe_id).collect();
        assert_eq!(pipes, vec![1, 2, 3]);

        // `#` includes the parent level itself.
        let subs = trie.search("sensors");
        let pipes: Vec<PipeId> = subs.iter().map(|s| s.pipe_id).collect();
        assert_eq!(pipes, vec![2, 3]);
    }

    #[test]
    fn test_reserved_topics() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("#"), 1, QoS::AtMostOnce);
        trie.insert(&filter("+/foo"), 2, QoS::AtMostOnce);
        trie.insert(&filter("$SYS/#"), 3, QoS::AtMostOnce);

        assert!(trie.search("$SYS/foo").iter().all(|s| s.pipe_id == 3));
        assert_eq!(trie.search("$SYS/foo").len(), 1);
        assert_eq!(trie.search("bar/foo").len(), 2);
    }

    #[test]
    fn test_duplicate_replaced() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("a/b"), 1, QoS::AtMostOnce);
        trie.insert(&filter("a/b"), 1, QoS::ExactOnce);

        let subs = trie.search("a/b");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].qos, QoS::ExactOnce);
    }

    #[test]
    fn test_delete_prunes() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("a/b/c"), 1, QoS::AtMostOnce);
        trie.insert(&filter("a/b"), 2, QoS::AtLeastOnce);

        let removed = trie.delete(&filter("a/b/c"), 1).unwrap();
        assert_eq!(removed.qos, QoS::AtMostOnce);
        assert!(trie.search("a/b/c").is_empty());
        // Still-used ancestor survives the pruning.
        assert_eq!(trie.search("a/b").len(), 1);

        let _removed = trie.delete(&filter("a/b"), 2);
        assert!(trie.is_empty());
    }

    #[test]
    fn test_delete_missing() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("a/b"), 1, QoS::AtMostOnce);
        assert!(trie.delete(&filter("a/b"), 9).is_none());
        assert!(trie.delete(&filter("x/y"), 1).is_none());
        assert_eq!(trie.search("a/b").len(), 1);
    }

    #[test]
    fn test_subscribe_unsubscribe_round_trip() {
        let mut trie = SubTrie::new();
        for f in ["a/+/c", "a/#", "x", "+"] {
            trie.insert(&filter(f), 7, QoS::AtLeastOnce);
        }
        for f in ["a/+/c", "a/#", "x", "+"] {
            assert!(trie.delete(&filter(f), 7).is_some());
        }
        assert!(trie.is_empty());
        assert!(!trie.contains_pipe(7));
    }

    #[test]
    fn test_empty_level_topics() {
        let mut trie = SubTrie::new();
        trie.insert(&filter("a//b"), 1, QoS::AtMostOnce);
        trie.insert(&filter("a/+/b"), 2, QoS::AtMostOnce);

        // `+` requires a non-empty level.
        let subs = trie.search("a//b");
        let pipes: Vec<PipeId> = subs.iter().map(|s| s.pipe_id).collect();
        assert_eq!(pipes, vec![1]);
    }
}
