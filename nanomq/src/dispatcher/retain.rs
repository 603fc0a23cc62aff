// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Retained-message store.
//!
//! Keyed by exact topic (no wildcards in keys), held in a second trie so a
//! wildcard SUBSCRIBE can enumerate every matching retained message. An
//! empty payload acts as a tombstone and removes the entry
//! [MQTT-3.3.1-10].

use codec::v3::PublishPacket;
use codec::{TopicFilter, TopicLevel};
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct RetainedMessage {
    packet: PublishPacket,
    stored_at: SystemTime,
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<String, Node>,
    message: Option<RetainedMessage>,
}

impl Node {
    fn is_unused(&self) -> bool {
        self.children.is_empty() && self.message.is_none()
    }
}

/// Trie from concrete topics to their last retained message.
#[derive(Debug, Default)]
pub struct RetainTrie {
    root: Node,
}

impl RetainTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `packet` as the retained message of its topic. At most one
    /// message is kept per topic; an empty payload removes the entry.
    pub fn insert(&mut self, packet: &PublishPacket) {
        if packet.payload().is_empty() {
            self.remove(packet.topic());
            return;
        }

        let mut node = &mut self.root;
        for part in packet.topic().split('/') {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.message = Some(RetainedMessage {
            packet: packet.clone(),
            stored_at: SystemTime::now(),
        });
    }

    /// Drop the retained message of `topic`, pruning empty nodes.
    pub fn remove(&mut self, topic: &str) {
        let parts: Vec<&str> = topic.split('/').collect();
        Self::remove_node(&mut self.root, &parts);
    }

    fn remove_node(node: &mut Node, parts: &[&str]) {
        let Some((part, rest)) = parts.split_first() else {
            node.message = None;
            return;
        };
        if let Some(child) = node.children.get_mut(*part) {
            Self::remove_node(child, rest);
            if child.is_unused() {
                node.children.remove(*part);
            }
        }
    }

    /// Collect all retained messages whose topic matches `filter`, in
    /// deterministic trie order.
    #[must_use]
    pub fn search(&self, filter: &TopicFilter) -> Vec<PublishPacket> {
        let mut result = Vec::new();
        Self::search_node(&self.root, filter.levels(), true, &mut result);
        result
    }

    fn search_node(
        node: &Node,
        levels: &[TopicLevel],
        at_root: bool,
        result: &mut Vec<PublishPacket>,
    ) {
        let Some((level, rest)) = levels.split_first() else {
            if let Some(message) = &node.message {
                result.push(message.packet.clone());
            }
            return;
        };

        match level {
            TopicLevel::Literal(literal) => {
                if let Some(child) = node.children.get(literal) {
                    Self::search_node(child, rest, false, result);
                }
            }
            TopicLevel::Single => {
                for (key, child) in &node.children {
                    // Wildcards skip `$` topics at the root [MQTT-4.7.2-1]
                    // and `+` never matches an empty level.
                    if (at_root && key.starts_with('$')) || key.is_empty() {
                        continue;
                    }
                    Self::search_node(child, rest, false, result);
                }
            }
            TopicLevel::Multi => {
                if let Some(message) = &node.message {
                    // "sport/#" also matches the retained message on
                    // "sport" itself.
                    if !at_root {
                        result.push(message.packet.clone());
                    }
                }
                for (key, child) in &node.children {
                    if at_root && key.starts_with('$') {
                        continue;
                    }
                    Self::collect_subtree(child, result);
                }
            }
        }
    }

    fn collect_subtree(node: &Node, result: &mut Vec<PublishPacket>) {
        if let Some(message) = &node.message {
            result.push(message.packet.clone());
        }
        for child in node.children.values() {
            Self::collect_subtree(child, result);
        }
    }

    /// Age of the retained message on `topic`, if any.
    #[must_use]
    pub fn stored_at(&self, topic: &str) -> Option<SystemTime> {
        let mut node = &self.root;
        for part in topic.split('/') {
            node = node.children.get(part)?;
        }
        node.message.as_ref().map(|m| m.stored_at)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_unused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;

    fn packet(topic: &str, payload: &[u8]) -> PublishPacket {
        let mut packet = PublishPacket::new(topic, QoS::AtLeastOnce, payload).unwrap();
        packet.set_retain(true);
        packet
    }

    fn filter(s: &str) -> TopicFilter {
        TopicFilter::parse(s).unwrap()
    }

    #[test]
    fn test_insert_and_search() {
        let mut trie = RetainTrie::new();
        trie.insert(&packet("status/device7", b"online"));
        trie.insert(&packet("status/device9", b"offline"));

        let matches = trie.search(&filter("status/#"));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].payload(), b"online");

        let matches = trie.search(&filter("status/device7"));
        assert_eq!(matches.len(), 1);

        let matches = trie.search(&filter("status/+"));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_replace() {
        let mut trie = RetainTrie::new();
        trie.insert(&packet("a/b", b"one"));
        trie.insert(&packet("a/b", b"two"));

        let matches = trie.search(&filter("a/b"));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].payload(), b"two");
    }

    #[test]
    fn test_tombstone() {
        let mut trie = RetainTrie::new();
        trie.insert(&packet("status/device7", b"online"));
        trie.insert(&packet("status/device7", b""));

        assert!(trie.search(&filter("status/#")).is_empty());
        assert!(trie.is_empty());
    }

    #[test]
    fn test_reserved_topics_hidden_from_wildcards() {
        let mut trie = RetainTrie::new();
        trie.insert(&packet("$SYS/uptime", b"42"));
        trie.insert(&packet("normal/topic", b"x"));

        assert!(trie.search(&filter("#")).len() == 1);
        assert!(trie.search(&filter("+/uptime")).is_empty());
        assert_eq!(trie.search(&filter("$SYS/uptime")).len(), 1);
        assert_eq!(trie.search(&filter("$SYS/#")).len(), 1);
    }

    #[test]
    fn test_multi_matches_parent() {
        let mut trie = RetainTrie::new();
        trie.insert(&packet("sport", b"ball"));
        trie.insert(&packet("sport/tennis", b"racket"));

        let matches = trie.search(&filter("sport/#"));
        assert_eq!(matches.len(), 2);
    }
}
