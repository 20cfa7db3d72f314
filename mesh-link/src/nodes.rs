use std::collections::HashMap;

use crate::proto::{NodeInfo, User};

/// What the device has told us about a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeEntry {
    pub num: u32,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

impl NodeEntry {
    fn apply_user(&mut self, user: &User) {
        self.long_name = non_empty(&user.long_name);
        self.short_name = non_empty(&user.short_name);
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Node registry keyed by node number.
#[derive(Debug, Clone, Default)]
pub struct NodeDb {
    nodes: HashMap<u32, NodeEntry>,
}

impl NodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, num: u32) -> Option<&NodeEntry> {
        self.nodes.get(&num)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record a `node_info` entry from the config dump.
    pub fn update_from_node_info(&mut self, info: &NodeInfo) {
        let entry = self.nodes.entry(info.num).or_insert_with(|| NodeEntry {
            num: info.num,
            ..NodeEntry::default()
        });
        if let Some(user) = &info.user {
            entry.apply_user(user);
        }
    }

    /// Record a `User` broadcast received on the node info port.
    pub fn update_user(&mut self, num: u32, user: &User) {
        self.nodes
            .entry(num)
            .or_insert_with(|| NodeEntry {
                num,
                ..NodeEntry::default()
            })
            .apply_user(user);
    }
}
