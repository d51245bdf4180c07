//! Binary prefix index over banned addresses.
//!
//! A bit-trie keyed by the canonical byte form of an address (4 octets for
//! v4, 16 for v6), walked MSB-first. Lookups are bounded by the address bit
//! length (32 or 128), never hash a string, and allocate nothing.
//!
//! Delete clears the terminal `banned` flag without pruning the structure;
//! a re-ban of the same address reuses the existing path.

use std::net::IpAddr;

/// A node of the prefix index.
#[derive(Debug, Default)]
struct Node {
    /// Children for bit 0 and bit 1.
    children: [Option<Box<Node>>; 2],
    /// Marks the end of a complete address.
    terminal: bool,
    /// Ephemeral ban flag; cleared on delete, never persisted.
    banned: bool,
    /// Canonical textual form, stored at the terminal.
    address: String,
}

/// Bit-trie membership index for banned addresses.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    root: Node,
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an address and mark it banned. Malformed input is a no-op.
    pub fn insert(&mut self, addr: &str) {
        let Some(bytes) = address_bytes(addr) else {
            return;
        };

        let mut node = &mut self.root;
        for byte in bytes {
            for i in (0..8).rev() {
                let bit = ((byte >> i) & 1) as usize;
                node = node.children[bit].get_or_insert_with(Box::default);
            }
        }
        node.terminal = true;
        node.banned = true;
        node.address = addr.to_string();
    }

    /// Return whether the address is present with its ban flag set.
    /// Malformed input returns false.
    pub fn search(&self, addr: &str) -> bool {
        let Some(bytes) = address_bytes(addr) else {
            return false;
        };

        let mut node = &self.root;
        for byte in bytes {
            for i in (0..8).rev() {
                let bit = ((byte >> i) & 1) as usize;
                match node.children[bit].as_deref() {
                    Some(child) => node = child,
                    None => return false,
                }
            }
        }
        node.terminal && node.banned
    }

    /// Clear the ban flag for an address. The path is not pruned.
    /// Malformed or absent input is a no-op.
    pub fn delete(&mut self, addr: &str) {
        let Some(bytes) = address_bytes(addr) else {
            return;
        };

        let mut node = &mut self.root;
        for byte in bytes {
            for i in (0..8).rev() {
                let bit = ((byte >> i) & 1) as usize;
                match node.children[bit].as_deref_mut() {
                    Some(child) => node = child,
                    None => return,
                }
            }
        }
        if node.terminal {
            node.banned = false;
        }
    }

    /// Depth-first count of all nodes, including the root.
    pub fn node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            1 + node
                .children
                .iter()
                .flatten()
                .map(|child| count(child))
                .sum::<usize>()
        }
        count(&self.root)
    }
}

/// Canonical byte form of an address: 4 octets for v4, 16 for v6.
fn address_bytes(addr: &str) -> Option<Vec<u8>> {
    match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(v4.octets().to_vec()),
        IpAddr::V6(v6) => Some(v6.octets().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_search() {
        let mut index = PrefixIndex::new();
        let addrs = ["192.168.1.1", "10.0.0.1", "172.16.0.1", "::1", "2001:db8::1"];

        for addr in addrs {
            index.insert(addr);
            assert!(index.search(addr), "{addr} should be found after insert");
        }

        assert!(!index.search("8.8.8.8"));
    }

    #[test]
    fn delete_clears_ban_flag() {
        let mut index = PrefixIndex::new();
        index.insert("192.168.1.1");
        assert!(index.search("192.168.1.1"));

        index.delete("192.168.1.1");
        assert!(!index.search("192.168.1.1"));

        // Re-inserting reuses the retained path.
        index.insert("192.168.1.1");
        assert!(index.search("192.168.1.1"));
    }

    #[test]
    fn malformed_addresses_are_noops() {
        let mut index = PrefixIndex::new();
        index.insert("invalid.ip");
        assert!(!index.search("invalid.ip"));
        index.delete("invalid.ip"); // must not panic
        assert!(!index.search(""));
    }

    #[test]
    fn prefix_is_not_a_member() {
        let mut index = PrefixIndex::new();
        index.insert("192.168.1.1");
        // A different address sharing a long prefix must not match.
        assert!(!index.search("192.168.1.0"));
        assert!(!index.search("192.168.1.3"));
    }

    #[test]
    fn v4_and_v6_coexist() {
        let mut index = PrefixIndex::new();
        index.insert("1.2.3.4");
        index.insert("2001:db8::42");
        assert!(index.search("1.2.3.4"));
        assert!(index.search("2001:db8::42"));
        index.delete("1.2.3.4");
        assert!(!index.search("1.2.3.4"));
        assert!(index.search("2001:db8::42"));
    }

    #[test]
    fn node_count_grows_with_inserts() {
        let mut index = PrefixIndex::new();
        let empty = index.node_count();
        assert_eq!(empty, 1); // root only

        index.insert("1.2.3.4");
        let one = index.node_count();
        assert_eq!(one, 1 + 32); // root + one bit-path of 32

        // Deleting does not prune.
        index.delete("1.2.3.4");
        assert_eq!(index.node_count(), one);
    }
}
