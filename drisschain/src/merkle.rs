// Copyright (c) 2024 The Drisschain Developers

//! Pairwise-sorted Merkle tree.
//!
//! Leaves are the SHA-256 of each item. An odd level (other than the root) is
//! padded by repeating its last node, and each pair is combined as
//! `SHA256(smaller || larger)` where the two child hashes are ordered by their
//! numeric value rather than by position. Empty input yields a single node
//! holding `SHA256("0")`.

use crate::crypto::{cmp_hex_numeric, sha256_hex};
use std::cmp::Ordering;

/// A node of the Merkle tree. Leaves have no children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    pub value: String,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(value: String) -> Self {
        Self {
            value,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none()
    }
}

/// Build the tree over `items` in order.
pub fn build_merkle_tree<S: AsRef<str>>(items: &[S]) -> MerkleNode {
    if items.is_empty() {
        return MerkleNode::leaf(sha256_hex("0"));
    }

    let mut level: Vec<MerkleNode> = items
        .iter()
        .map(|item| MerkleNode::leaf(sha256_hex(item.as_ref())))
        .collect();

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }

        let mut next = Vec::with_capacity(level.len() / 2);
        let mut nodes = level.into_iter();
        while let (Some(a), Some(b)) = (nodes.next(), nodes.next()) {
            let (smaller, larger) = match cmp_hex_numeric(&a.value, &b.value) {
                Ordering::Less => (a, b),
                _ => (b, a),
            };
            next.push(MerkleNode {
                value: sha256_hex(format!("{}{}", smaller.value, larger.value)),
                left: Some(Box::new(smaller)),
                right: Some(Box::new(larger)),
            });
        }
        level = next;
    }

    level.remove(0)
}

/// Root hash over `items`.
pub fn merkle_root<S: AsRef<str>>(items: &[S]) -> String {
    build_merkle_tree(items).value
}

/// Depth-first search for `target`.
///
/// Returns the sibling hashes from the root down to the match, followed by
/// `target` itself; empty when `target` is not in the tree. The smaller
/// (left) subtree is searched first.
pub fn get_merkle_path(node: &MerkleNode, target: &str) -> Vec<String> {
    let mut path = Vec::new();
    if find_path(node, target, &mut path) {
        path
    } else {
        Vec::new()
    }
}

fn find_path(node: &MerkleNode, target: &str, path: &mut Vec<String>) -> bool {
    if node.value == target {
        path.push(target.to_string());
        return true;
    }
    if node.is_leaf() {
        return false;
    }

    let (Some(left), Some(right)) = (node.left.as_deref(), node.right.as_deref()) else {
        return false;
    };

    path.push(right.value.clone());
    if find_path(left, target, path) {
        return true;
    }
    path.pop();

    path.push(left.value.clone());
    if find_path(right, target, path) {
        return true;
    }
    path.pop();

    false
}

/// Fold the given leaf hashes left to right with the ascending-order rule and
/// compare the result with `root`.
///
/// This recomputes from the whole leaf list; it is not a logarithmic proof.
/// An empty list never verifies.
pub fn verify_merkle_proof<S: AsRef<str>>(leaves: &[S], root: &str) -> bool {
    let Some((first, rest)) = leaves.split_first() else {
        return false;
    };

    let folded = rest.iter().fold(first.as_ref().to_string(), |acc, leaf| {
        let leaf = leaf.as_ref();
        match cmp_hex_numeric(&acc, leaf) {
            Ordering::Less => sha256_hex(format!("{acc}{leaf}")),
            _ => sha256_hex(format!("{leaf}{acc}")),
        }
    });

    folded == root
}
