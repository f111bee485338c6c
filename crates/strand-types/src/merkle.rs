//! Merkle commitment over active transfers.
//!
//! The channel state carries the root of a merkle tree whose leaves are the
//! initial-state hashes of all currently-active transfers, so the on-chain
//! dispute logic can verify membership of any single transfer. Leaves are
//! sorted before tree construction and sibling pairs are hashed in sorted
//! order, making the root independent of insertion order.

use alloy_primitives::{B256, keccak256};

use crate::transfer::Transfer;

/// Root over a set of leaf hashes. The empty set commits to the zero hash.
pub fn merkle_root(leaves: &[B256]) -> B256 {
    if leaves.is_empty() {
        return B256::ZERO;
    }
    let mut level: Vec<B256> = leaves.to_vec();
    level.sort();
    level.dedup();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [a, b] => next.push(hash_pair(*a, *b)),
                // Odd leaf is carried up unchanged.
                [a] => next.push(*a),
                _ => unreachable!("chunks(2) yields one or two items"),
            }
        }
        level = next;
    }
    level[0]
}

/// Root over the currently-active transfer set.
pub fn active_transfer_root(transfers: &[Transfer]) -> B256 {
    let leaves: Vec<B256> = transfers.iter().map(|t| t.initial_state_hash).collect();
    merkle_root(&leaves)
}

fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}
