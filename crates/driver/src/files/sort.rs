//! Listing order.

use std::cmp::Ordering;

use protocol::{FileNode, SortKey};

/// Compare two nodes under `key`.
///
/// Dirs-first keys put directories before everything else, kind keys then
/// compare MIME types, size keys compare sizes. Every key falls back to the
/// name (bytewise) and finally the hash, so distinct nodes never compare
/// equal.
pub fn compare(a: &FileNode, b: &FileNode, key: SortKey) -> Ordering {
    let mut order = Ordering::Equal;
    if key.dirs_first() {
        order = b.is_dir().cmp(&a.is_dir());
    }
    if key.by_kind() {
        order = order.then_with(|| a.mime.cmp(&b.mime));
    }
    if key.by_size() {
        order = order.then_with(|| a.size.cmp(&b.size));
    }
    order
        .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
        .then_with(|| a.hash.cmp(&b.hash))
}

/// Sort nodes in place. Stable.
pub fn sort_nodes(nodes: &mut [FileNode], key: SortKey) {
    nodes.sort_by(|a, b| compare(a, b, key));
}
