//! The B+-tree itself: descent, lookup, insert (with node splitting) and
//! the ordered cursor.
//!
//! Operates on a `root: PageNo` rather than owning a tree of its own, since
//! one [`Pager`](super::pager::Pager) hosts many independent trees (the
//! meta tree at page 1, plus one per collection) and a collection's root
//! page never changes once allocated (spec.md §3).
//!
//! The physical layout (slot array, comparator, non-root split moving the
//! smaller half to a new left sibling, root split growing the tree by one
//! level) follows spec.md §4.3 and `original_source/Sakha/btree.c`
//! directly. The routing convention for internal nodes — slot `i`'s `no` is
//! the child to its left, `right` is the rightmost child — resolves a
//! genuine inconsistency between spec.md §3 and one reading of §4.3.2; see
//! DESIGN.md's Open Question decisions.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::error::BtreeError;
use crate::storage::page::{check_key_size, fits, key_cmp, lower_bound, upper_bound, PageNo};
use crate::storage::pager::Pager;

#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    leaf: PageNo,
    pos: usize,
}

impl Cursor {
    pub fn value(&self, pager: &mut Pager) -> Result<PageNo, BtreeError> {
        Ok(pager.with_node(self.leaf, false, |n| n.slot(self.pos).no)?)
    }

    pub fn key(&self, pager: &mut Pager) -> Result<Vec<u8>, BtreeError> {
        Ok(pager.with_node(self.leaf, false, |n| n.key_at(self.pos).to_vec())?)
    }

    /// Advances to the next key in ascending order. Returns `false` once
    /// the end of the collection is reached.
    pub fn next(&mut self, pager: &mut Pager) -> Result<bool, BtreeError> {
        let (nslots, right) =
            pager.with_node(self.leaf, false, |n| (n.nslots() as usize, n.right()))?;
        if self.pos + 1 < nslots {
            self.pos += 1;
            return Ok(true);
        }

        let mut next_leaf = right;
        while next_leaf != 0 {
            let (nslots, right) =
                pager.with_node(next_leaf, false, |n| (n.nslots() as usize, n.right()))?;
            if nslots > 0 {
                self.leaf = next_leaf;
                self.pos = 0;
                return Ok(true);
            }
            next_leaf = right;
        }
        Ok(false)
    }
}

/// Positions a cursor at the smallest key in the tree rooted at `root`.
pub fn first(pager: &mut Pager, root: PageNo) -> Result<Cursor, BtreeError> {
    let mut current = root;
    loop {
        let (is_leaf, nslots, child0, right) = pager.with_node(current, false, |n| {
            let nslots = n.nslots() as usize;
            let child0 = if nslots > 0 { n.slot(0).no } else { 0 };
            (n.is_leaf(), nslots, child0, n.right())
        })?;
        if is_leaf {
            return Ok(Cursor { leaf: current, pos: 0 });
        }
        current = if nslots > 0 { child0 } else { right };
    }
}

/// Looks up an exact key, returning a cursor positioned on it if found.
pub fn find(pager: &mut Pager, root: PageNo, key: &[u8]) -> Result<Option<Cursor>, BtreeError> {
    let frames = descend(pager, root, key)?;
    let (leaf, pos) = *frames.last().expect("descend always yields a leaf frame");
    let entries = pager.with_node(leaf, false, |n| n.entries())?;
    if pos < entries.len() && key_cmp(&entries[pos].0, key) == Ordering::Equal {
        Ok(Some(Cursor { leaf, pos }))
    } else {
        Ok(None)
    }
}

/// Inserts `(key, value)`. A key already present is a silent no-op
/// (spec.md §4.3.4's idempotent-insert property).
pub fn insert(pager: &mut Pager, root: PageNo, key: &[u8], value: PageNo) -> Result<(), BtreeError> {
    debug!("inserting into tree rooted at {root}");
    let frames = descend(pager, root, key)?;
    let (leaf_no, pos) = *frames.last().expect("descend always yields a leaf frame");

    let (mut entries, leaf_right) = pager.with_node(leaf_no, false, |n| (n.entries(), n.right()))?;
    if pos < entries.len() && key_cmp(&entries[pos].0, key) == Ordering::Equal {
        trace!("key already present in leaf {leaf_no}, insert is a no-op");
        return Ok(());
    }
    check_key_size(pager.node_region_len(leaf_no), key)?;
    entries.insert(pos, (key.to_vec(), value));

    let mut level = frames.len() - 1;
    let mut is_leaf = true;
    let mut entries = entries;
    let mut right = leaf_right;

    loop {
        let page_no = frames[level].0;
        let region_len = pager.node_region_len(page_no);
        let entry_refs: Vec<(&[u8], PageNo)> =
            entries.iter().map(|(k, v)| (k.as_slice(), *v)).collect();

        if fits(region_len, &entry_refs) {
            pager.with_node(page_no, true, |n| n.write_node(is_leaf, &entry_refs, right))?;
            return Ok(());
        }

        if level == 0 {
            debug!("page {page_no} full at root, splitting root");
            split_root(pager, page_no, is_leaf, entries, right)?;
            return Ok(());
        }

        debug!("page {page_no} full, splitting non-root node");
        let (promoted_key, new_left_no) = split_non_root(pager, page_no, is_leaf, entries, right)?;

        level -= 1;
        let parent_no = frames[level].0;
        let parent_pos = frames[level].1;
        let (mut parent_entries, parent_right) =
            pager.with_node(parent_no, false, |n| (n.entries(), n.right()))?;
        parent_entries.insert(parent_pos, (promoted_key, new_left_no));

        entries = parent_entries;
        right = parent_right;
        is_leaf = false;
    }
}

/// Builds the breadcrumb stack for `key`: one `(page, child_index)` frame
/// per level descended, the last frame naming the leaf and the position
/// within it where `key` belongs (spec.md §4.3.2).
fn descend(pager: &mut Pager, root: PageNo, key: &[u8]) -> Result<Vec<(PageNo, usize)>, BtreeError> {
    let mut frames = Vec::new();
    let mut current = root;
    loop {
        let (is_leaf, entries, right) =
            pager.with_node(current, false, |n| (n.is_leaf(), n.entries(), n.right()))?;
        let keys: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();

        if is_leaf {
            trace!("descend reached leaf {current}");
            frames.push((current, lower_bound(&keys, key)));
            return Ok(frames);
        }

        let pos = upper_bound(&keys, key);
        frames.push((current, pos));
        current = if pos < entries.len() { entries[pos].1 } else { right };
        trace!("descend continuing into child {current}");
    }
}

/// Splits an oversized non-root node. The smaller half moves to a newly
/// allocated left sibling; `page_no` keeps the larger half and its page
/// number (ancestors already point at it, so nothing above needs fixing up
/// beyond inserting the new separator). Returns the promoted separator key
/// and the new left page.
fn split_non_root(
    pager: &mut Pager,
    page_no: PageNo,
    is_leaf: bool,
    entries: Vec<(Vec<u8>, PageNo)>,
    right: PageNo,
) -> Result<(Vec<u8>, PageNo), BtreeError> {
    let mid = entries.len() / 2;

    if is_leaf {
        let (left, right_half) = entries.split_at(mid);
        let separator = left.last().expect("non-empty left half").0.clone();
        let new_left_no = pager.allocate_node(true)?;

        let left_refs: Vec<(&[u8], PageNo)> = left.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(new_left_no, true, |n| n.write_node(true, &left_refs, page_no))?;

        let right_refs: Vec<(&[u8], PageNo)> =
            right_half.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(page_no, true, |n| n.write_node(true, &right_refs, right))?;

        debug!("split leaf {page_no}: new left sibling {new_left_no}");
        Ok((separator, new_left_no))
    } else {
        let separator = entries[mid].0.clone();
        let median_child = entries[mid].1;
        let left = &entries[..mid];
        let right_half = &entries[mid + 1..];
        let new_left_no = pager.allocate_node(false)?;

        let left_refs: Vec<(&[u8], PageNo)> = left.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(new_left_no, true, |n| n.write_node(false, &left_refs, median_child))?;

        let right_refs: Vec<(&[u8], PageNo)> =
            right_half.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(page_no, true, |n| n.write_node(false, &right_refs, right))?;

        debug!("split internal node {page_no}: new left sibling {new_left_no}");
        Ok((separator, new_left_no))
    }
}

/// Splits a full root into two brand-new child pages, leaving the root's
/// page number fixed but rewritten as a one-slot internal node (spec.md
/// §4.3.7).
fn split_root(
    pager: &mut Pager,
    root_no: PageNo,
    is_leaf: bool,
    entries: Vec<(Vec<u8>, PageNo)>,
    right: PageNo,
) -> Result<(), BtreeError> {
    let mid = entries.len() / 2;

    let (separator, left_no, right_no) = if is_leaf {
        let (left, right_half) = entries.split_at(mid);
        let separator = left.last().expect("non-empty left half").0.clone();

        let left_no = pager.allocate_node(true)?;
        let right_no = pager.allocate_node(true)?;

        let left_refs: Vec<(&[u8], PageNo)> = left.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(left_no, true, |n| n.write_node(true, &left_refs, right_no))?;

        let right_refs: Vec<(&[u8], PageNo)> =
            right_half.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(right_no, true, |n| n.write_node(true, &right_refs, right))?;

        (separator, left_no, right_no)
    } else {
        let separator = entries[mid].0.clone();
        let median_child = entries[mid].1;
        let left = &entries[..mid];
        let right_half = &entries[mid + 1..];

        let left_no = pager.allocate_node(false)?;
        let right_no = pager.allocate_node(false)?;

        let left_refs: Vec<(&[u8], PageNo)> = left.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(left_no, true, |n| n.write_node(false, &left_refs, median_child))?;

        let right_refs: Vec<(&[u8], PageNo)> =
            right_half.iter().map(|(k, v)| (k.as_slice(), *v)).collect();
        pager.with_node(right_no, true, |n| n.write_node(false, &right_refs, right))?;

        (separator, left_no, right_no)
    };

    let root_entries: Vec<(&[u8], PageNo)> = vec![(separator.as_slice(), left_no)];
    pager.with_node(root_no, true, |n| n.write_node(false, &root_entries, right_no))?;
    debug!("root {root_no} split into new children {left_no} and {right_no}, tree grew by one level");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pager::META_ROOT;
    use tempdir::TempDir;

    fn scratch_pager() -> (TempDir, Pager) {
        let dir = TempDir::new("sakhadb-btree").unwrap();
        let pager = Pager::open(dir.path().join("data.db")).unwrap();
        (dir, pager)
    }

    fn collect_all(pager: &mut Pager, root: PageNo) -> Vec<(Vec<u8>, PageNo)> {
        let mut cursor = first(pager, root).unwrap();
        let mut out = Vec::new();
        let leaf_nslots = pager.with_node(cursor.leaf, false, |n| n.nslots()).unwrap();
        if leaf_nslots == 0 {
            return out;
        }
        loop {
            out.push((cursor.key(pager).unwrap(), cursor.value(pager).unwrap()));
            if !cursor.next(pager).unwrap() {
                break;
            }
        }
        out
    }

    #[test]
    fn insert_and_find_single_key() {
        let (_dir, mut pager) = scratch_pager();
        let root = pager.allocate_node(true).unwrap();
        insert(&mut pager, root, b"hello", 42).unwrap();

        let cursor = find(&mut pager, root, b"hello").unwrap().unwrap();
        assert_eq!(cursor.value(&mut pager).unwrap(), 42);
        assert!(find(&mut pager, root, b"missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let (_dir, mut pager) = scratch_pager();
        let root = pager.allocate_node(true).unwrap();
        insert(&mut pager, root, b"k", 1).unwrap();
        insert(&mut pager, root, b"k", 2).unwrap();

        let cursor = find(&mut pager, root, b"k").unwrap().unwrap();
        assert_eq!(cursor.value(&mut pager).unwrap(), 1);
    }

    #[test]
    fn many_keys_split_and_iterate_in_ascending_order() {
        let (_dir, mut pager) = scratch_pager();
        let root = pager.allocate_node(true).unwrap();

        let mut keys: Vec<u32> = (0..80).collect();
        // insert out of order to exercise both leaf and internal splits
        keys.sort_by_key(|k| (k * 37) % 80);
        for k in &keys {
            insert(&mut pager, root, &k.to_be_bytes(), *k).unwrap();
        }

        let collected = collect_all(&mut pager, root);
        assert_eq!(collected.len(), 80);
        for (i, (key, value)) in collected.iter().enumerate() {
            assert_eq!(*key, (i as u32).to_be_bytes().to_vec());
            assert_eq!(*value, i as u32);
        }
    }

    #[test]
    fn oversized_key_is_rejected() {
        let (_dir, mut pager) = scratch_pager();
        let root = pager.allocate_node(true).unwrap();
        let huge_key = vec![0u8; pager.node_region_len(root)];
        let err = insert(&mut pager, root, &huge_key, 1).unwrap_err();
        assert!(matches!(err, BtreeError::KeyTooLarge));
    }

    #[test]
    fn meta_root_uses_page_one() {
        assert_eq!(META_ROOT, 1);
    }
}
