//! Collections: a name bound to its own B+-tree root, looked up through the
//! meta tree that lives at [`pager::META_ROOT`](crate::storage::pager::META_ROOT).
//!
//! No direct teacher file covers this — `cryo` has no notion of a named,
//! independently rooted sub-tree — so this module is new code written in
//! the teacher's idiom (thin struct wrapping borrowed pager access, methods
//! returning the crate's layered error types) to satisfy spec.md §4.5.

use log::debug;

use crate::document;
use crate::error::{BtreeError, CollectionError};
use crate::storage::btree;
use crate::storage::page::PageNo;
use crate::storage::pager::{Pager, META_ROOT};

/// A handle to one collection's root page. Cheap to copy; all actual state
/// lives in the shared [`Pager`].
#[derive(Debug, Clone, Copy)]
pub struct Collection {
    root: PageNo,
}

impl Collection {
    /// Looks up an existing collection by name via the meta tree.
    pub fn open(pager: &mut Pager, name: &str) -> Result<Self, CollectionError> {
        match btree::find(pager, META_ROOT, name.as_bytes())? {
            Some(cursor) => {
                let root = cursor.value(pager)?;
                Ok(Collection { root })
            }
            None => Err(CollectionError::NotFound(name.to_string())),
        }
    }

    /// Looks up a collection by name, creating a fresh one (and registering
    /// it in the meta tree) if it doesn't exist yet.
    pub fn open_or_create(pager: &mut Pager, name: &str) -> Result<Self, CollectionError> {
        match Self::open(pager, name) {
            Ok(collection) => Ok(collection),
            Err(CollectionError::NotFound(_)) => {
                debug!("creating new collection {name:?}");
                let root = pager.allocate_node(true)?;
                btree::insert(pager, META_ROOT, name.as_bytes(), root)?;
                Ok(Collection { root })
            }
            Err(e) => Err(e),
        }
    }

    pub fn root(&self) -> PageNo {
        self.root
    }

    /// Inserts `doc` keyed by the 12-byte `_id` it carries. A document
    /// whose `_id` already exists in this collection is a silent no-op,
    /// matching the underlying tree's idempotent-insert behaviour (spec.md
    /// §4.4, no update/delete in scope).
    pub fn insert(&self, pager: &mut Pager, doc: &[u8]) -> Result<(), CollectionError> {
        let id = document::extract_id(doc)?;
        let head = crate::storage::datastore::write(pager, doc).map_err(BtreeError::from)?;
        btree::insert(pager, self.root, &id, head)?;
        Ok(())
    }

    /// Finds a document by its 12-byte `_id`, returning its trimmed body.
    pub fn find(
        &self,
        pager: &mut Pager,
        id: &[u8; document::ID_LEN],
    ) -> Result<Option<Vec<u8>>, CollectionError> {
        let Some(cursor) = btree::find(pager, self.root, id)? else {
            return Ok(None);
        };
        let head = cursor.value(pager)?;
        let raw = crate::storage::datastore::read(pager, head).map_err(BtreeError::from)?;
        let doc = document::trim_to_declared_len(&raw)?;
        Ok(Some(doc.to_vec()))
    }

    /// Iterates every document in `_id` order.
    pub fn iter<'p>(&self, pager: &'p mut Pager) -> Result<CollectionIter<'p>, CollectionError> {
        let cursor = btree::first(pager, self.root)?;
        Ok(CollectionIter {
            pager,
            cursor: Some(cursor),
            started: false,
        })
    }
}

/// Ascending-`_id` iterator over a collection's documents.
pub struct CollectionIter<'p> {
    pager: &'p mut Pager,
    cursor: Option<btree::Cursor>,
    started: bool,
}

impl<'p> Iterator for CollectionIter<'p> {
    type Item = Result<Vec<u8>, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;

        if self.started {
            match cursor.next(self.pager) {
                Ok(true) => {}
                Ok(false) => {
                    self.cursor = None;
                    return None;
                }
                Err(e) => {
                    self.cursor = None;
                    return Some(Err(e.into()));
                }
            }
        }
        self.started = true;

        let head = match cursor.value(self.pager) {
            Ok(v) => v,
            Err(e) => {
                self.cursor = None;
                return Some(Err(e.into()));
            }
        };
        if head == 0 {
            self.cursor = None;
            return None;
        }

        let raw = match crate::storage::datastore::read(self.pager, head) {
            Ok(r) => r,
            Err(e) => return Some(Err(BtreeError::from(e).into())),
        };
        match document::trim_to_declared_len(&raw) {
            Ok(doc) => Some(Ok(doc.to_vec())),
            Err(e) => Some(Err(e.into())),
        }
    }
}
