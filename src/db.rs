//! Database lifetime: open a file, commit or roll back the in-flight
//! changes, close.
//!
//! Grounded on `cryo`'s `StorageBackend` open/close pairing, generalized
//! from its single on-disk table to the page-cache-backed commit/rollback
//! pair spec.md §5 calls for. Unlike `cryo`'s `Pager`, which flushes on
//! `Drop`, neither [`Pager`] nor [`Database::close`] syncs implicitly —
//! spec.md §4.6/§5 put the persistence boundary at an explicit commit, so a
//! close or crash before one loses whatever hasn't been synced.

use std::path::Path;

use log::info;

use crate::collection::{Collection, CollectionIter};
use crate::error::{CollectionError, Error, PagerError};
use crate::storage::pager::Pager;

pub struct Database {
    pager: Pager,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let pager = match Pager::open(path) {
            Ok(pager) => pager,
            Err(PagerError::Io(cause)) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    cause,
                })
            }
            Err(other) => return Err(Error::Pager(other)),
        };
        info!("opened database at {path:?}");
        Ok(Database { pager })
    }

    /// Fetches (or creates) the named collection.
    pub fn collection(&mut self, name: &str) -> Result<Collection, CollectionError> {
        Collection::open_or_create(&mut self.pager, name)
    }

    pub fn insert(&mut self, collection: &str, doc: &[u8]) -> Result<(), CollectionError> {
        let collection = self.collection(collection)?;
        collection.insert(&mut self.pager, doc)
    }

    pub fn find(
        &mut self,
        collection: &str,
        id: &[u8; crate::document::ID_LEN],
    ) -> Result<Option<Vec<u8>>, CollectionError> {
        let collection = Collection::open(&mut self.pager, collection)?;
        collection.find(&mut self.pager, id)
    }

    pub fn iter<'a>(&'a mut self, collection: &str) -> Result<CollectionIter<'a>, CollectionError> {
        let collection = Collection::open(&mut self.pager, collection)?;
        collection.iter(&mut self.pager)
    }

    /// Flushes every dirty page and the file header to disk.
    pub fn commit(&mut self) -> Result<(), PagerError> {
        self.pager.sync()
    }

    /// Discards unsynced changes. See DESIGN.md's Open Question decisions
    /// for why this is a plain cache discard rather than a WAL-style undo.
    pub fn rollback(&mut self) {
        self.pager.rollback();
    }

    /// Releases the underlying file handle without syncing. Any change not
    /// already committed via [`Database::commit`] is lost — spec.md §4.6/§5
    /// draw the persistence boundary at an explicit commit, not at close.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::encode_minimal_document;
    use tempdir::TempDir;

    fn scratch_path() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new("sakhadb-db").unwrap();
        let path = dir.path().join("data.db");
        (dir, path)
    }

    #[test]
    fn insert_and_find_survive_reopen() {
        let (_dir, path) = scratch_path();
        let id = [3u8; crate::document::ID_LEN];
        let doc = encode_minimal_document(id, b"hello");

        {
            let mut db = Database::open(&path).unwrap();
            db.insert("widgets", &doc).unwrap();
            db.commit().unwrap();
        }

        let mut db = Database::open(&path).unwrap();
        let found = db.find("widgets", &id).unwrap().unwrap();
        assert_eq!(found, doc);
    }

    #[test]
    fn rollback_discards_uncommitted_insert() {
        let (_dir, path) = scratch_path();
        let mut db = Database::open(&path).unwrap();
        db.commit().unwrap();

        let id = [4u8; crate::document::ID_LEN];
        db.insert("widgets", &encode_minimal_document(id, b"x"))
            .unwrap();
        db.rollback();

        let err = db.find("widgets", &id).unwrap_err();
        assert!(matches!(err, CollectionError::NotFound(_)));
    }

    #[test]
    fn close_without_commit_loses_the_insert() {
        let (_dir, path) = scratch_path();
        let id = [6u8; crate::document::ID_LEN];

        {
            let mut db = Database::open(&path).unwrap();
            db.insert("widgets", &encode_minimal_document(id, b"x"))
                .unwrap();
            db.close();
        }

        let mut db = Database::open(&path).unwrap();
        let err = db.find("widgets", &id).unwrap_err();
        assert!(matches!(err, CollectionError::NotFound(_)));
    }

    #[test]
    fn find_in_unknown_collection_is_not_found() {
        let (_dir, path) = scratch_path();
        let mut db = Database::open(&path).unwrap();
        let id = [0u8; crate::document::ID_LEN];
        let err = db.find("nope", &id).unwrap_err();
        assert!(matches!(err, CollectionError::NotFound(_)));
    }

    #[test]
    fn iter_returns_documents_across_a_reopen() {
        let (_dir, path) = scratch_path();
        {
            let mut db = Database::open(&path).unwrap();
            for i in 0u8..5 {
                let mut id = [0u8; crate::document::ID_LEN];
                id[11] = i;
                db.insert("widgets", &encode_minimal_document(id, b"v"))
                    .unwrap();
            }
            db.commit().unwrap();
        }

        let mut db = Database::open(&path).unwrap();
        let count = db.iter("widgets").unwrap().count();
        assert_eq!(count, 5);
    }
}
