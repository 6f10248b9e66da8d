//! The page cache: file header, page cache, free list and dirty list.
//!
//! Grounded on spec.md §4.2 for the exact on-disk header layout and on
//! `cryo`'s `storage::pager::Pager` for the cache/dirty-list/`Drop`-flush
//! idiom (generalized here from `cryo`'s ad hoc metadata page to the fixed
//! byte offsets below). Field naming follows
//! `original_source/Sakha/paging.c`'s `struct Pager`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use log::{debug, trace};

use crate::error::PagerError;
use crate::io::{FileIo, OpenFlags};
use crate::storage::page::{NodeView, PageNo};

const MAGIC: &[u8; 16] = b"SakhaDB ver 1\0\0\0";
const VERSION: u32 = 2;
pub const DEFAULT_PAGE_SIZE: usize = 1024;
pub const PAGE1_HEADER_SIZE: usize = 56;

const OFF_MAGIC: usize = 0;
const OFF_PAGE_SIZE: usize = 16;
const OFF_VERSION: usize = 20;
const OFF_FREELIST_HEAD: usize = 24;

pub const META_ROOT: PageNo = 1;

#[derive(Debug, Clone, Copy)]
struct Header {
    page_size: usize,
    num_pages: u32,
    freelist_head: PageNo,
}

pub struct Pager {
    io: FileIo,
    header: Header,
    synced_header: Header,
    cache: HashMap<PageNo, Rc<RefCell<Vec<u8>>>>,
    dirty: Vec<PageNo>,
    dirty_set: HashSet<PageNo>,
    header_dirty: bool,
}

impl Pager {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PagerError> {
        let flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE;
        let mut io = FileIo::open(path, flags)?;
        let size = io.size()?;

        let (header, bootstrap) = if size == 0 {
            (
                Header {
                    page_size: DEFAULT_PAGE_SIZE,
                    num_pages: 1,
                    freelist_head: 0,
                },
                true,
            )
        } else {
            let mut buf = [0u8; PAGE1_HEADER_SIZE];
            io.read_at(&mut buf, 0)?;
            if &buf[OFF_MAGIC..OFF_MAGIC + 16] != MAGIC {
                return Err(PagerError::NotADatabase);
            }
            let version = u32::from_le_bytes(buf[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap());
            if version > VERSION {
                return Err(PagerError::CantOpen);
            }
            if version != VERSION {
                return Err(PagerError::NotADatabase);
            }
            let page_size =
                u16::from_le_bytes(buf[OFF_PAGE_SIZE..OFF_PAGE_SIZE + 2].try_into().unwrap())
                    as usize;
            let freelist_head = u32::from_le_bytes(
                buf[OFF_FREELIST_HEAD..OFF_FREELIST_HEAD + 4]
                    .try_into()
                    .unwrap(),
            );
            let num_pages = (size as usize / page_size) as u32;
            (
                Header {
                    page_size,
                    num_pages,
                    freelist_head,
                },
                false,
            )
        };

        let mut pager = Pager {
            io,
            header,
            synced_header: header,
            cache: HashMap::new(),
            dirty: Vec::new(),
            dirty_set: HashSet::new(),
            header_dirty: false,
        };

        if bootstrap {
            debug!("bootstrapping a fresh database file");
            let page1 = pager.fetch(META_ROOT)?;
            {
                let mut buf = page1.borrow_mut();
                let mut node = NodeView::new(&mut buf[PAGE1_HEADER_SIZE..]);
                node.init(true);
            }
            pager.mark_dirty(META_ROOT);
            pager.header_dirty = true;
            pager.sync()?;
        }

        Ok(pager)
    }

    pub fn page_size(&self) -> usize {
        self.header.page_size
    }

    /// Usable bytes in the node region of page `no` (page 1 carries the
    /// file header ahead of its node region).
    pub fn node_region_len(&self, no: PageNo) -> usize {
        if no == META_ROOT {
            self.header.page_size - PAGE1_HEADER_SIZE
        } else {
            self.header.page_size
        }
    }

    /// Fetches page `no`, reading it from disk on a cache miss. `read_only`
    /// distinguishes a lookup (reports a missing page as `NotAvail`, per
    /// spec.md §4.2's `request_page` rule for read-only requests) from a
    /// request that expects the page to exist because something upstream
    /// already allocated it (`NoSuchPage`, a harder error).
    fn fetch(&mut self, no: PageNo, read_only: bool) -> Result<Rc<RefCell<Vec<u8>>>, PagerError> {
        if let Some(page) = self.cache.get(&no) {
            return Ok(Rc::clone(page));
        }
        if no == 0 || no > self.header.num_pages {
            return Err(if read_only {
                PagerError::NotAvail(no)
            } else {
                PagerError::NoSuchPage(no)
            });
        }

        trace!("fetching page {no} from disk");
        let mut buf = vec![0u8; self.header.page_size];
        let offset = (no as u64 - 1) * self.header.page_size as u64;
        self.io.read_at(&mut buf, offset)?;
        let page = Rc::new(RefCell::new(buf));
        self.cache.insert(no, Rc::clone(&page));
        Ok(page)
    }

    fn mark_dirty(&mut self, no: PageNo) {
        if self.dirty_set.insert(no) {
            self.dirty.push(no);
        }
    }

    /// Borrows the node region of page `no` for inspection or mutation. Set
    /// `dirty` when the closure writes through the view.
    pub fn with_node<R>(
        &mut self,
        no: PageNo,
        dirty: bool,
        f: impl FnOnce(&mut NodeView) -> R,
    ) -> Result<R, PagerError> {
        let page = self.fetch(no, !dirty)?;
        let region_len = self.node_region_len(no);
        let result = {
            let mut buf = page.borrow_mut();
            let start = buf.len() - region_len;
            let mut node = NodeView::new(&mut buf[start..]);
            f(&mut node)
        };
        if dirty {
            self.mark_dirty(no);
        }
        Ok(result)
    }

    /// Allocates a page (reusing the free list's head if one exists) and
    /// initializes it as an empty node of the given kind.
    pub fn allocate_node(&mut self, is_leaf: bool) -> Result<PageNo, PagerError> {
        let no = if self.header.freelist_head != 0 {
            let reused = self.header.freelist_head;
            let next_free = {
                let page = self.fetch(reused, false)?;
                let buf = page.borrow();
                u32::from_le_bytes(buf[0..4].try_into().unwrap())
            };
            self.header.freelist_head = next_free;
            self.header_dirty = true;
            reused
        } else {
            self.header.num_pages += 1;
            self.header_dirty = true;
            self.header.num_pages
        };

        let buf = vec![0u8; self.header.page_size];
        self.cache.insert(no, Rc::new(RefCell::new(buf)));
        self.with_node(no, true, |node| node.init(is_leaf))?;
        Ok(no)
    }

    /// Allocates a raw (non-node) page — used for data-chain and free-list
    /// pages, which have their own tiny fixed header instead of a node
    /// header.
    pub fn allocate_raw(&mut self) -> Result<PageNo, PagerError> {
        let no = if self.header.freelist_head != 0 {
            let reused = self.header.freelist_head;
            let next_free = {
                let page = self.fetch(reused, false)?;
                let buf = page.borrow();
                u32::from_le_bytes(buf[0..4].try_into().unwrap())
            };
            self.header.freelist_head = next_free;
            self.header_dirty = true;
            reused
        } else {
            self.header.num_pages += 1;
            self.header_dirty = true;
            self.header.num_pages
        };
        let buf = vec![0u8; self.header.page_size];
        self.cache.insert(no, Rc::new(RefCell::new(buf)));
        self.mark_dirty(no);
        Ok(no)
    }

    /// Fetches a raw (non-node) page. `read_only` follows the same
    /// read-vs-write distinction as [`Pager::with_node`].
    pub fn raw_page(&mut self, no: PageNo, read_only: bool) -> Result<Rc<RefCell<Vec<u8>>>, PagerError> {
        self.fetch(no, read_only)
    }

    pub fn mark_raw_dirty(&mut self, no: PageNo) {
        self.mark_dirty(no);
    }

    /// Returns a page to the free list. Not exercised by insert-only
    /// callers today, but required for the file format to round-trip: a
    /// reopened database must still see a consistent free list.
    pub fn free_page(&mut self, no: PageNo) -> Result<(), PagerError> {
        let page = self.fetch(no, false)?;
        {
            let mut buf = page.borrow_mut();
            buf[0..4].copy_from_slice(&self.header.freelist_head.to_le_bytes());
        }
        self.mark_dirty(no);
        self.header.freelist_head = no;
        self.header_dirty = true;
        Ok(())
    }

    /// Flushes every dirty page and the header to disk.
    pub fn sync(&mut self) -> Result<(), PagerError> {
        for no in self.dirty.drain(..) {
            self.dirty_set.remove(&no);
            if let Some(page) = self.cache.get(&no) {
                let buf = page.borrow();
                let offset = (no as u64 - 1) * self.header.page_size as u64;
                self.io.write_at(&buf, offset)?;
            }
        }

        if self.header_dirty {
            let mut hdr = vec![0u8; PAGE1_HEADER_SIZE];
            hdr[OFF_MAGIC..OFF_MAGIC + 16].copy_from_slice(MAGIC);
            hdr[OFF_PAGE_SIZE..OFF_PAGE_SIZE + 2]
                .copy_from_slice(&(self.header.page_size as u16).to_le_bytes());
            hdr[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&VERSION.to_le_bytes());
            hdr[OFF_FREELIST_HEAD..OFF_FREELIST_HEAD + 4]
                .copy_from_slice(&self.header.freelist_head.to_le_bytes());
            self.io.write_at(&hdr, 0)?;
            self.header_dirty = false;
        }

        self.io.sync()?;
        self.synced_header = self.header;
        debug!("synced pager, {} pages", self.header.num_pages);
        Ok(())
    }

    /// Discards the in-memory cache and dirty list without touching the
    /// file; the next access re-reads from disk. See DESIGN.md's Open
    /// Question decisions for why this is the chosen rollback semantics.
    pub fn rollback(&mut self) {
        self.header = self.synced_header;
        self.header_dirty = false;
        self.cache.clear();
        self.dirty.clear();
        self.dirty_set.clear();
    }
}

/// Deliberately does not flush. spec.md §4.6/§5: a close or crash without an
/// explicit `sync`/`commit` loses whatever hasn't been written yet — there
/// is no WAL to replay it from, so callers that want their writes to
/// survive must call [`Pager::sync`] themselves.
impl Drop for Pager {
    fn drop(&mut self) {
        if !self.dirty.is_empty() || self.header_dirty {
            debug!(
                "dropping pager with {} unsynced page(s), discarding",
                self.dirty.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn scratch_path() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new("sakhadb-pager").unwrap();
        let path = dir.path().join("data.db");
        (dir, path)
    }

    #[test]
    fn opening_a_fresh_file_bootstraps_an_empty_meta_leaf() {
        let (_dir, path) = scratch_path();
        let mut pager = Pager::open(&path).unwrap();
        let is_leaf = pager.with_node(META_ROOT, false, |n| n.is_leaf()).unwrap();
        assert!(is_leaf);
        assert_eq!(pager.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn reopening_preserves_page_count_and_header() {
        let (_dir, path) = scratch_path();
        {
            let mut pager = Pager::open(&path).unwrap();
            pager.allocate_node(true).unwrap();
            pager.sync().unwrap();
        }
        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.header.num_pages, 2);
    }

    #[test]
    fn opening_a_corrupt_header_is_rejected() {
        let (_dir, path) = scratch_path();
        std::fs::write(&path, vec![0u8; DEFAULT_PAGE_SIZE]).unwrap();
        let err = Pager::open(&path).unwrap_err();
        assert!(matches!(err, PagerError::NotADatabase));
    }

    #[test]
    fn allocate_then_free_reuses_the_page() {
        let (_dir, path) = scratch_path();
        let mut pager = Pager::open(&path).unwrap();
        let a = pager.allocate_node(true).unwrap();
        pager.free_page(a).unwrap();
        let b = pager.allocate_node(true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rollback_discards_unsynced_allocations() {
        let (_dir, path) = scratch_path();
        let mut pager = Pager::open(&path).unwrap();
        pager.sync().unwrap();
        let before = pager.header.num_pages;
        pager.allocate_node(true).unwrap();
        assert_eq!(pager.header.num_pages, before + 1);
        pager.rollback();
        assert_eq!(pager.header.num_pages, before);
    }
}
