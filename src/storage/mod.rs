//! The on-disk storage stack: paged file I/O, the page cache, the B+-tree
//! index, and multi-page overflow storage for document bodies.
//!
//! # Layering
//!
//! - [`page`]: byte layout of a single node page (header, slot array, key
//!   bytes).
//! - [`pager`]: the file header, page cache, free list and dirty list
//!   sitting on top of [`crate::io`].
//! - [`btree`]: the B+-tree algorithm (descent, insert with splitting, the
//!   ordered cursor), operating on a root page handed to it by a
//!   [`crate::collection::Collection`].
//! - [`datastore`]: multi-page overflow chains for document bodies too
//!   large to fit in one page.
pub mod btree;
pub mod datastore;
pub mod page;
pub mod pager;
