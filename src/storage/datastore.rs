//! Multi-page overflow storage for document bodies.
//!
//! Grounded directly on `original_source/Sakha/dbdata.c`:
//! `sakhadb_dbdata_write` chains pages by writing the next page's number in
//! the first `size_of(Pgno)` bytes of each page and zero-terminating the
//! chain; `sakhadb_dbdata_read` follows that chain, appending
//! `page_size - size_of(Pgno)` bytes per page until it sees a zero `next`.
//! Since a document is self-describing (its own length prefix says how
//! much of the concatenated chain is real payload, see [`crate::document`]),
//! this module does not track an exact byte count itself — it only has to
//! round-trip whole pages, exactly like the C source it's grounded on.

use crate::error::PagerError;
use crate::storage::page::PageNo;
use crate::storage::pager::Pager;

/// Writes `data` across as many chained pages as needed and returns the
/// head page number.
pub fn write(pager: &mut Pager, data: &[u8]) -> Result<PageNo, PagerError> {
    let area_size = pager.page_size() - 4;
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![&[][..]]
    } else {
        data.chunks(area_size).collect()
    };

    let mut page_nos = Vec::with_capacity(chunks.len());
    for _ in &chunks {
        page_nos.push(pager.allocate_raw()?);
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let next = page_nos.get(i + 1).copied().unwrap_or(0);
        let no = page_nos[i];
        let page = pager.raw_page(no, false)?;
        {
            let mut buf = page.borrow_mut();
            buf[0..4].copy_from_slice(&next.to_le_bytes());
            buf[4..4 + chunk.len()].copy_from_slice(chunk);
        }
        pager.mark_raw_dirty(no);
    }

    Ok(page_nos[0])
}

/// Follows the chain starting at `head`, concatenating page payloads. The
/// result may be longer than the original document (the last page is
/// zero-padded); callers trim it using the document's own length prefix.
pub fn read(pager: &mut Pager, head: PageNo) -> Result<Vec<u8>, PagerError> {
    let mut out = Vec::new();
    let mut current = head;
    while current != 0 {
        let page = pager.raw_page(current, true)?;
        let buf = page.borrow();
        let next = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        out.extend_from_slice(&buf[4..]);
        current = next;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn scratch_pager() -> (TempDir, Pager) {
        let dir = TempDir::new("sakhadb-datastore").unwrap();
        let pager = Pager::open(dir.path().join("data.db")).unwrap();
        (dir, pager)
    }

    #[test]
    fn round_trips_a_single_page_document() {
        let (_dir, mut pager) = scratch_pager();
        let head = write(&mut pager, b"small document").unwrap();
        let back = read(&mut pager, head).unwrap();
        assert_eq!(&back[..15], b"small document");
    }

    #[test]
    fn round_trips_a_document_spanning_multiple_pages() {
        let (_dir, mut pager) = scratch_pager();
        let area_size = pager.page_size() - 4;
        let data: Vec<u8> = (0..(area_size * 3 + 17)).map(|i| (i % 251) as u8).collect();

        let head = write(&mut pager, &data).unwrap();
        let back = read(&mut pager, head).unwrap();
        assert_eq!(&back[..data.len()], data.as_slice());
    }

    #[test]
    fn empty_document_still_gets_a_head_page() {
        let (_dir, mut pager) = scratch_pager();
        let head = write(&mut pager, &[]).unwrap();
        assert_ne!(head, 0);
    }
}
