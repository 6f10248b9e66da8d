//! The minimal document contract this store understands.
//!
//! This is not a document codec — building, validating, or walking a full
//! document structure is explicitly out of scope. All a [`crate::collection`]
//! needs from a document body is (a) its true length, since
//! [`crate::storage::datastore`] only round-trips whole, possibly
//! zero-padded pages, and (b) its `_id`, which is what keys the collection's
//! B+-tree. Both are read from a small fixed prefix, BSON-inspired but not
//! BSON: a 4-byte little-endian total length followed by a single element
//! shaped like `<type byte><"_id"\0><12 raw id bytes><rest of document>`.

use crate::error::DocumentError;

pub const ID_LEN: usize = 12;
const LENGTH_PREFIX: usize = 4;
const ID_FIELD_NAME: &[u8] = b"_id\0";

/// Reads the 4-byte little-endian length prefix and returns the document's
/// true length (including the prefix itself).
pub fn declared_len(doc: &[u8]) -> Result<usize, DocumentError> {
    if doc.len() < LENGTH_PREFIX {
        return Err(DocumentError::Truncated);
    }
    let len = u32::from_le_bytes(doc[0..4].try_into().unwrap()) as usize;
    if len < LENGTH_PREFIX {
        return Err(DocumentError::Truncated);
    }
    Ok(len)
}

/// Trims a (possibly zero-padded) byte buffer down to its declared length.
pub fn trim_to_declared_len(doc: &[u8]) -> Result<&[u8], DocumentError> {
    let len = declared_len(doc)?;
    doc.get(..len).ok_or(DocumentError::Truncated)
}

/// Extracts the 12-byte `_id` from a document's leading element. The
/// element must be the very first thing after the length prefix, matching
/// how [`encode_document`] (and any real encoder honoring this contract)
/// lays a document out.
pub fn extract_id(doc: &[u8]) -> Result<[u8; ID_LEN], DocumentError> {
    if doc.len() < LENGTH_PREFIX {
        return Err(DocumentError::Truncated);
    }
    let body = &doc[LENGTH_PREFIX..];
    if body.len() < 1 + ID_FIELD_NAME.len() + ID_LEN {
        return Err(DocumentError::MissingId);
    }
    let name = &body[1..1 + ID_FIELD_NAME.len()];
    if name != ID_FIELD_NAME {
        return Err(DocumentError::MissingId);
    }
    let mut id = [0u8; ID_LEN];
    let start = 1 + ID_FIELD_NAME.len();
    id.copy_from_slice(&body[start..start + ID_LEN]);
    Ok(id)
}

/// Offset of the payload bytes following the `_id` element, for callers
/// that build documents through [`encode_document`].
pub const PAYLOAD_OFFSET: usize = LENGTH_PREFIX + 1 + ID_FIELD_NAME.len() + ID_LEN;

/// Builds a document in this crate's minimal shape: a length prefix, an
/// `_id` element, then an opaque payload. This is the one encoder this
/// crate ships — it exists so the CLI binary and tests can construct
/// documents without reaching for a real BSON library; anything beyond this
/// fixed shape is a caller's concern.
pub fn encode_document(id: [u8; ID_LEN], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0u8; LENGTH_PREFIX]);
    out.push(0x07);
    out.extend_from_slice(ID_FIELD_NAME);
    out.extend_from_slice(&id);
    out.extend_from_slice(payload);
    let len = out.len() as u32;
    out[0..4].copy_from_slice(&len.to_le_bytes());
    out
}

#[cfg(test)]
pub use encode_document as encode_minimal_document;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_length_and_id() {
        let id = [7u8; ID_LEN];
        let doc = encode_minimal_document(id, b"hello");
        assert_eq!(declared_len(&doc).unwrap(), doc.len());
        assert_eq!(extract_id(&doc).unwrap(), id);
    }

    #[test]
    fn trims_zero_padded_trailer() {
        let id = [1u8; ID_LEN];
        let mut doc = encode_minimal_document(id, b"x");
        doc.extend_from_slice(&[0u8; 20]);
        let trimmed = trim_to_declared_len(&doc).unwrap();
        assert_eq!(trimmed.len(), doc.len() - 20);
    }

    #[test]
    fn rejects_truncated_prefix() {
        let err = declared_len(&[0u8; 2]).unwrap_err();
        assert!(matches!(err, DocumentError::Truncated));
    }

    #[test]
    fn rejects_missing_id_field() {
        let mut doc = vec![0u8; 4];
        doc.extend_from_slice(b"not an id field at all here");
        let len = doc.len() as u32;
        doc[0..4].copy_from_slice(&len.to_le_bytes());
        let err = extract_id(&doc).unwrap_err();
        assert!(matches!(err, DocumentError::MissingId));
    }
}
