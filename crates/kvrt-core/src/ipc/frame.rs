//! Message framing.
//!
//! A frame is one JSON document followed by a single NUL byte. The
//! terminator is not part of the document and is stripped before decoding.

/// Byte appended after every JSON document on the wire.
pub const TERMINATOR: u8 = 0;

/// Append the terminator to an encoded document.
pub fn seal(mut document: Vec<u8>) -> Vec<u8> {
    document.push(TERMINATOR);
    document
}

/// The document inside a received frame: `bytes` minus one trailing NUL,
/// if present.
pub fn payload(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(&[TERMINATOR]).unwrap_or(bytes)
}
