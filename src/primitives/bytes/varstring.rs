//! ASCII strings and mixed numeric/string vertex ids.
//!
//! A string field starts with the sentinel byte [`STRING_MARKER`], which is
//! also the forward varlong encoding of zero. Numeric ids are therefore kept
//! strictly positive so a reader can tell the two forms apart from the first
//! byte alone.

use super::varlong::{self, STOP_MASK};
use super::{ReadBuffer, WriteBuffer};
use crate::types::{Result, StorageError, VertexId};

/// First byte of every encoded string field.
pub const STRING_MARKER: u8 = STOP_MASK;

fn validate_ascii(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(StorageError::Invalid("string field must not be empty"));
    }
    if !value.is_ascii() {
        return Err(StorageError::Invalid("string field must be ASCII"));
    }
    Ok(())
}

/// Writes the marker, then one byte per character with the stop bit on the last.
pub fn write_ascii(out: &mut WriteBuffer, value: &str) -> Result<()> {
    validate_ascii(value)?;
    out.put_u8(STRING_MARKER);
    let bytes = value.as_bytes();
    let last = bytes.len() - 1;
    for (idx, &byte) in bytes.iter().enumerate() {
        out.put_u8(if idx == last { byte | STOP_MASK } else { byte });
    }
    Ok(())
}

/// Reads a field written by [`write_ascii`], marker included.
pub fn read_ascii(input: &mut ReadBuffer<'_>) -> String {
    let marker = input.get_u8();
    assert_eq!(marker, STRING_MARKER, "string field missing marker byte");
    let mut text = String::new();
    loop {
        let byte = input.get_u8();
        text.push(char::from(byte & !STOP_MASK));
        if byte & STOP_MASK != 0 {
            return text;
        }
    }
}

/// Encoded length of a string field, marker included.
pub fn ascii_length(value: &str) -> usize {
    value.len() + 1
}

/// Returns true if an encoded field starting with `first` is a string.
pub fn is_string_field(first: u8) -> bool {
    first == STRING_MARKER
}

/// Writes a vertex id in its numeric or string form.
pub fn write_vertex_id(out: &mut WriteBuffer, id: &VertexId) -> Result<()> {
    match id {
        VertexId::Numeric(value) => {
            if *value <= 0 {
                return Err(StorageError::Invalid("numeric vertex id must be positive"));
            }
            varlong::write_positive(out, *value);
            Ok(())
        }
        VertexId::Text(value) => write_ascii(out, value),
    }
}

/// Reads a vertex id written by [`write_vertex_id`].
pub fn read_vertex_id(input: &mut ReadBuffer<'_>) -> VertexId {
    if is_string_field(input.peek_u8()) {
        VertexId::Text(read_ascii(input))
    } else {
        VertexId::Numeric(varlong::read_positive(input))
    }
}

/// Encoded length of a vertex id.
pub fn vertex_id_length(id: &VertexId) -> usize {
    match id {
        VertexId::Numeric(value) => varlong::positive_length(*value),
        VertexId::Text(value) => ascii_length(value),
    }
}
