//! Self-delimiting variable-length integers.
//!
//! Values are written big-endian in 7-bit groups. The last group of an
//! encoding carries the stop bit (`0x80`). Byte-wise comparison agrees with
//! numeric comparison for forward encodings of equal length; the backward
//! form puts its length in the first byte and so preserves order across
//! lengths as well.
//!
//! Three variants share that core:
//! - plain positive and signed (`(|v| << 1) | sign`) values,
//! - positive values with a small tag stored in the top bits of the first
//!   byte, ordered first by tag and then by value,
//! - backward-readable values whose first byte holds a 3-bit length so a
//!   reader positioned after the value can step back over it.

use super::{ReadBuffer, StaticBuffer, WriteBuffer};

const BIT_MASK: u8 = 0x7F;
/// High bit marking the final byte of a forward encoding.
pub const STOP_MASK: u8 = 0x80;
const MAX_BLOCKS: usize = 10;

fn unsigned_bit_length(value: u64) -> u32 {
    if value == 0 {
        1
    } else {
        u64::BITS - value.leading_zeros()
    }
}

fn num_variable_blocks(num_bits: u32) -> usize {
    debug_assert!(num_bits > 0);
    ((num_bits - 1) / 7 + 1) as usize
}

fn unsigned_num_blocks(value: u64) -> usize {
    num_variable_blocks(unsigned_bit_length(value))
}

fn write_unsigned(out: &mut WriteBuffer, value: u64) {
    write_unsigned_blocks(out, unsigned_num_blocks(value) as u32 * 7, value);
}

fn write_unsigned_blocks(out: &mut WriteBuffer, mut offset: u32, value: u64) {
    debug_assert_eq!(offset % 7, 0);
    while offset > 0 {
        offset -= 7;
        let mut byte = ((value >> offset) as u8) & BIT_MASK;
        if offset == 0 {
            byte |= STOP_MASK;
        }
        out.put_u8(byte);
    }
}

fn read_unsigned(input: &mut ReadBuffer<'_>) -> u64 {
    let mut value = 0u64;
    for _ in 0..MAX_BLOCKS {
        let byte = input.get_u8();
        value = (value << 7) | u64::from(byte & BIT_MASK);
        if byte & STOP_MASK != 0 {
            return value;
        }
    }
    panic!("varlong too long (exceeded {MAX_BLOCKS} bytes)");
}

fn to_unsigned(value: i64) -> u64 {
    assert!(value != i64::MIN, "i64::MIN has no signed varlong encoding");
    (value.unsigned_abs() << 1) | u64::from(value < 0)
}

fn from_unsigned(value: u64) -> i64 {
    let magnitude = (value >> 1) as i64;
    if value & 1 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

fn assert_positive(value: i64) -> u64 {
    assert!(value >= 0, "positive varlong given negative value {value}");
    value as u64
}

/// Writes a non-negative value. Panics on negative input.
pub fn write_positive(out: &mut WriteBuffer, value: i64) {
    write_unsigned(out, assert_positive(value));
}

/// Reads a value written by [`write_positive`].
pub fn read_positive(input: &mut ReadBuffer<'_>) -> i64 {
    let value = read_unsigned(input);
    assert!(
        value <= i64::MAX as u64,
        "positive varlong decoded out of range"
    );
    value as i64
}

/// Encoded length of a non-negative value.
pub fn positive_length(value: i64) -> usize {
    unsigned_num_blocks(assert_positive(value))
}

/// Encodes one non-negative value into its own buffer.
pub fn positive_buffer(value: i64) -> StaticBuffer {
    positive_buffer_all(&[value])
}

/// Concatenated encodings of several non-negative values.
pub fn positive_buffer_all(values: &[i64]) -> StaticBuffer {
    let len = values.iter().map(|&v| positive_length(v)).sum();
    let mut out = WriteBuffer::with_capacity(len);
    for &value in values {
        write_positive(&mut out, value);
    }
    out.into_static()
}

/// Writes a signed value using the sign-in-low-bit mapping.
pub fn write(out: &mut WriteBuffer, value: i64) {
    write_unsigned(out, to_unsigned(value));
}

/// Reads a value written by [`write`].
pub fn read(input: &mut ReadBuffer<'_>) -> i64 {
    from_unsigned(read_unsigned(input))
}

/// Encoded length of a signed value.
pub fn length(value: i64) -> usize {
    unsigned_num_blocks(to_unsigned(value))
}

fn assert_prefix(prefix: u8, prefix_bit_len: u32) {
    assert!(
        prefix_bit_len > 0 && prefix_bit_len < 6,
        "prefix length {prefix_bit_len} outside 1..=5"
    );
    assert!(
        u32::from(prefix) < (1 << prefix_bit_len),
        "prefix {prefix} does not fit in {prefix_bit_len} bits"
    );
}

/// Writes a non-negative value with `prefix` in the top `prefix_bit_len`
/// bits of the first byte.
///
/// The bit right below the prefix flags whether more bytes follow; the low
/// bits of the first byte take the leading value bits when they fit.
pub fn write_positive_with_prefix(
    out: &mut WriteBuffer,
    value: i64,
    prefix: u8,
    prefix_bit_len: u32,
) {
    let mut value = assert_positive(value);
    assert_prefix(prefix, prefix_bit_len);
    let delta_len = 8 - prefix_bit_len;
    let mut first = prefix << delta_len;
    let mut value_len = unsigned_bit_length(value);
    let head_bits = value_len % 7;
    if head_bits < delta_len {
        let offset = value_len - head_bits;
        first |= (value >> offset) as u8;
        value &= (1u64 << offset) - 1;
        value_len -= head_bits;
    } else {
        value_len += 7 - head_bits;
    }
    if value_len > 0 {
        first |= 1 << (delta_len - 1);
    }
    out.put_u8(first);
    if value_len > 0 {
        write_unsigned_blocks(out, value_len, value);
    }
}

/// Reads a value written by [`write_positive_with_prefix`], returning
/// `(value, prefix)`.
pub fn read_positive_with_prefix(input: &mut ReadBuffer<'_>, prefix_bit_len: u32) -> (i64, u8) {
    assert!(
        prefix_bit_len > 0 && prefix_bit_len < 6,
        "prefix length {prefix_bit_len} outside 1..=5"
    );
    let first = input.get_u8();
    let delta_len = 8 - prefix_bit_len;
    let prefix = first >> delta_len;
    let mut value = u64::from(first & ((1u8 << (delta_len - 1)) - 1));
    if (first >> (delta_len - 1)) & 1 == 1 {
        let start = input.position();
        let remainder = read_unsigned(input);
        let consumed = input.position() - start;
        assert!(consumed < MAX_BLOCKS, "prefixed varlong too long");
        value = (value << (consumed as u32 * 7)) + remainder;
    }
    assert!(
        value <= i64::MAX as u64,
        "prefixed varlong decoded out of range"
    );
    (value as i64, prefix)
}

/// Encoded length of a prefixed non-negative value.
pub fn positive_with_prefix_length(value: i64, prefix_bit_len: u32) -> usize {
    let value = assert_positive(value);
    assert!(prefix_bit_len > 0 && prefix_bit_len < 6);
    num_variable_blocks(unsigned_bit_length(value) + prefix_bit_len)
}

fn unsigned_backward_length(value: u64) -> usize {
    let bits = unsigned_bit_length(value);
    let blocks = if bits <= 4 { 1 } else { 2 + (bits - 5) / 7 };
    (blocks as usize).max(3)
}

fn write_unsigned_backward(out: &mut WriteBuffer, value: u64) {
    let num_bytes = unsigned_backward_length(value);
    let length_tag = (num_bytes - 3) as u8;
    debug_assert!(length_tag < 8);
    let mut byte = STOP_MASK | (length_tag << 4);
    for i in (0..num_bytes).rev() {
        byte |= BIT_MASK & ((value >> (i * 7)) as u8);
        out.put_u8(byte);
        byte = 0;
    }
}

fn read_unsigned_backward(input: &mut ReadBuffer<'_>) -> u64 {
    let mut position = input.position();
    let mut num_bytes = 0usize;
    let mut value = 0u64;
    loop {
        assert!(position > 0, "backward varlong truncated");
        position -= 1;
        let byte = input.get_u8_at(position);
        if byte & STOP_MASK != 0 {
            value |= u64::from(byte & 0x0F) << (7 * num_bytes);
            let expected = usize::from((byte >> 4) & 0x07) + 3;
            assert_eq!(
                expected,
                num_bytes + 1,
                "backward varlong length tag mismatch"
            );
            break;
        }
        assert!(num_bytes + 1 < MAX_BLOCKS, "backward varlong too long");
        value |= u64::from(byte) << (7 * num_bytes);
        num_bytes += 1;
    }
    input.set_position(position);
    value
}

/// Writes a non-negative value readable from its end by [`read_positive_backward`].
pub fn write_positive_backward(out: &mut WriteBuffer, value: i64) {
    write_unsigned_backward(out, assert_positive(value));
}

/// Reads the value that ends at the cursor and moves the cursor to its first byte.
pub fn read_positive_backward(input: &mut ReadBuffer<'_>) -> i64 {
    read_unsigned_backward(input) as i64
}

/// Encoded length of a backward non-negative value (always 3..=10).
pub fn positive_backward_length(value: i64) -> usize {
    unsigned_backward_length(assert_positive(value))
}

/// Signed counterpart of [`write_positive_backward`].
pub fn write_backward(out: &mut WriteBuffer, value: i64) {
    write_unsigned_backward(out, to_unsigned(value));
}

/// Signed counterpart of [`read_positive_backward`].
pub fn read_backward(input: &mut ReadBuffer<'_>) -> i64 {
    from_unsigned(read_unsigned_backward(input))
}

/// Encoded length of a backward signed value.
pub fn backward_length(value: i64) -> usize {
    unsigned_backward_length(to_unsigned(value))
}
