use crate::jvm::{modified_utf8_len, Error};
use byteorder::{BigEndian, ByteOrder};
use std::io;

/// Append-only growable byte buffer with big-endian writers
///
/// This is the output side of every writer: method bodies, attribute payloads, annotation values
/// and the final class file are all accumulated into one of these. Growth is amortized: when an
/// append does not fit, capacity becomes the larger of twice the current capacity and the exact
/// size needed.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    /// Capacity of a buffer made with [`ByteVector::new`]
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new() -> ByteVector {
        ByteVector::with_capacity(ByteVector::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> ByteVector {
        ByteVector {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Make sure `needed` more bytes fit without reallocating
    pub fn reserve(&mut self, needed: usize) {
        let required = self.data.len() + needed;
        if required > self.data.capacity() {
            let doubled = 2 * self.data.capacity();
            let target = doubled.max(required);
            self.data.reserve_exact(target - self.data.len());
        }
    }

    pub fn put_byte(&mut self, byte: u8) -> &mut Self {
        self.reserve(1);
        self.data.push(byte);
        self
    }

    /// Two bytes, typically an opcode followed by a one byte operand
    pub fn put11(&mut self, b1: u8, b2: u8) -> &mut Self {
        self.reserve(2);
        self.data.push(b1);
        self.data.push(b2);
        self
    }

    pub fn put_short(&mut self, value: u16) -> &mut Self {
        self.reserve(2);
        let mut buf = [0; 2];
        BigEndian::write_u16(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    /// One byte followed by a big-endian short, typically an opcode with a pool index operand
    pub fn put12(&mut self, byte: u8, value: u16) -> &mut Self {
        self.reserve(3);
        self.data.push(byte);
        self.put_short(value)
    }

    pub fn put_int(&mut self, value: i32) -> &mut Self {
        self.reserve(4);
        let mut buf = [0; 4];
        BigEndian::write_i32(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    pub fn put_long(&mut self, value: i64) -> &mut Self {
        self.reserve(8);
        let mut buf = [0; 8];
        BigEndian::write_i64(&mut buf, value);
        self.data.extend_from_slice(&buf);
        self
    }

    /// Length-prefixed modified UTF-8 string
    ///
    /// Pure ASCII strings (without `\0`) are copied byte for byte. Anything else goes through a
    /// second encoding pass. Strings whose encoding needs more than 65535 bytes are rejected.
    pub fn put_utf8(&mut self, string: &str) -> Result<&mut Self, Error> {
        let ascii = string.bytes().all(|b| (0x01..0x80).contains(&b));
        let encoded_len = if ascii {
            string.len()
        } else {
            modified_utf8_len(string)
        };
        if encoded_len > 0xFFFF {
            return Err(Error::Utf8TooLong { encoded_len });
        }

        self.reserve(2 + encoded_len);
        self.put_short(encoded_len as u16);
        if ascii {
            self.data.extend_from_slice(string.as_bytes());
        } else {
            crate::jvm::encode_modified_utf8_into(string, &mut self.data);
        }
        Ok(self)
    }

    pub fn put_byte_array(&mut self, bytes: &[u8]) -> &mut Self {
        self.reserve(bytes.len());
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn put_byte_vector(&mut self, other: &ByteVector) -> &mut Self {
        self.put_byte_array(&other.data)
    }

    /// Pad with zeroes up to the next multiple of 4 (used by switch instructions)
    pub fn pad_to_multiple_of_4(&mut self) -> &mut Self {
        let padding = (4 - self.data.len() % 4) % 4;
        self.reserve(padding);
        for _ in 0..padding {
            self.data.push(0);
        }
        self
    }

    /// Overwrite a previously written short
    pub fn set_short(&mut self, position: usize, value: u16) {
        BigEndian::write_u16(&mut self.data[position..position + 2], value);
    }

    /// Overwrite a previously written int
    pub fn set_int(&mut self, position: usize, value: i32) {
        BigEndian::write_i32(&mut self.data[position..position + 4], value);
    }
}

impl Default for ByteVector {
    fn default() -> Self {
        ByteVector::new()
    }
}

impl std::fmt::Debug for ByteVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteVector({} bytes)", self.data.len())
    }
}

/// Lets [`crate::jvm::Serialize`] implementations write directly into the buffer
impl io::Write for ByteVector {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put_byte_array(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn growth_past_default_capacity() {
        let mut buffer = ByteVector::new();
        let initial_capacity = buffer.capacity();
        assert!(initial_capacity >= ByteVector::DEFAULT_CAPACITY);

        let mut reallocations = 0;
        let mut capacity = initial_capacity;
        for i in 0..65u8 {
            buffer.put_byte(i);
            if buffer.capacity() != capacity {
                reallocations += 1;
                capacity = buffer.capacity();
            }
        }

        assert_eq!(reallocations, 1);
        assert!(buffer.capacity() >= 2 * ByteVector::DEFAULT_CAPACITY);
        assert_eq!(buffer.as_slice(), (0..65u8).collect::<Vec<u8>>().as_slice());
    }

    #[test]
    fn growth_to_exact_need() {
        let mut buffer = ByteVector::with_capacity(4);
        buffer.put_byte_array(&[7; 100]);
        assert_eq!(buffer.len(), 100);
        assert!(buffer.capacity() >= 100);
    }

    #[test]
    fn big_endian_primitives() {
        let mut buffer = ByteVector::new();
        buffer
            .put_byte(0xCA)
            .put_short(0xFEBA)
            .put_int(-2)
            .put_long(1)
            .put11(1, 2)
            .put12(3, 0x0405);
        assert_eq!(
            buffer.as_slice(),
            &[
                0xCA, 0xFE, 0xBA, 0xFF, 0xFF, 0xFF, 0xFE, 0, 0, 0, 0, 0, 0, 0, 1, 1, 2, 3, 4, 5
            ]
        );
    }

    #[test]
    fn utf8_ascii_and_fallback() {
        let mut buffer = ByteVector::new();
        buffer.put_utf8("ab").unwrap();
        buffer.put_utf8("a\0").unwrap();
        assert_eq!(buffer.as_slice(), &[0, 2, b'a', b'b', 0, 3, b'a', 0xC0, 0x80]);
    }

    #[test]
    fn utf8_too_long() {
        let mut buffer = ByteVector::new();
        let long = "é".repeat(40_000);
        match buffer.put_utf8(&long) {
            Err(Error::Utf8TooLong { encoded_len }) => assert_eq!(encoded_len, 80_000),
            other => panic!("unexpected {:?}", other.map(|b| b.len())),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn patching() {
        let mut buffer = ByteVector::new();
        buffer.put_byte(1).put_short(0).put_int(0);
        buffer.set_short(1, 0xABCD);
        buffer.set_int(3, 7);
        assert_eq!(buffer.as_slice(), &[1, 0xAB, 0xCD, 0, 0, 0, 7]);
        buffer.pad_to_multiple_of_4();
        assert_eq!(buffer.len(), 8);
    }
}
