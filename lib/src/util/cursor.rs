use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

/// Sequential big-endian reader over a borrowed byte slice
///
/// This is the read-side counterpart of [`super::ByteVector`]. Every read is bounds checked and
/// short input surfaces as [`Error::Truncated`] rather than a panic.
#[derive(Clone, Debug)]
pub struct Cursor<'b> {
    bytes: &'b [u8],
    position: usize,
}

impl<'b> Cursor<'b> {
    pub fn new(bytes: &'b [u8], position: usize) -> Cursor<'b> {
        Cursor { bytes, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn bytes_left(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn bytes(&mut self, len: usize) -> Result<&'b [u8], Error> {
        let start = self.position;
        let end = start.checked_add(len).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                self.position = end;
                Ok(&self.bytes[start..end])
            }
            None => Err(Error::Truncated {
                offset: start,
                needed: len,
            }),
        }
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, Error> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.bytes(2)?))
    }

    pub fn i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.bytes(2)?))
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.bytes(4)?))
    }

    pub fn i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.bytes(4)?))
    }

    pub fn i64(&mut self) -> Result<i64, Error> {
        Ok(BigEndian::read_i64(self.bytes(8)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_reads() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0xFF];
        let mut cursor = Cursor::new(&bytes, 0);
        assert_eq!(cursor.u32().unwrap(), 0xCAFE_BABE);
        assert_eq!(cursor.u16().unwrap(), 52);
        assert_eq!(cursor.i8().unwrap(), -1);
        assert_eq!(cursor.bytes_left(), 0);
    }

    #[test]
    fn short_input_is_an_error() {
        let bytes = [0x00, 0x01, 0x02];
        let mut cursor = Cursor::new(&bytes, 1);
        match cursor.i32() {
            Err(Error::Truncated { offset, needed }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.u16().unwrap(), 0x0102);
    }
}
