use byteorder::{BigEndian, ByteOrder};

use crate::{Error, FourCC, Result};

/// Bounds-checked big-endian cursor over the contents of one box.
pub(crate) struct ContentReader<'a> {
    data: &'a [u8],
    pos: usize,
    name: &'static str,
}

impl<'a> ContentReader<'a> {
    pub fn new(name: &'static str, data: &'a [u8]) -> Self {
        ContentReader { data, pos: 0, name }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated {
                name: self.name.to_string(),
                need: (self.pos + n) as u64,
                have: self.data.len() as u64,
            });
        }

        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;

        Ok(bytes)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2).map(BigEndian::read_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(BigEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(4).map(BigEndian::read_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take(8).map(BigEndian::read_u64)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let mut name = [0u8; 4];
        name.copy_from_slice(self.take(4)?);

        Ok(FourCC(name))
    }

    /// Fails if unread bytes are left.
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::invalid(
                self.name,
                format!("{} trailing bytes", self.remaining()),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_and_reports_truncation() {
        let data = [0, 0, 1, 0, 0xff, 0xff, 0xff, 0xfe, 7];
        let mut reader = ContentReader::new("test", &data);

        assert_eq!(reader.read_u32().unwrap(), 256);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert!(reader.finish().is_err());
        assert!(matches!(
            reader.read_u16(),
            Err(Error::Truncated { need: 10, have: 9, .. })
        ));
    }
}
