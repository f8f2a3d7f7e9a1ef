use crate::{Error, Mp4Box, Result};

/// A pre-sized output buffer with a write cursor.
///
/// Boxes are written in place, so every box must know its final `size()`
/// before it is encoded. Writing past the end is reported as
/// [`Error::BufferOverflow`] and leaves the cursor untouched.
#[derive(Debug, Clone)]
pub struct SliceWriter {
    buf: Vec<u8>,
    offset: usize,
}

impl SliceWriter {
    pub fn with_size(size: usize) -> Self {
        SliceWriter {
            buf: vec![0; size],
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// The bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.offset]
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.truncate(self.offset);
        self.buf
    }

    pub fn write_box<B: Mp4Box + ?Sized>(&mut self, boks: &B) -> Result<()> {
        let need = boks.size();
        self.ensure_room(need)?;

        let mut dst: &mut [u8] = &mut self.buf[self.offset..self.offset + need as usize];
        boks.write(&mut dst)?;

        if !dst.is_empty() {
            return Err(Error::invalid(
                &crate::fourcc_str(&B::NAME),
                format!("wrote {} bytes, size says {}", need as usize - dst.len(), need),
            ));
        }

        self.offset += need as usize;

        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_room(bytes.len() as u64)?;

        self.buf[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();

        Ok(())
    }

    fn ensure_room(&self, need: u64) -> Result<()> {
        if need > self.remaining() as u64 {
            return Err(Error::BufferOverflow {
                need,
                remaining: self.remaining() as u64,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MovieFragmentHeaderBox;

    #[test]
    fn writes_boxes_at_cursor() {
        let mfhd = MovieFragmentHeaderBox::new(7);
        let mut sw = SliceWriter::with_size(mfhd.size() as usize + 2);

        sw.write_box(&mfhd).unwrap();
        assert_eq!(sw.offset(), 16);
        assert_eq!(&sw.bytes()[4..8], b"mfhd");

        sw.write_bytes(&[1, 2]).unwrap();
        assert_eq!(sw.remaining(), 0);
    }

    #[test]
    fn overflow_is_an_error() {
        let mfhd = MovieFragmentHeaderBox::new(7);
        let mut sw = SliceWriter::with_size(10);

        assert!(matches!(
            sw.write_box(&mfhd),
            Err(Error::BufferOverflow {
                need: 16,
                remaining: 10
            })
        ));
        assert_eq!(sw.offset(), 0);
    }
}
