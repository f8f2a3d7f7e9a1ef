use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use std::io;

use crate::describe::write_field;
use crate::{DecodeBox, InfoLevels, Mp4Box, Result};

/// Sample data of one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaDataBox {
    pub data: BytesMut,
}

impl MediaDataBox {
    pub fn new(data: BytesMut) -> Self {
        MediaDataBox { data }
    }

    /// Bytes between the start of the box and its payload.
    pub fn header_size(&self) -> u64 {
        self.size() - self.data.len() as u64
    }
}

impl Mp4Box for MediaDataBox {
    const NAME: FourCC = FourCC(*b"mdat");

    fn content_size(&self) -> u64 {
        self.data.len() as _
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_slice(&self.data);

        Ok(())
    }

    // payload goes straight to the writer, unstaged
    fn encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut header = [0u8; 16];
        let header_size = crate::write_box_header::<Self>(&mut header, self.size());

        w.write_all(&header[..header_size])?;
        w.write_all(&self.data)?;

        Ok(())
    }

    fn describe_contents<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        _levels: &InfoLevels,
        level: u32,
        indent: &str,
        _indent_step: &str,
    ) -> Result<()> {
        if level >= 1 {
            write_field(w, indent, "payloadSize", self.data.len())?;
        }

        Ok(())
    }
}

impl DecodeBox for MediaDataBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        Ok(MediaDataBox::new(BytesMut::from(contents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamed_and_buffered_encodings_agree() {
        let mdat = MediaDataBox::new(BytesMut::from(&b"sample data"[..]));

        let mut streamed = Vec::new();
        mdat.encode(&mut streamed).unwrap();

        let mut buffered = BytesMut::new();
        mdat.write(&mut buffered).unwrap();

        assert_eq!(mdat.header_size(), 8);
        assert_eq!(streamed.len() as u64, mdat.size());
        assert_eq!(&streamed[..], &buffered[..]);
        assert_eq!(&streamed[8..], b"sample data");
    }
}
