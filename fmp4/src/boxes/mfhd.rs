use four_cc::FourCC;

use bytes::BufMut;

use std::io;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, FullBoxHeader, InfoLevels, Mp4Box, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentHeaderBox {
    pub sequence_number: u32,
}

impl MovieFragmentHeaderBox {
    pub fn new(sequence_number: u32) -> Self {
        MovieFragmentHeaderBox { sequence_number }
    }
}

impl Mp4Box for MovieFragmentHeaderBox {
    const NAME: FourCC = FourCC(*b"mfhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        4
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_u32(self.sequence_number);

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
            write_field(w, indent, "sequenceNumber", self.sequence_number)?;
        }

        Ok(())
    }
}

impl DecodeBox for MovieFragmentHeaderBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("mfhd", contents);
        let _header = FullBoxHeader::read(&mut reader)?;
        let sequence_number = reader.read_u32()?;
        reader.finish()?;

        Ok(MovieFragmentHeaderBox { sequence_number })
    }
}
