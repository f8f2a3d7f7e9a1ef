use four_cc::FourCC;

use bytes::BufMut;

use std::io;
use std::mem::size_of;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, FullBoxHeader, InfoLevels, Mp4Box, Result};

/// Per-track sample defaults, normally found in the init segment's `mvex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackExtendsBox {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl TrackExtendsBox {
    pub fn new(
        track_id: u32,
        default_sample_description_index: u32,
        default_sample_duration: u32,
        default_sample_size: u32,
        default_sample_flags: u32,
    ) -> Self {
        TrackExtendsBox {
            track_id,
            default_sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
        }
    }
}

impl Mp4Box for TrackExtendsBox {
    const NAME: FourCC = FourCC(*b"trex");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // track_ID
        size_of::<u32>() as u64 + // default_sample_description_index
        size_of::<u32>() as u64 + // default_sample_duration
        size_of::<u32>() as u64 + // default_sample_size
        size_of::<u32>() as u64 // default_sample_flags
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_u32(self.track_id);
        writer.put_u32(self.default_sample_description_index);
        writer.put_u32(self.default_sample_duration);
        writer.put_u32(self.default_sample_size);
        writer.put_u32(self.default_sample_flags);

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
        if level < 1 {
            return Ok(());
        }

        write_field(w, indent, "trackID", self.track_id)?;
        write_field(
            w,
            indent,
            "defaultSampleDescriptionIndex",
            self.default_sample_description_index,
        )?;
        write_field(w, indent, "defaultSampleDuration", self.default_sample_duration)?;
        write_field(w, indent, "defaultSampleSize", self.default_sample_size)?;
        write_field(
            w,
            indent,
            "defaultSampleFlags",
            format!("{:08x}", self.default_sample_flags),
        )
    }
}

impl DecodeBox for TrackExtendsBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("trex", contents);
        let _header = FullBoxHeader::read(&mut reader)?;

        let trex = TrackExtendsBox {
            track_id: reader.read_u32()?,
            default_sample_description_index: reader.read_u32()?,
            default_sample_duration: reader.read_u32()?,
            default_sample_size: reader.read_u32()?,
            default_sample_flags: reader.read_u32()?,
        };
        reader.finish()?;

        Ok(trex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trex_round_trip() {
        let trex = TrackExtendsBox::new(1, 1, 1024, 0, 0x0201_0000);
        let mut out = Vec::new();
        trex.encode(&mut out).unwrap();

        assert_eq!(out.len(), 32);
        assert_eq!(TrackExtendsBox::decode(&out).unwrap().0, trex);
    }
}
