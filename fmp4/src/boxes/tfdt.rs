use four_cc::FourCC;

use bytes::BufMut;

use std::io;
use std::mem::size_of;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, FullBoxHeader, InfoLevels, Mp4Box, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentBaseMediaDecodeTimeBox {
    /// Version 0 stores a 32-bit time; it is bumped to 1 when the time
    /// does not fit.
    pub version: u8,
    pub base_media_decode_time: u64,
}

impl TrackFragmentBaseMediaDecodeTimeBox {
    pub fn new(base_media_decode_time: u64) -> Self {
        TrackFragmentBaseMediaDecodeTimeBox {
            version: 1,
            base_media_decode_time,
        }
    }

    fn effective_version(&self) -> u8 {
        if self.base_media_decode_time > u32::MAX as u64 {
            1
        } else {
            self.version
        }
    }
}

impl Mp4Box for TrackFragmentBaseMediaDecodeTimeBox {
    const NAME: FourCC = FourCC(*b"tfdt");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.effective_version(), 0))
    }

    fn content_size(&self) -> u64 {
        if self.effective_version() == 1 {
            size_of::<u64>() as u64 // base_media_decode_time
        } else {
            size_of::<u32>() as u64
        }
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        if self.effective_version() == 1 {
            writer.put_u64(self.base_media_decode_time);
        } else {
            writer.put_u32(self.base_media_decode_time as u32);
        }

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
            write_field(w, indent, "baseMediaDecodeTime", self.base_media_decode_time)?;
        }

        Ok(())
    }
}

impl DecodeBox for TrackFragmentBaseMediaDecodeTimeBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("tfdt", contents);
        let header = FullBoxHeader::read(&mut reader)?;

        let base_media_decode_time = if header.version() == 1 {
            reader.read_u64()?
        } else {
            reader.read_u32()? as u64
        };
        reader.finish()?;

        Ok(TrackFragmentBaseMediaDecodeTimeBox {
            version: header.version(),
            base_media_decode_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_zero_is_kept_until_time_overflows() {
        let mut tfdt = TrackFragmentBaseMediaDecodeTimeBox {
            version: 0,
            base_media_decode_time: 42,
        };
        assert_eq!(tfdt.size(), 16);

        tfdt.base_media_decode_time = u32::MAX as u64 + 1;
        assert_eq!(tfdt.size(), 20);
        assert_eq!(tfdt.get_full_box_header().unwrap().version(), 1);
    }
}
