use four_cc::FourCC;

use bytes::BufMut;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, FullBoxHeader, InfoLevels, Mp4Box, Result};

use std::io;
use std::mem::size_of;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackFragmentHeaderFlags: u32 {
        const BASE_DATA_OFFSET_PRESENT = 0x000001;
        const SAMPLE_DESCRIPTION_INDEX_PRESENT = 0x000002;
        const DEFAULT_SAMPLE_DURATION_PRESENT = 0x000008;
        const DEFAULT_SAMPLE_SIZE_PRESENT = 0x000010;
        const DEFAULT_SAMPLE_FLAGS_PRESENT = 0x000020;
        const DURATION_IS_EMPTY = 0x010000;
        const DEFAULT_BASE_IS_MOOF = 0x020000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackFragmentHeaderBox {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub default_base_is_moof: bool,
}

impl TrackFragmentHeaderBox {
    /// A header whose data offsets are relative to the enclosing `moof`.
    pub fn new(track_id: u32) -> Self {
        TrackFragmentHeaderBox {
            track_id,
            default_base_is_moof: true,
            ..Default::default()
        }
    }

    fn flags_from_fields(&self) -> TrackFragmentHeaderFlags {
        let mut flags = TrackFragmentHeaderFlags::empty();

        if self.base_data_offset.is_some() {
            flags.insert(TrackFragmentHeaderFlags::BASE_DATA_OFFSET_PRESENT);
        }

        if self.sample_description_index.is_some() {
            flags.insert(TrackFragmentHeaderFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT);
        }

        if self.default_sample_duration.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_DURATION_PRESENT);
        }

        if self.default_sample_size.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_SIZE_PRESENT);
        }

        if self.default_sample_flags.is_some() {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_FLAGS_PRESENT);
        }

        if self.duration_is_empty {
            flags.insert(TrackFragmentHeaderFlags::DURATION_IS_EMPTY);
        }

        if self.default_base_is_moof {
            flags.insert(TrackFragmentHeaderFlags::DEFAULT_BASE_IS_MOOF);
        }

        flags
    }
}

impl Mp4Box for TrackFragmentHeaderBox {
    const NAME: FourCC = FourCC(*b"tfhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, self.flags_from_fields().bits()))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u32>() as u64; // track_ID

        if self.base_data_offset.is_some() {
            size += size_of::<u64>() as u64;
        }

        if self.sample_description_index.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_duration.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_size.is_some() {
            size += size_of::<u32>() as u64;
        }

        if self.default_sample_flags.is_some() {
            size += size_of::<u32>() as u64;
        }

        size
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_u32(self.track_id);

        if let Some(base_data_offset) = self.base_data_offset {
            writer.put_u64(base_data_offset);
        }

        if let Some(sample_description_index) = self.sample_description_index {
            writer.put_u32(sample_description_index);
        }

        if let Some(default_sample_duration) = self.default_sample_duration {
            writer.put_u32(default_sample_duration);
        }

        if let Some(default_sample_size) = self.default_sample_size {
            writer.put_u32(default_sample_size);
        }

        if let Some(default_sample_flags) = self.default_sample_flags {
            writer.put_u32(default_sample_flags);
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
        if level < 1 {
            return Ok(());
        }

        write_field(w, indent, "trackID", self.track_id)?;

        if let Some(base_data_offset) = self.base_data_offset {
            write_field(w, indent, "baseDataOffset", base_data_offset)?;
        }
        if let Some(index) = self.sample_description_index {
            write_field(w, indent, "sampleDescriptionIndex", index)?;
        }
        if let Some(duration) = self.default_sample_duration {
            write_field(w, indent, "defaultSampleDuration", duration)?;
        }
        if let Some(size) = self.default_sample_size {
            write_field(w, indent, "defaultSampleSize", size)?;
        }
        if let Some(flags) = self.default_sample_flags {
            write_field(w, indent, "defaultSampleFlags", format!("{:08x}", flags))?;
        }
        if self.duration_is_empty {
            write_field(w, indent, "durationIsEmpty", true)?;
        }
        if self.default_base_is_moof {
            write_field(w, indent, "defaultBaseIsMoof", true)?;
        }

        Ok(())
    }
}

impl DecodeBox for TrackFragmentHeaderBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("tfhd", contents);
        let header = FullBoxHeader::read(&mut reader)?;
        let flags = TrackFragmentHeaderFlags::from_bits_truncate(header.flags());

        let tfhd = TrackFragmentHeaderBox {
            track_id: reader.read_u32()?,
            duration_is_empty: flags.contains(TrackFragmentHeaderFlags::DURATION_IS_EMPTY),
            default_base_is_moof: flags.contains(TrackFragmentHeaderFlags::DEFAULT_BASE_IS_MOOF),
            ..Default::default()
        };

        decode_optional_fields(tfhd, flags, &mut reader)
    }
}

fn decode_optional_fields(
    mut tfhd: TrackFragmentHeaderBox,
    flags: TrackFragmentHeaderFlags,
    reader: &mut ContentReader<'_>,
) -> Result<TrackFragmentHeaderBox> {
    if flags.contains(TrackFragmentHeaderFlags::BASE_DATA_OFFSET_PRESENT) {
        tfhd.base_data_offset = Some(reader.read_u64()?);
    }

    if flags.contains(TrackFragmentHeaderFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT) {
        tfhd.sample_description_index = Some(reader.read_u32()?);
    }

    if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_DURATION_PRESENT) {
        tfhd.default_sample_duration = Some(reader.read_u32()?);
    }

    if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_SIZE_PRESENT) {
        tfhd.default_sample_size = Some(reader.read_u32()?);
    }

    if flags.contains(TrackFragmentHeaderFlags::DEFAULT_SAMPLE_FLAGS_PRESENT) {
        tfhd.default_sample_flags = Some(reader.read_u32()?);
    }

    reader.finish()?;

    Ok(tfhd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_follow_flags() {
        let tfhd = TrackFragmentHeaderBox {
            default_sample_duration: Some(1024),
            default_sample_flags: Some(0x0101_0000),
            ..TrackFragmentHeaderBox::new(2)
        };

        assert_eq!(tfhd.flags(), Some(0x020028));
        assert_eq!(tfhd.size(), 24);

        let mut out = Vec::new();
        tfhd.encode(&mut out).unwrap();
        let (decoded, used) = TrackFragmentHeaderBox::decode(&out).unwrap();
        assert_eq!(used, 24);
        assert_eq!(decoded, tfhd);
    }

    #[test]
    fn base_data_offset_is_64_bit() {
        let tfhd = TrackFragmentHeaderBox {
            base_data_offset: Some(u32::MAX as u64 + 10),
            default_base_is_moof: false,
            ..TrackFragmentHeaderBox::new(1)
        };

        let mut out = Vec::new();
        tfhd.encode(&mut out).unwrap();
        assert_eq!(TrackFragmentHeaderBox::decode(&out).unwrap().0, tfhd);
    }
}
