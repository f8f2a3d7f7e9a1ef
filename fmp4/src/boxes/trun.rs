use four_cc::FourCC;

use bytes::BufMut;

use std::io;
use std::mem::size_of;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, Error, FullBoxHeader, InfoLevels, Mp4Box, Result};

/// Upper bound on the sample count of a run whose samples carry no fields.
const MAX_SAMPLES_WITHOUT_FIELDS: usize = 1 << 20;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackFragmentRunFlags: u32 {
        const DATA_OFFSET_PRESENT = 0x00000001;
        const FIRST_SAMPLE_FLAGS_PRESENT = 0x00000004;
        const SAMPLE_DURATION_PRESENT = 0x00000100;
        const SAMPLE_SIZE_PRESENT = 0x00000200;
        const SAMPLE_FLAGS_PRESENT = 0x00000400;
        const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT = 0x00000800;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackFragmentSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackFragmentRunBox {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrackFragmentSample>,
}

impl TrackFragmentRunBox {
    pub fn new(
        data_offset: Option<i32>,
        first_sample_flags: Option<u32>,
        samples: Vec<TrackFragmentSample>,
    ) -> Self {
        TrackFragmentRunBox {
            data_offset,
            first_sample_flags,
            samples,
        }
    }

    fn sample_size(&self, flags: TrackFragmentRunFlags) -> u64 {
        let mut sample_size = 0;

        if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
            sample_size += 4; // sample_duration
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
            sample_size += 4; // sample_size
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
            sample_size += 4; // sample_flags
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT) {
            sample_size += 4; // sample_composition_time_offset
        }

        sample_size
    }

    fn flags_from_fields(&self) -> TrackFragmentRunFlags {
        let mut flags = TrackFragmentRunFlags::empty();

        if self.data_offset.is_some() {
            flags.insert(TrackFragmentRunFlags::DATA_OFFSET_PRESENT);
        }

        if self.first_sample_flags.is_some() {
            flags.insert(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT);
        }

        if let Some(sample) = self.samples.first() {
            if sample.duration.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT);
            }

            if sample.size.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT);
            }

            if sample.flags.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT);
            }

            if sample.composition_time_offset.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT);
            }
        }

        flags
    }

    /// Signed composition offsets need version 1.
    fn version(&self) -> u8 {
        let negative_offset = self
            .samples
            .iter()
            .any(|s| s.composition_time_offset.map_or(false, |o| o < 0));

        if negative_offset {
            1
        } else {
            0
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Mp4Box for TrackFragmentRunBox {
    const NAME: FourCC = FourCC(*b"trun");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(
            self.version(),
            self.flags_from_fields().bits(),
        ))
    }

    fn content_size(&self) -> u64 {
        let flags = self.flags_from_fields();

        let mut size = 0;

        size += size_of::<u32>() as u64; // sample_count

        if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            size += size_of::<i32>() as u64; // data_offset
        }

        if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT) {
            size += size_of::<u32>() as u64; // first_sample_flags
        }

        size += self.sample_size(flags) * self.samples.len() as u64;

        size
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        let sample_count = u32::try_from(self.samples.len())
            .map_err(|_| Error::invalid("trun", "too many samples"))?;
        writer.put_u32(sample_count);

        if let Some(data_offset) = self.data_offset {
            writer.put_i32(data_offset);
        }

        if let Some(first_sample_flags) = self.first_sample_flags {
            writer.put_u32(first_sample_flags);
        }

        let flags = self.flags_from_fields();
        for (i, sample) in self.samples.iter().enumerate() {
            ensure_sample_fields_present(i, sample, flags)?;

            if let Some(duration) = sample.duration {
                writer.put_u32(duration);
            }

            if let Some(size) = sample.size {
                writer.put_u32(size);
            }

            if let Some(flags) = sample.flags {
                writer.put_u32(flags);
            }

            if let Some(composition_time_offset) = sample.composition_time_offset {
                writer.put_i32(composition_time_offset);
            }
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

        write_field(w, indent, "sampleCount", self.samples.len())?;

        if let Some(data_offset) = self.data_offset {
            write_field(w, indent, "dataOffset", data_offset)?;
        }
        if let Some(flags) = self.first_sample_flags {
            write_field(w, indent, "firstSampleFlags", format!("{:08x}", flags))?;
        }

        if level >= 2 {
            for (i, sample) in self.samples.iter().enumerate() {
                let mut line = String::new();
                if let Some(duration) = sample.duration {
                    line += &format!(" dur={}", duration);
                }
                if let Some(size) = sample.size {
                    line += &format!(" size={}", size);
                }
                if let Some(flags) = sample.flags {
                    line += &format!(" flags={:08x}", flags);
                }
                if let Some(offset) = sample.composition_time_offset {
                    line += &format!(" compTimeOffset={}", offset);
                }

                write_field(w, indent, &format!("sample[{}]", i + 1), line.trim_start())?;
            }
        }

        Ok(())
    }
}

impl DecodeBox for TrackFragmentRunBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("trun", contents);
        let header = FullBoxHeader::read(&mut reader)?;
        let flags = TrackFragmentRunFlags::from_bits_truncate(header.flags());

        let sample_count = reader.read_u32()? as usize;

        let data_offset = if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            Some(reader.read_i32()?)
        } else {
            None
        };

        let first_sample_flags = if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT)
        {
            Some(reader.read_u32()?)
        } else {
            None
        };

        let run = TrackFragmentRunBox::new(data_offset, first_sample_flags, Vec::new());
        let per_sample = run.sample_size(flags) as usize;
        if per_sample == 0 && sample_count > MAX_SAMPLES_WITHOUT_FIELDS {
            return Err(Error::invalid(
                "trun",
                format!("{} samples without per-sample fields", sample_count),
            ));
        }

        if per_sample.checked_mul(sample_count) != Some(reader.remaining()) {
            return Err(Error::invalid(
                "trun",
                format!(
                    "{} samples of {} bytes do not fit {} bytes",
                    sample_count,
                    per_sample,
                    reader.remaining()
                ),
            ));
        }

        let mut samples = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            let mut sample = TrackFragmentSample::default();

            if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
                sample.duration = Some(reader.read_u32()?);
            }

            if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
                sample.size = Some(reader.read_u32()?);
            }

            if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
                sample.flags = Some(reader.read_u32()?);
            }

            if flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT) {
                // version 0 offsets are unsigned, keep the bits either way
                sample.composition_time_offset = Some(reader.read_i32()?);
            }

            samples.push(sample);
        }

        Ok(TrackFragmentRunBox { samples, ..run })
    }
}

fn ensure_sample_fields_present(
    index: usize,
    sample: &TrackFragmentSample,
    flags: TrackFragmentRunFlags,
) -> Result<()> {
    let expected = [
        flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT),
    ];
    let present = [
        sample.duration.is_some(),
        sample.size.is_some(),
        sample.flags.is_some(),
        sample.composition_time_offset.is_some(),
    ];

    if expected != present {
        return Err(Error::invalid(
            "trun",
            format!(
                "sample {} does not carry the same fields as the first sample",
                index + 1
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sample(duration: u32, size: u32, cto: i32) -> TrackFragmentSample {
        TrackFragmentSample {
            duration: Some(duration),
            size: Some(size),
            flags: Some(0x0101_0000),
            composition_time_offset: Some(cto),
        }
    }

    #[test]
    fn size_matches_written_bytes() {
        let trun = TrackFragmentRunBox::new(
            Some(100),
            None,
            vec![full_sample(1024, 10, 0), full_sample(1024, 20, 512)],
        );

        let mut out = Vec::new();
        trun.encode(&mut out).unwrap();

        // header 12 + count 4 + offset 4 + two samples of 16
        assert_eq!(out.len(), 52);
        assert_eq!(trun.size(), 52);
        assert_eq!(trun.flags(), Some(0x000f01));

        let (decoded, _) = TrackFragmentRunBox::decode(&out).unwrap();
        assert_eq!(decoded, trun);
    }

    #[test]
    fn negative_offsets_use_version_one() {
        let trun = TrackFragmentRunBox::new(None, None, vec![full_sample(1, 1, -2)]);
        assert_eq!(trun.get_full_box_header().unwrap().version(), 1);
    }

    #[test]
    fn mixed_sample_fields_are_rejected() {
        let mut second = full_sample(1024, 10, 0);
        second.duration = None;
        let trun = TrackFragmentRunBox::new(None, None, vec![full_sample(1024, 10, 0), second]);

        let mut out = Vec::new();
        assert!(matches!(
            trun.encode(&mut out),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn sample_count_must_match_contents() {
        let trun = TrackFragmentRunBox::new(None, None, vec![full_sample(1, 1, 0)]);
        let mut out = Vec::new();
        trun.encode(&mut out).unwrap();

        // claim two samples
        out[15] = 2;
        assert!(TrackFragmentRunBox::decode(&out).is_err());
    }

    #[test]
    fn huge_count_without_fields_is_rejected() {
        // version 0, no flags, sample_count 0xffffffff
        let contents = [0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];

        assert!(matches!(
            TrackFragmentRunBox::decode_box_contents(&contents),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn samples_without_fields_decode_to_defaults() {
        let contents = [0, 0, 0, 0, 0, 0, 0, 3];
        let trun = TrackFragmentRunBox::decode_box_contents(&contents).unwrap();

        assert_eq!(trun.samples, vec![TrackFragmentSample::default(); 3]);
    }
}
