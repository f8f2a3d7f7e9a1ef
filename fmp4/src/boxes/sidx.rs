use four_cc::FourCC;

use bytes::BufMut;

use std::io;
use std::mem::size_of;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{DecodeBox, FullBoxHeader, InfoLevels, Mp4Box, Result};

/// One entry of a segment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentIndexReference {
    /// Set when the reference points at another `sidx` instead of media.
    pub reference_type: bool,
    /// 31 bits.
    pub referenced_size: u32,
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
    /// 3 bits.
    pub sap_type: u8,
    /// 28 bits.
    pub sap_delta_time: u32,
}

impl SegmentIndexReference {
    const SIZE: u64 = 12;
}

/// Segment index box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentIndexBox {
    /// Requested version. Version 1 is used anyway when a time or offset
    /// does not fit in 32 bits.
    pub version: u8,
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    pub first_offset: u64,
    pub references: Vec<SegmentIndexReference>,
}

impl SegmentIndexBox {
    pub fn new(reference_id: u32, timescale: u32) -> Self {
        SegmentIndexBox {
            reference_id,
            timescale,
            ..Default::default()
        }
    }

    fn effective_version(&self) -> u8 {
        if self.earliest_presentation_time > u32::MAX as u64 || self.first_offset > u32::MAX as u64
        {
            1
        } else {
            self.version
        }
    }
}

impl Mp4Box for SegmentIndexBox {
    const NAME: FourCC = FourCC(*b"sidx");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.effective_version(), 0))
    }

    fn content_size(&self) -> u64 {
        let time_and_offset = if self.effective_version() == 1 {
            2 * size_of::<u64>() as u64
        } else {
            2 * size_of::<u32>() as u64
        };

        size_of::<u32>() as u64 + // reference_ID
        size_of::<u32>() as u64 + // timescale
        time_and_offset +
        size_of::<u16>() as u64 + // reserved
        size_of::<u16>() as u64 + // reference_count
        SegmentIndexReference::SIZE * self.references.len() as u64
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_u32(self.reference_id);
        writer.put_u32(self.timescale);

        if self.effective_version() == 1 {
            writer.put_u64(self.earliest_presentation_time);
            writer.put_u64(self.first_offset);
        } else {
            writer.put_u32(self.earliest_presentation_time as u32);
            writer.put_u32(self.first_offset as u32);
        }

        writer.put_u16(0); // reserved
        writer.put_u16(self.references.len() as u16); // TODO: reject more than u16::MAX references

        for reference in &self.references {
            writer.put_u32(
                ((reference.reference_type as u32) << 31)
                    | (reference.referenced_size & 0x7fff_ffff),
            );
            writer.put_u32(reference.subsegment_duration);
            writer.put_u32(
                ((reference.starts_with_sap as u32) << 31)
                    | ((reference.sap_type as u32 & 0x7) << 28)
                    | (reference.sap_delta_time & 0x0fff_ffff),
            );
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

        write_field(w, indent, "referenceID", self.reference_id)?;
        write_field(w, indent, "timeScale", self.timescale)?;
        write_field(w, indent, "earliestPresentationTime", self.earliest_presentation_time)?;
        write_field(w, indent, "firstOffset", self.first_offset)?;
        write_field(w, indent, "referenceCount", self.references.len())?;

        if level >= 2 {
            for (i, r) in self.references.iter().enumerate() {
                write_field(
                    w,
                    indent,
                    &format!("reference[{}]", i + 1),
                    format!(
                        "type={} size={} duration={} startsWithSAP={} SAPType={} SAPDeltaTime={}",
                        r.reference_type as u8,
                        r.referenced_size,
                        r.subsegment_duration,
                        r.starts_with_sap as u8,
                        r.sap_type,
                        r.sap_delta_time
                    ),
                )?;
            }
        }

        Ok(())
    }
}

impl DecodeBox for SegmentIndexBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("sidx", contents);
        let header = FullBoxHeader::read(&mut reader)?;

        let reference_id = reader.read_u32()?;
        let timescale = reader.read_u32()?;

        let (earliest_presentation_time, first_offset) = if header.version() == 1 {
            (reader.read_u64()?, reader.read_u64()?)
        } else {
            (reader.read_u32()? as u64, reader.read_u32()? as u64)
        };

        let _reserved = reader.read_u16()?;
        let reference_count = reader.read_u16()?;

        let mut references = Vec::with_capacity(reference_count as usize);
        for _ in 0..reference_count {
            let first = reader.read_u32()?;
            let subsegment_duration = reader.read_u32()?;
            let third = reader.read_u32()?;

            references.push(SegmentIndexReference {
                reference_type: first >> 31 != 0,
                referenced_size: first & 0x7fff_ffff,
                subsegment_duration,
                starts_with_sap: third >> 31 != 0,
                sap_type: ((third >> 28) & 0x7) as u8,
                sap_delta_time: third & 0x0fff_ffff,
            });
        }

        reader.finish()?;

        Ok(SegmentIndexBox {
            version: header.version(),
            reference_id,
            timescale,
            earliest_presentation_time,
            first_offset,
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sidx() -> SegmentIndexBox {
        SegmentIndexBox {
            references: vec![SegmentIndexReference {
                reference_type: false,
                referenced_size: 1234,
                subsegment_duration: 90000,
                starts_with_sap: true,
                sap_type: 1,
                sap_delta_time: 0,
            }],
            earliest_presentation_time: 1000,
            ..SegmentIndexBox::new(1, 90000)
        }
    }

    #[test]
    fn version_zero_layout() {
        let sidx = sample_sidx();
        let mut out = Vec::new();
        sidx.encode(&mut out).unwrap();

        // header 12 + ids 8 + time/offset 8 + reserved/count 4 + one reference 12
        assert_eq!(out.len(), 44);
        assert_eq!(sidx.size(), 44);
        assert_eq!(out[8], 0);

        let (decoded, _) = SegmentIndexBox::decode(&out).unwrap();
        assert_eq!(decoded, sidx);
    }

    #[test]
    fn large_times_switch_to_version_one() {
        let sidx = SegmentIndexBox {
            earliest_presentation_time: u32::MAX as u64 + 1,
            ..sample_sidx()
        };
        let mut out = Vec::new();
        sidx.encode(&mut out).unwrap();

        assert_eq!(out.len(), 52);
        assert_eq!(out[8], 1);

        let (decoded, _) = SegmentIndexBox::decode(&out).unwrap();
        assert_eq!(decoded.earliest_presentation_time, u32::MAX as u64 + 1);
        assert_eq!(decoded.references, sidx.references);
    }

    #[test]
    fn describe_lists_references_at_level_two() {
        let sidx = sample_sidx();
        let mut out = Vec::new();
        sidx.describe(&mut out, &InfoLevels::all(2), "", "  ").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[sidx] size=44"));
        assert!(text.contains("reference[1]: type=0 size=1234"));
    }
}
