use four_cc::FourCC;

use bytes::BufMut;

use std::io;

use tracing::debug;

use crate::{fourcc_str, BoxHeader, DecodeBox, Error, InfoLevels, Mp4Box, Result};

use super::{TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentHeaderBox, TrackFragmentRunBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentBox {
    pub tfhd: TrackFragmentHeaderBox,
    pub track_runs: Vec<TrackFragmentRunBox>,
    pub base_media_decode_time: Option<TrackFragmentBaseMediaDecodeTimeBox>,
}

impl TrackFragmentBox {
    pub fn new(
        tfhd: TrackFragmentHeaderBox,
        track_runs: Vec<TrackFragmentRunBox>,
        base_media_decode_time: Option<TrackFragmentBaseMediaDecodeTimeBox>,
    ) -> Self {
        TrackFragmentBox {
            tfhd,
            track_runs,
            base_media_decode_time,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.tfhd.track_id
    }

    pub fn sample_count(&self) -> usize {
        self.track_runs.iter().map(|r| r.samples.len()).sum()
    }
}

impl Mp4Box for TrackFragmentBox {
    const NAME: FourCC = FourCC(*b"traf");

    fn content_size(&self) -> u64 {
        let mut size = self.tfhd.size();

        for trun in &self.track_runs {
            size += trun.size();
        }

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            size += base_media_decode_time.size();
        }

        size
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        self.tfhd.write(writer)?;

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            base_media_decode_time.write(writer)?;
        }

        for run in &self.track_runs {
            run.write(writer)?;
        }

        Ok(())
    }

    fn describe_contents<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        levels: &InfoLevels,
        _level: u32,
        indent: &str,
        indent_step: &str,
    ) -> Result<()> {
        self.tfhd.describe(w, levels, indent, indent_step)?;

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            base_media_decode_time.describe(w, levels, indent, indent_step)?;
        }

        for run in &self.track_runs {
            run.describe(w, levels, indent, indent_step)?;
        }

        Ok(())
    }
}

impl DecodeBox for TrackFragmentBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut tfhd = None;
        let mut base_media_decode_time = None;
        let mut track_runs = Vec::new();

        let mut offset = 0;
        while offset < contents.len() {
            let rest = &contents[offset..];
            let header = BoxHeader::parse(rest)?;
            let child = &rest[..header.size as usize];

            match &header.name.0 {
                b"tfhd" if tfhd.is_none() => {
                    tfhd = Some(TrackFragmentHeaderBox::decode(child)?.0);
                }
                b"tfdt" if base_media_decode_time.is_none() => {
                    base_media_decode_time =
                        Some(TrackFragmentBaseMediaDecodeTimeBox::decode(child)?.0);
                }
                b"trun" => {
                    track_runs.push(TrackFragmentRunBox::decode(child)?.0);
                }
                _ => {
                    debug!(
                        "Skipping {} box ({} bytes) in traf",
                        fourcc_str(&header.name),
                        header.size
                    );
                }
            }

            offset += header.size as usize;
        }

        let tfhd = tfhd.ok_or(Error::MissingBox {
            name: "tfhd",
            parent: "traf",
        })?;

        Ok(TrackFragmentBox::new(tfhd, track_runs, base_media_decode_time))
    }
}
