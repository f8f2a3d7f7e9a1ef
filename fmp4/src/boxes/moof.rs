use four_cc::FourCC;

use bytes::BufMut;

use std::io;

use tracing::debug;

use crate::{fourcc_str, BoxHeader, DecodeBox, Error, InfoLevels, Mp4Box, Result};

use super::{MovieFragmentHeaderBox, TrackFragmentBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentBox {
    pub mfhd: MovieFragmentHeaderBox,
    pub trafs: Vec<TrackFragmentBox>,
}

impl MovieFragmentBox {
    pub fn new(mfhd: MovieFragmentHeaderBox, trafs: Vec<TrackFragmentBox>) -> Self {
        MovieFragmentBox { mfhd, trafs }
    }

    /// The first track fragment.
    pub fn traf(&self) -> Option<&TrackFragmentBox> {
        self.trafs.first()
    }

    pub fn traf_for_track(&self, track_id: u32) -> Option<&TrackFragmentBox> {
        self.trafs.iter().find(|t| t.tfhd.track_id == track_id)
    }
}

impl Mp4Box for MovieFragmentBox {
    const NAME: FourCC = FourCC(*b"moof");

    fn content_size(&self) -> u64 {
        self.mfhd.size() + self.trafs.iter().map(|t| t.size()).sum::<u64>()
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        self.mfhd.write(writer)?;

        for traf in &self.trafs {
            traf.write(writer)?;
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
        self.mfhd.describe(w, levels, indent, indent_step)?;

        for traf in &self.trafs {
            traf.describe(w, levels, indent, indent_step)?;
        }

        Ok(())
    }
}

impl DecodeBox for MovieFragmentBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut mfhd = None;
        let mut trafs = Vec::new();

        let mut offset = 0;
        while offset < contents.len() {
            let rest = &contents[offset..];
            let header = BoxHeader::parse(rest)?;
            let child = &rest[..header.size as usize];

            match &header.name.0 {
                b"mfhd" if mfhd.is_none() => {
                    mfhd = Some(MovieFragmentHeaderBox::decode(child)?.0);
                }
                b"traf" => {
                    trafs.push(TrackFragmentBox::decode(child)?.0);
                }
                _ => {
                    debug!(
                        "Skipping {} box ({} bytes) in moof",
                        fourcc_str(&header.name),
                        header.size
                    );
                }
            }

            offset += header.size as usize;
        }

        let mfhd = mfhd.ok_or(Error::MissingBox {
            name: "mfhd",
            parent: "moof",
        })?;

        Ok(MovieFragmentBox::new(mfhd, trafs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentHeaderBox, TrackFragmentRunBox,
        TrackFragmentSample,
    };

    fn moof() -> MovieFragmentBox {
        MovieFragmentBox::new(
            MovieFragmentHeaderBox::new(3),
            vec![TrackFragmentBox::new(
                TrackFragmentHeaderBox::new(1),
                vec![TrackFragmentRunBox::new(
                    Some(0),
                    None,
                    vec![TrackFragmentSample {
                        duration: Some(1800),
                        size: Some(5),
                        flags: None,
                        composition_time_offset: None,
                    }],
                )],
                Some(TrackFragmentBaseMediaDecodeTimeBox::new(0)),
            )],
        )
    }

    #[test]
    fn nested_sizes_add_up() {
        let moof = moof();
        let mut out = Vec::new();
        moof.encode(&mut out).unwrap();

        assert_eq!(out.len() as u64, moof.size());
        assert_eq!(MovieFragmentBox::decode(&out).unwrap().0, moof);
    }

    #[test]
    fn unknown_children_are_skipped() {
        let moof = moof();
        let mut contents = Vec::new();
        moof.mfhd.encode(&mut contents).unwrap();
        contents.extend_from_slice(&[0, 0, 0, 12, b'p', b's', b's', b'h', 1, 2, 3, 4]);
        moof.trafs[0].encode(&mut contents).unwrap();

        let decoded = MovieFragmentBox::decode_box_contents(&contents).unwrap();
        assert_eq!(decoded, moof);
    }

    #[test]
    fn missing_mfhd_is_an_error() {
        let mut contents = Vec::new();
        moof().trafs[0].encode(&mut contents).unwrap();

        assert!(matches!(
            MovieFragmentBox::decode_box_contents(&contents),
            Err(Error::MissingBox { name: "mfhd", .. })
        ));
    }

    #[test]
    fn describe_indents_children() {
        let mut out = Vec::new();
        moof()
            .describe(&mut out, &InfoLevels::all(1), "", "  ")
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("[moof] size="));
        assert!(lines[1].starts_with("  [mfhd]"));
        assert_eq!(lines[2], "     - sequenceNumber: 3");
        assert!(text.contains("    [tfhd]"));
        assert!(text.contains("      - trackID: 1"));
    }
}
