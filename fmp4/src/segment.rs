use std::io;

use tracing::{debug, trace};

use crate::{
    fourcc_str, BoxHeader, DecodeBox, EncodeOptimization, Error, FourCC, Fragment, InfoLevels,
    MediaDataBox, MovieFragmentBox, Mp4Box, Result, SegmentIndexBox, SegmentTypeBox,
    SliceWriter, TrackExtendsBox,
};

/// A borrowed box of a segment.
#[derive(Debug, Clone, Copy)]
pub enum BoxRef<'a> {
    Styp(&'a SegmentTypeBox),
    Sidx(&'a SegmentIndexBox),
    Moof(&'a MovieFragmentBox),
    Mdat(&'a MediaDataBox),
}

macro_rules! with_box {
    ($boks:expr, $b:ident => $body:expr) => {
        match $boks {
            BoxRef::Styp($b) => $body,
            BoxRef::Sidx($b) => $body,
            BoxRef::Moof($b) => $body,
            BoxRef::Mdat($b) => $body,
        }
    };
}

impl<'a> BoxRef<'a> {
    pub fn name(&self) -> FourCC {
        match self {
            BoxRef::Styp(_) => SegmentTypeBox::NAME,
            BoxRef::Sidx(_) => SegmentIndexBox::NAME,
            BoxRef::Moof(_) => MovieFragmentBox::NAME,
            BoxRef::Mdat(_) => MediaDataBox::NAME,
        }
    }

    pub fn size(&self) -> u64 {
        with_box!(self, b => b.size())
    }

    pub fn encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        with_box!(self, b => b.encode(w))
    }

    pub fn encode_sw(&self, sw: &mut SliceWriter) -> Result<()> {
        with_box!(self, b => b.encode_sw(sw))
    }

    pub fn describe<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        levels: &InfoLevels,
        indent: &str,
        indent_step: &str,
    ) -> Result<()> {
        with_box!(self, b => b.describe(w, levels, indent, indent_step))
    }
}

/// A media segment: an optional `styp`, then for every fragment the `sidx`
/// boxes that precede it followed by the fragment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSegment {
    pub styp: Option<SegmentTypeBox>,
    /// Bucket holding the first `sidx` ever appended, as its first entry.
    first_sidx: Option<usize>,
    /// `sidx` boxes written before fragment `i`. Holds one extra bucket while
    /// `sidx` boxes wait for their fragment.
    sidxs_by_fragment: Vec<Vec<SegmentIndexBox>>,
    fragments: Vec<Fragment>,
    pub encode_optimization: EncodeOptimization,
    /// Offset of the segment in the file it was read from.
    pub start_position: u64,
}

impl Default for MediaSegment {
    fn default() -> Self {
        MediaSegment::new()
    }
}

impl MediaSegment {
    /// An empty segment with the CMAF `styp`.
    pub fn new() -> Self {
        MediaSegment::with_styp(SegmentTypeBox::cmaf())
    }

    pub fn with_styp(styp: SegmentTypeBox) -> Self {
        MediaSegment {
            styp: Some(styp),
            ..MediaSegment::without_styp()
        }
    }

    pub fn without_styp() -> Self {
        MediaSegment {
            styp: None,
            first_sidx: None,
            sidxs_by_fragment: Vec::new(),
            fragments: Vec::new(),
            encode_optimization: EncodeOptimization::None,
            start_position: 0,
        }
    }

    /// Adds a `sidx` in front of the next fragment to be appended.
    pub fn append_sidx(&mut self, sidx: SegmentIndexBox) {
        let bucket = self.fragments.len();

        if self.sidxs_by_fragment.len() <= bucket {
            self.sidxs_by_fragment.push(Vec::new());
        }

        if self.first_sidx.is_none() {
            self.first_sidx = Some(bucket);
        }

        self.sidxs_by_fragment[bucket].push(sidx);
    }

    pub fn append_fragment(&mut self, fragment: Fragment) {
        if self.sidxs_by_fragment.len() <= self.fragments.len() {
            self.sidxs_by_fragment.push(Vec::new());
        }

        self.fragments.push(fragment);
    }

    pub fn last_fragment(&self) -> Option<&Fragment> {
        self.fragments.last()
    }

    pub fn last_fragment_mut(&mut self) -> Option<&mut Fragment> {
        self.fragments.last_mut()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The first `sidx` appended to the segment.
    pub fn sidx(&self) -> Option<&SegmentIndexBox> {
        self.first_sidx
            .and_then(|bucket| self.sidxs_by_fragment.get(bucket))
            .and_then(|sidxs| sidxs.first())
    }

    pub fn sidxs_for_fragment(&self, index: usize) -> &[SegmentIndexBox] {
        self.sidxs_by_fragment
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `sidx` boxes appended after the last fragment. They are neither sized
    /// nor encoded.
    pub fn trailing_sidxs(&self) -> &[SegmentIndexBox] {
        self.sidxs_for_fragment(self.fragments.len())
    }

    /// Number of `sidx` buckets, one per fragment plus possibly a trailing one.
    pub fn sidx_bucket_count(&self) -> usize {
        self.sidxs_by_fragment.len()
    }

    /// Removes every `sidx`, e.g. after the fragments they index changed.
    pub fn clear_sidxs(&mut self) {
        self.first_sidx = None;
        self.sidxs_by_fragment = vec![Vec::new(); self.fragments.len()];
    }

    /// Encoded size of the segment.
    pub fn size(&self) -> u64 {
        let mut size = self.styp.as_ref().map_or(0, |styp| styp.size());

        for (i, fragment) in self.fragments.iter().enumerate() {
            size += self
                .sidxs_for_fragment(i)
                .iter()
                .map(|sidx| sidx.size())
                .sum::<u64>();
            size += fragment.size_with(self.encode_optimization);
        }

        size
    }

    fn apply_encode_optimization(&mut self) {
        for fragment in &mut self.fragments {
            fragment.encode_optimization = self.encode_optimization;
        }
    }

    /// Writes the segment to a stream.
    pub fn encode<W: io::Write + ?Sized>(&mut self, w: &mut W) -> Result<()> {
        self.apply_encode_optimization();

        debug!(fragments = self.fragments.len(), "Encoding media segment");

        if let Some(styp) = &self.styp {
            styp.encode(w).map_err(|e| e.in_box(&SegmentTypeBox::NAME))?;
        }

        for (i, fragment) in self.fragments.iter().enumerate() {
            for sidx in self.sidxs_for_fragment(i) {
                sidx.encode(w)
                    .map_err(|e| e.in_box(&SegmentIndexBox::NAME).in_fragment(i))?;
            }

            fragment.encode(w).map_err(|e| e.in_fragment(i))?;
        }

        Ok(())
    }

    /// Writes the segment at the cursor of a buffer sized from [`size`].
    ///
    /// [`size`]: MediaSegment::size
    pub fn encode_sw(&mut self, sw: &mut SliceWriter) -> Result<()> {
        self.apply_encode_optimization();

        debug!(
            fragments = self.fragments.len(),
            offset = sw.offset(),
            "Encoding media segment"
        );

        if let Some(styp) = &self.styp {
            styp.encode_sw(sw)
                .map_err(|e| e.in_box(&SegmentTypeBox::NAME))?;
        }

        for (i, fragment) in self.fragments.iter().enumerate() {
            for sidx in self.sidxs_for_fragment(i) {
                sidx.encode_sw(sw)
                    .map_err(|e| e.in_box(&SegmentIndexBox::NAME).in_fragment(i))?;
            }

            fragment.encode_sw(sw).map_err(|e| e.in_fragment(i))?;
        }

        Ok(())
    }

    /// Writes a description of every box, in encode order.
    pub fn describe<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        levels: &InfoLevels,
        indent: &str,
        indent_step: &str,
    ) -> Result<()> {
        if let Some(styp) = &self.styp {
            styp.describe(w, levels, indent, indent_step)
                .map_err(|e| e.in_box(&SegmentTypeBox::NAME))?;
        }

        for (i, fragment) in self.fragments.iter().enumerate() {
            for sidx in self.sidxs_for_fragment(i) {
                sidx.describe(w, levels, indent, indent_step)
                    .map_err(|e| e.in_box(&SegmentIndexBox::NAME).in_fragment(i))?;
            }

            fragment
                .describe(w, levels, indent, indent_step)
                .map_err(|e| e.in_fragment(i))?;
        }

        Ok(())
    }

    /// Rebuilds the samples of the segment into new fragments that each span
    /// at least `target_duration`, except possibly the last one. Samples are
    /// never split, and a sample placed while nothing has accumulated opens a
    /// new fragment, so zero-duration samples end up alone. The segment itself
    /// is left untouched.
    ///
    /// Every fragment must hold a single track with at most one run.
    pub fn fragmentify(
        &self,
        trex: &TrackExtendsBox,
        target_duration: u32,
    ) -> Result<Vec<Fragment>> {
        for (i, fragment) in self.fragments.iter().enumerate() {
            check_single_run(fragment).map_err(|e| e.in_fragment(i))?;
        }

        let target_duration = target_duration as u64;
        let mut fragments = Vec::new();
        let mut current: Option<Fragment> = None;
        let mut accumulated: u64 = 0;

        for (i, fragment) in self.fragments.iter().enumerate() {
            let track_id = fragment
                .track_id()
                .ok_or(Error::MissingBox {
                    name: "traf",
                    parent: "moof",
                })
                .map_err(|e| e.in_fragment(i))?;

            let samples = fragment
                .full_samples(Some(trex))
                .map_err(|e| e.in_fragment(i))?;

            for sample in samples {
                let duration = sample.duration as u64;

                if accumulated == 0 {
                    if let Some(done) = current.take() {
                        close_fragment(&mut fragments, done, 0);
                    }
                }

                current
                    .get_or_insert_with(|| Fragment::new(fragment.sequence_number(), track_id))
                    .append_full_sample_to_track(sample, track_id)
                    .map_err(|e| e.in_fragment(i))?;

                accumulated += duration;

                if accumulated >= target_duration {
                    if let Some(done) = current.take() {
                        close_fragment(&mut fragments, done, accumulated);
                    }

                    accumulated = 0;
                }
            }
        }

        if let Some(rest) = current {
            close_fragment(&mut fragments, rest, accumulated);
        }

        Ok(fragments)
    }

    /// The sample duration shared by every sample of every fragment.
    /// An empty segment reports 0.
    pub fn common_sample_duration(&self, trex: Option<&TrackExtendsBox>) -> Result<u32> {
        let trex = trex.ok_or(Error::MissingDefaults)?;

        let mut common = None;
        for (i, fragment) in self.fragments.iter().enumerate() {
            let duration = fragment
                .common_sample_duration(trex)
                .map_err(|e| e.in_fragment(i))?;

            match common {
                None => common = Some(duration),
                Some(expected) if expected != duration => {
                    return Err(Error::DurationMismatch {
                        fragment: i + 1,
                        expected,
                        found: duration,
                    })
                }
                Some(_) => {}
            }
        }

        Ok(common.unwrap_or(0))
    }

    /// The box that starts the segment: `styp`, else the first `sidx` in
    /// front of the first fragment, else the first fragment's `moof`.
    pub fn first_box(&self) -> Result<BoxRef<'_>> {
        if let Some(styp) = &self.styp {
            return Ok(BoxRef::Styp(styp));
        }

        if let Some(sidx) = self.sidxs_for_fragment(0).first() {
            return Ok(BoxRef::Sidx(sidx));
        }

        self.fragments
            .first()
            .map(|fragment| fragment.children()[0])
            .ok_or(Error::NoBoxes)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        MediaSegment::decode_at(data, 0)
    }

    /// Reads a segment that starts `start_position` bytes into its file.
    pub fn decode_at(data: &[u8], start_position: u64) -> Result<Self> {
        let mut segment = MediaSegment::without_styp();
        segment.start_position = start_position;

        let mut pos = 0;
        while pos < data.len() {
            let rest = &data[pos..];
            let header = BoxHeader::parse(rest)?;

            match &header.name.0 {
                b"styp" => {
                    if pos != 0 {
                        return Err(Error::UnexpectedBox {
                            name: fourcc_str(&header.name),
                            context: "styp after the start of the segment",
                        });
                    }

                    segment.styp = Some(SegmentTypeBox::decode(rest)?.0);
                }
                b"sidx" => segment.append_sidx(SegmentIndexBox::decode(rest)?.0),
                b"moof" => {
                    let index = segment.fragments.len();
                    let (fragment, used) =
                        Fragment::decode(rest).map_err(|e| e.in_fragment(index))?;

                    trace!(
                        sequence_number = fragment.sequence_number(),
                        samples = fragment.sample_count(),
                        "Decoded fragment"
                    );

                    segment.append_fragment(fragment);
                    pos += used;
                    continue;
                }
                b"mdat" => {
                    return Err(Error::UnexpectedBox {
                        name: fourcc_str(&header.name),
                        context: "mdat without a preceding moof",
                    })
                }
                _ => debug!(
                    name = %fourcc_str(&header.name),
                    size = header.size,
                    "Skipping box"
                ),
            }

            pos += header.size as usize;
        }

        Ok(segment)
    }
}

fn close_fragment(fragments: &mut Vec<Fragment>, fragment: Fragment, duration: u64) {
    debug!(
        sequence_number = fragment.sequence_number(),
        samples = fragment.sample_count(),
        duration,
        "Closed fragment"
    );

    fragments.push(fragment);
}

fn check_single_run(fragment: &Fragment) -> Result<()> {
    match fragment.moof().trafs.as_slice() {
        [traf] if traf.track_runs.len() <= 1 => Ok(()),
        [traf] => Err(Error::unsupported(format!(
            "refragmenting a track fragment with {} runs",
            traf.track_runs.len()
        ))),
        trafs => Err(Error::unsupported(format!(
            "refragmenting a fragment with {} track fragments",
            trafs.len()
        ))),
    }
}
