use std::borrow::Cow;
use std::io;

use bytes::Bytes;

use crate::segment::BoxRef;
use crate::{
    BoxHeader, DecodeBox, Error, FullSample, InfoLevels, MediaDataBox, MovieFragmentBox,
    MovieFragmentHeaderBox, Mp4Box, Result, SliceWriter, TrackExtendsBox,
    TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentBox, TrackFragmentHeaderBox,
    TrackFragmentRunBox, TrackFragmentSample,
};

/// How runs are laid out when a fragment is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeOptimization {
    /// Write runs as stored.
    #[default]
    None,
    /// Move values shared by every sample of a run into the `tfhd` defaults
    /// (and `first_sample_flags`), leaving the per-sample fields empty.
    Trun,
}

/// A `moof` and the `mdat` holding its samples.
///
/// Data offsets of the runs are kept pointing into the `mdat` payload as
/// samples are appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    moof: MovieFragmentBox,
    mdat: MediaDataBox,
    /// Projected in by the owning segment before each encode.
    pub encode_optimization: EncodeOptimization,
}

impl Fragment {
    /// An empty single-track fragment.
    pub fn new(sequence_number: u32, track_id: u32) -> Self {
        Fragment::with_tracks(sequence_number, &[track_id])
    }

    /// An empty fragment with one track fragment per track id, in order.
    pub fn with_tracks(sequence_number: u32, track_ids: &[u32]) -> Self {
        let trafs = track_ids
            .iter()
            .map(|&track_id| {
                TrackFragmentBox::new(
                    TrackFragmentHeaderBox::new(track_id),
                    Vec::new(),
                    Some(TrackFragmentBaseMediaDecodeTimeBox::new(0)),
                )
            })
            .collect();

        Fragment {
            moof: MovieFragmentBox::new(MovieFragmentHeaderBox::new(sequence_number), trafs),
            mdat: MediaDataBox::default(),
            encode_optimization: EncodeOptimization::None,
        }
    }

    /// Wraps boxes whose data offsets already point into `mdat`.
    pub fn from_parts(moof: MovieFragmentBox, mdat: MediaDataBox) -> Self {
        Fragment {
            moof,
            mdat,
            encode_optimization: EncodeOptimization::None,
        }
    }

    /// Decodes a `moof` and the `mdat` that follows it. Returns the fragment
    /// and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Fragment, usize)> {
        let (moof, moof_size) = MovieFragmentBox::decode(data)?;

        let rest = &data[moof_size..];
        let mdat_header = match BoxHeader::parse(rest) {
            Ok(header) if header.is(b"mdat") => header,
            _ => {
                return Err(Error::MissingBox {
                    name: "mdat",
                    parent: "fragment",
                })
            }
        };
        let (mdat, mdat_size) = MediaDataBox::decode(rest)?;

        // Skipped children or a different header form change the moof
        // layout, so offsets are moved to match the re-encoded form.
        let original_base = moof_size as u64 + mdat_header.header_size;
        let mut fragment = Fragment::from_parts(moof, mdat);
        let delta = fragment.data_base() as i64 - original_base as i64;
        shift_data_offsets(&mut fragment.moof, delta)?;

        Ok((fragment, moof_size + mdat_size))
    }

    pub fn moof(&self) -> &MovieFragmentBox {
        &self.moof
    }

    pub fn mdat(&self) -> &MediaDataBox {
        &self.mdat
    }

    pub fn into_parts(self) -> (MovieFragmentBox, MediaDataBox) {
        (self.moof, self.mdat)
    }

    pub fn sequence_number(&self) -> u32 {
        self.moof.mfhd.sequence_number
    }

    /// Track id of the first track fragment.
    pub fn track_id(&self) -> Option<u32> {
        self.moof.traf().map(|t| t.tfhd.track_id)
    }

    pub fn track_ids(&self) -> Vec<u32> {
        self.moof.trafs.iter().map(|t| t.tfhd.track_id).collect()
    }

    pub fn sample_count(&self) -> usize {
        self.moof.trafs.iter().map(|t| t.sample_count()).sum()
    }

    /// The boxes of the fragment in stream order.
    pub fn children(&self) -> [BoxRef<'_>; 2] {
        [BoxRef::Moof(&self.moof), BoxRef::Mdat(&self.mdat)]
    }

    /// Offset of the `mdat` payload from the start of the `moof`.
    fn data_base(&self) -> u64 {
        self.moof.size() + self.mdat.header_size()
    }

    /// Samples of the only track fragment, or of the one matching `trex`
    /// when there are several.
    pub fn full_samples(&self, trex: Option<&TrackExtendsBox>) -> Result<Vec<FullSample>> {
        let index = self.select_traf(trex)?;
        self.resolve_samples(index, trex)
    }

    pub fn track_full_samples(
        &self,
        track_id: u32,
        trex: Option<&TrackExtendsBox>,
    ) -> Result<Vec<FullSample>> {
        let index = self
            .moof
            .trafs
            .iter()
            .position(|t| t.tfhd.track_id == track_id)
            .ok_or(Error::TrackNotFound(track_id))?;

        self.resolve_samples(index, trex)
    }

    fn select_traf(&self, trex: Option<&TrackExtendsBox>) -> Result<usize> {
        match (self.moof.trafs.len(), trex) {
            (0, _) => Err(Error::MissingBox {
                name: "traf",
                parent: "moof",
            }),
            (1, _) => Ok(0),
            (_, Some(trex)) => self
                .moof
                .trafs
                .iter()
                .position(|t| t.tfhd.track_id == trex.track_id)
                .ok_or(Error::TrackNotFound(trex.track_id)),
            (n, None) => Err(Error::unsupported(format!(
                "fragment has {} track fragments and no track was selected",
                n
            ))),
        }
    }

    fn resolve_samples(
        &self,
        traf_index: usize,
        trex: Option<&TrackExtendsBox>,
    ) -> Result<Vec<FullSample>> {
        let traf = &self.moof.trafs[traf_index];
        let tfhd = &traf.tfhd;

        if tfhd.base_data_offset.is_some() {
            return Err(Error::unsupported("absolute base data offsets"));
        }

        if traf_index > 0 && !tfhd.default_base_is_moof {
            return Err(Error::unsupported(
                "data offsets relative to a previous track fragment",
            ));
        }

        let data_base = self.data_base() as i64;
        let available = self.mdat.data.len() as u64;

        let mut decode_time = traf
            .base_media_decode_time
            .as_ref()
            .map_or(0, |t| t.base_media_decode_time);
        let mut position: u64 = 0;
        let mut samples = Vec::with_capacity(traf.sample_count());

        for run in &traf.track_runs {
            if let Some(data_offset) = run.data_offset {
                let relative = data_offset as i64 - data_base;
                if relative < 0 {
                    return Err(Error::invalid(
                        "trun",
                        format!("data offset {} points before the mdat payload", data_offset),
                    ));
                }
                position = relative as u64;
            }

            for (i, entry) in run.samples.iter().enumerate() {
                let duration = entry
                    .duration
                    .or(tfhd.default_sample_duration)
                    .or(trex.map(|t| t.default_sample_duration))
                    .ok_or(Error::MissingDefaults)?;

                let size = entry
                    .size
                    .or(tfhd.default_sample_size)
                    .or(trex.map(|t| t.default_sample_size))
                    .ok_or(Error::MissingDefaults)?;

                let first_flags = if i == 0 { run.first_sample_flags } else { None };
                let flags = first_flags
                    .or(entry.flags)
                    .or(tfhd.default_sample_flags)
                    .or(trex.map(|t| t.default_sample_flags))
                    .ok_or(Error::MissingDefaults)?;

                let end = position + size as u64;
                if end > available {
                    return Err(Error::SampleDataOutOfRange {
                        offset: position,
                        size: size as u64,
                        available,
                    });
                }

                samples.push(FullSample {
                    flags,
                    duration,
                    size,
                    composition_time_offset: entry.composition_time_offset.unwrap_or(0),
                    decode_time,
                    data: Bytes::copy_from_slice(&self.mdat.data[position as usize..end as usize]),
                });

                position = end;
                decode_time += duration as u64;
            }
        }

        Ok(samples)
    }

    /// Appends to the only track fragment.
    pub fn append_full_sample(&mut self, sample: FullSample) -> Result<()> {
        let track_id = match self.moof.trafs.as_slice() {
            [traf] => traf.tfhd.track_id,
            trafs => {
                return Err(Error::unsupported(format!(
                    "fragment has {} track fragments, append to a track instead",
                    trafs.len()
                )))
            }
        };

        self.append_full_sample_to_track(sample, track_id)
    }

    /// Appends a sample to the track fragment of `track_id` and its payload
    /// to the `mdat`.
    ///
    /// Payloads are stored track by track, so once a track fragment has data
    /// the ones before it cannot take more samples.
    pub fn append_full_sample_to_track(&mut self, sample: FullSample, track_id: u32) -> Result<()> {
        let index = self
            .moof
            .trafs
            .iter()
            .position(|t| t.tfhd.track_id == track_id)
            .ok_or(Error::TrackNotFound(track_id))?;

        if self.moof.trafs[index + 1..]
            .iter()
            .any(|t| t.sample_count() > 0)
        {
            return Err(Error::InterleavedTrackData(track_id));
        }

        if sample.data.len() as u64 != sample.size as u64 {
            return Err(Error::invalid(
                "mdat",
                format!(
                    "sample size {} does not match {} payload bytes",
                    sample.size,
                    sample.data.len()
                ),
            ));
        }

        let entry = TrackFragmentSample {
            duration: Some(sample.duration),
            size: Some(sample.size),
            flags: Some(sample.flags),
            composition_time_offset: Some(sample.composition_time_offset),
        };

        let old_base = self.data_base();
        let payload_position = self.mdat.data.len() as u64;

        let traf = &mut self.moof.trafs[index];
        if traf.tfhd.base_data_offset.is_some() {
            return Err(Error::unsupported("absolute base data offsets"));
        }

        let first_sample = traf.sample_count() == 0;
        if first_sample {
            traf.track_runs.clear();
            traf.tfhd.default_base_is_moof = true;

            match traf.base_media_decode_time.as_mut() {
                Some(tfdt) => tfdt.base_media_decode_time = sample.decode_time,
                None => {
                    traf.base_media_decode_time =
                        Some(TrackFragmentBaseMediaDecodeTimeBox::new(sample.decode_time))
                }
            }
        }

        let same_layout = traf
            .track_runs
            .last()
            .and_then(|run| run.samples.first())
            .map_or(false, |s| same_fields(s, &entry));

        if !same_layout {
            if index > 0 && !traf.tfhd.default_base_is_moof {
                return Err(Error::unsupported(
                    "new run in a track fragment without default-base-is-moof",
                ));
            }

            // placed as if the moof had not grown; the shift below fixes it up
            let data_offset = offset_to_i32(old_base + payload_position)?;
            traf.track_runs
                .push(TrackFragmentRunBox::new(Some(data_offset), None, Vec::new()));
        }

        if let Some(run) = traf.track_runs.last_mut() {
            run.samples.push(entry);
        }

        self.mdat.data.extend_from_slice(&sample.data);

        let delta = self.data_base() as i64 - old_base as i64;
        shift_data_offsets(&mut self.moof, delta)
    }

    /// The sample duration shared by every sample of the selected track, if
    /// there is one and it is not zero.
    pub fn common_sample_duration(&self, trex: &TrackExtendsBox) -> Result<u32> {
        let traf = &self.moof.trafs[self.select_traf(Some(trex))?];

        let mut durations = traf.track_runs.iter().flat_map(move |run| {
            run.samples.iter().map(move |s| {
                s.duration
                    .or(traf.tfhd.default_sample_duration)
                    .unwrap_or(trex.default_sample_duration)
            })
        });

        let first = durations
            .next()
            .ok_or_else(|| Error::NoCommonDuration(String::from("no samples")))?;

        if durations.any(|d| d != first) {
            return Err(Error::NoCommonDuration(String::from(
                "sample durations differ",
            )));
        }

        if first == 0 {
            return Err(Error::NoCommonDuration(String::from("zero sample duration")));
        }

        Ok(first)
    }

    fn optimized_moof(&self, optimization: EncodeOptimization) -> Cow<'_, MovieFragmentBox> {
        match optimization {
            EncodeOptimization::None => Cow::Borrowed(&self.moof),
            EncodeOptimization::Trun => {
                let mut moof = self.moof.clone();
                moof.trafs.iter_mut().for_each(optimize_traf);
                Cow::Owned(moof)
            }
        }
    }

    fn moof_for_encoding(&self) -> Result<Cow<'_, MovieFragmentBox>> {
        match self.optimized_moof(self.encode_optimization) {
            Cow::Owned(mut moof) => {
                let delta = moof.size() as i64 - self.moof.size() as i64;
                shift_data_offsets(&mut moof, delta)?;
                Ok(Cow::Owned(moof))
            }
            borrowed => Ok(borrowed),
        }
    }

    pub fn size(&self) -> u64 {
        self.size_with(self.encode_optimization)
    }

    /// Encoded size under a given optimization.
    pub fn size_with(&self, optimization: EncodeOptimization) -> u64 {
        self.optimized_moof(optimization).size() + self.mdat.size()
    }

    pub fn encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let moof = self.moof_for_encoding()?;

        moof.encode(w)
            .map_err(|e| e.in_box(&MovieFragmentBox::NAME))?;
        self.mdat
            .encode(w)
            .map_err(|e| e.in_box(&MediaDataBox::NAME))
    }

    pub fn encode_sw(&self, sw: &mut SliceWriter) -> Result<()> {
        let moof = self.moof_for_encoding()?;

        moof.encode_sw(sw)
            .map_err(|e| e.in_box(&MovieFragmentBox::NAME))?;
        self.mdat
            .encode_sw(sw)
            .map_err(|e| e.in_box(&MediaDataBox::NAME))
    }

    pub fn describe<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        levels: &InfoLevels,
        indent: &str,
        indent_step: &str,
    ) -> Result<()> {
        self.moof.describe(w, levels, indent, indent_step)?;
        self.mdat.describe(w, levels, indent, indent_step)
    }
}

fn same_fields(a: &TrackFragmentSample, b: &TrackFragmentSample) -> bool {
    a.duration.is_some() == b.duration.is_some()
        && a.size.is_some() == b.size.is_some()
        && a.flags.is_some() == b.flags.is_some()
        && a.composition_time_offset.is_some() == b.composition_time_offset.is_some()
}

fn offset_to_i32(offset: u64) -> Result<i32> {
    i32::try_from(offset).map_err(|_| Error::invalid("trun", "data offset out of range"))
}

/// Moves the data offsets of every run whose base is the start of the moof.
/// Track fragments based on the end of the previous one's data keep theirs.
fn shift_data_offsets(moof: &mut MovieFragmentBox, delta: i64) -> Result<()> {
    if delta == 0 {
        return Ok(());
    }

    for (i, traf) in moof.trafs.iter_mut().enumerate() {
        let relative_to_moof =
            i == 0 || traf.tfhd.default_base_is_moof || traf.tfhd.base_data_offset.is_some();
        if !relative_to_moof {
            continue;
        }

        for run in &mut traf.track_runs {
            if let Some(offset) = run.data_offset.as_mut() {
                *offset = i32::try_from(*offset as i64 + delta)
                    .map_err(|_| Error::invalid("trun", "data offset out of range"))?;
            }
        }
    }

    Ok(())
}

fn uniform<T: PartialEq + Copy>(mut values: impl Iterator<Item = Option<T>>) -> Option<T> {
    let first = values.next()??;

    if values.all(|v| v == Some(first)) {
        Some(first)
    } else {
        None
    }
}

fn optimize_traf(traf: &mut TrackFragmentBox) {
    let TrackFragmentBox {
        tfhd, track_runs, ..
    } = traf;

    let run = match track_runs.as_mut_slice() {
        [run] => run,
        _ => return,
    };

    if run.samples.is_empty() {
        return;
    }

    if let Some(duration) = uniform(run.samples.iter().map(|s| s.duration)) {
        tfhd.default_sample_duration = Some(duration);
        run.samples.iter_mut().for_each(|s| s.duration = None);
    }

    if let Some(size) = uniform(run.samples.iter().map(|s| s.size)) {
        tfhd.default_sample_size = Some(size);
        run.samples.iter_mut().for_each(|s| s.size = None);
    }

    if run.first_sample_flags.is_none() {
        if let Some(flags) = uniform(run.samples.iter().map(|s| s.flags)) {
            tfhd.default_sample_flags = Some(flags);
            run.samples.iter_mut().for_each(|s| s.flags = None);
        } else if run.samples.len() > 1 && run.samples[0].flags.is_some() {
            if let Some(flags) = uniform(run.samples[1..].iter().map(|s| s.flags)) {
                run.first_sample_flags = run.samples[0].flags;
                tfhd.default_sample_flags = Some(flags);
                run.samples.iter_mut().for_each(|s| s.flags = None);
            }
        }
    }

    if run
        .samples
        .iter()
        .all(|s| s.composition_time_offset == Some(0))
    {
        run.samples
            .iter_mut()
            .for_each(|s| s.composition_time_offset = None);
    }
}
