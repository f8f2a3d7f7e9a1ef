use bytes::Bytes;
use fmp4::{
    EncodeOptimization, Fragment, FullSample, InfoLevels, MediaSegment, SegmentIndexBox,
    SegmentIndexReference, SliceWriter, TrackExtendsBox, NON_SYNC_SAMPLE_FLAG,
};

const TIMESCALE: u32 = 48000;

fn audio_fragment(sequence_number: u32, first_decode_time: u64, count: usize) -> Fragment {
    let mut fragment = Fragment::new(sequence_number, 2);

    for i in 0..count {
        let payload: Vec<u8> = (0..(100 + i * 7)).map(|b| (b + i) as u8).collect();

        fragment
            .append_full_sample(FullSample {
                flags: 0x0200_0000,
                duration: 1024,
                size: payload.len() as u32,
                composition_time_offset: 0,
                decode_time: first_decode_time + 1024 * i as u64,
                data: Bytes::from(payload),
            })
            .unwrap();
    }

    fragment
}

fn sidx_for(fragment: &Fragment, earliest_presentation_time: u64) -> SegmentIndexBox {
    SegmentIndexBox {
        earliest_presentation_time,
        references: vec![SegmentIndexReference {
            referenced_size: fragment.size() as u32,
            subsegment_duration: 1024 * fragment.sample_count() as u32,
            starts_with_sap: true,
            sap_type: 1,
            ..Default::default()
        }],
        ..SegmentIndexBox::new(2, TIMESCALE)
    }
}

fn build_segment() -> MediaSegment {
    let mut segment = MediaSegment::new();

    let mut decode_time = 0;
    for sequence_number in 1..=3 {
        let fragment = audio_fragment(sequence_number, decode_time, 10);
        segment.append_sidx(sidx_for(&fragment, decode_time));
        segment.append_fragment(fragment);
        decode_time += 10 * 1024;
    }

    segment
}

fn trex() -> TrackExtendsBox {
    TrackExtendsBox::new(2, 1, 0, 0, 0)
}

fn all_samples(segment: &MediaSegment) -> Vec<FullSample> {
    segment
        .fragments()
        .iter()
        .flat_map(|f| f.full_samples(Some(&trex())).unwrap())
        .collect()
}

#[test]
fn encoded_segment_reads_back() {
    let mut segment = build_segment();

    let mut out = Vec::new();
    segment.encode(&mut out).unwrap();
    assert_eq!(out.len() as u64, segment.size());

    let decoded = MediaSegment::decode(&out).unwrap();
    assert_eq!(decoded, segment);
    assert_eq!(all_samples(&decoded), all_samples(&segment));
    assert_eq!(decoded.sidx().unwrap().references[0].subsegment_duration, 10240);
}

#[test]
fn optimized_encoding_is_smaller_and_equivalent() {
    let mut plain = build_segment();
    let mut optimized = build_segment();
    optimized.encode_optimization = EncodeOptimization::Trun;

    assert!(optimized.size() < plain.size());

    let mut plain_bytes = Vec::new();
    plain.encode(&mut plain_bytes).unwrap();

    let mut sw = SliceWriter::with_size(optimized.size() as usize);
    optimized.encode_sw(&mut sw).unwrap();
    let optimized_bytes = sw.into_inner();
    assert_eq!(optimized_bytes.len() as u64, optimized.size());

    let from_plain = MediaSegment::decode(&plain_bytes).unwrap();
    let from_optimized = MediaSegment::decode(&optimized_bytes).unwrap();
    assert_eq!(all_samples(&from_plain), all_samples(&from_optimized));

    let tfhd = &from_optimized.fragments()[0].moof().traf().unwrap().tfhd;
    assert_eq!(tfhd.default_sample_duration, Some(1024));
    assert_eq!(tfhd.default_sample_flags, Some(0x0200_0000));
}

#[test]
fn refragmented_segment_keeps_every_sample() {
    let segment = build_segment();

    let fragments = segment.fragmentify(&trex(), 4 * 1024).unwrap();
    let counts: Vec<usize> = fragments.iter().map(|f| f.sample_count()).collect();
    assert_eq!(counts, vec![4, 4, 4, 4, 4, 4, 4, 2]);

    let mut refragmented = MediaSegment::new();
    for fragment in fragments {
        refragmented.append_fragment(fragment);
    }

    let mut out = Vec::new();
    refragmented.encode(&mut out).unwrap();
    let decoded = MediaSegment::decode(&out).unwrap();

    assert_eq!(all_samples(&decoded), all_samples(&segment));
    assert_eq!(decoded.common_sample_duration(Some(&trex())).unwrap(), 1024);
}

#[test]
fn samples_with_offsets_and_sync_flags_survive() {
    let mut fragment = Fragment::new(1, 1);
    let offsets = [2002, -1001, 0, 3003];

    for (i, &offset) in offsets.iter().enumerate() {
        fragment
            .append_full_sample(FullSample {
                flags: if i == 0 { 0 } else { NON_SYNC_SAMPLE_FLAG },
                duration: 1001,
                size: 4,
                composition_time_offset: offset,
                decode_time: 90_000 + 1001 * i as u64,
                data: Bytes::from(vec![i as u8; 4]),
            })
            .unwrap();
    }

    let mut segment = MediaSegment::without_styp();
    segment.append_fragment(fragment);
    segment.encode_optimization = EncodeOptimization::Trun;

    let mut out = Vec::new();
    segment.encode(&mut out).unwrap();
    let decoded = MediaSegment::decode(&out).unwrap();

    let samples = decoded.fragments()[0].full_samples(None).unwrap();
    let offsets_back: Vec<i32> = samples.iter().map(|s| s.composition_time_offset).collect();
    assert_eq!(offsets_back, offsets);
    assert!(samples[0].is_sync());
    assert!(!samples[3].is_sync());
    assert_eq!(samples[3].presentation_time(), 90_000 + 3003 + 3003);
}

#[test]
fn describe_honours_per_box_levels() {
    let segment = build_segment();
    let levels: InfoLevels = "all:0,trun:2".parse().unwrap();

    let mut out = Vec::new();
    segment.describe(&mut out, &levels, "", "  ").unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("[styp] size=24\n"));
    assert!(text.contains("sample[10]: dur=1024"));
    assert!(!text.contains("majorBrand"));
}
