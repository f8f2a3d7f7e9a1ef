use bytes::Bytes;
use fmp4::{Fragment, FullSample, MediaSegment, SegmentIndexBox, TrackExtendsBox};
use proptest::prelude::*;

fn trex() -> TrackExtendsBox {
    TrackExtendsBox::new(1, 1, 0, 0, 0)
}

fn segment_from(durations: &[Vec<u32>]) -> MediaSegment {
    let mut segment = MediaSegment::new();
    let mut decode_time = 0u64;
    let mut tag = 0u8;

    for (i, run) in durations.iter().enumerate() {
        let mut fragment = Fragment::new(i as u32 + 1, 1);

        for &duration in run {
            let payload = vec![tag; 1 + tag as usize % 5];
            tag = tag.wrapping_add(1);

            fragment
                .append_full_sample(FullSample {
                    flags: 0,
                    duration,
                    size: payload.len() as u32,
                    composition_time_offset: 0,
                    decode_time,
                    data: Bytes::from(payload),
                })
                .unwrap();

            decode_time += duration as u64;
        }

        segment.append_fragment(fragment);
    }

    segment
}

fn samples_of(fragments: &[Fragment]) -> Vec<FullSample> {
    fragments
        .iter()
        .flat_map(|f| f.full_samples(Some(&trex())).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn fragmentify_bounds_and_conserves(
        durations in prop::collection::vec(prop::collection::vec(0u32..3000, 1..8), 0..6),
        target in 0u32..5000,
    ) {
        let segment = segment_from(&durations);
        let fragments = segment.fragmentify(&trex(), target).unwrap();

        for (i, fragment) in fragments.iter().enumerate() {
            let samples = fragment.full_samples(Some(&trex())).unwrap();
            prop_assert!(!samples.is_empty());

            if i + 1 < fragments.len() && samples.len() > 1 {
                let total: u64 = samples.iter().map(|s| s.duration as u64).sum();
                prop_assert!(total >= target as u64);
            }
        }

        prop_assert_eq!(samples_of(&fragments), samples_of(segment.fragments()));
    }

    #[test]
    fn sidx_buckets_track_fragments(ops in prop::collection::vec(any::<bool>(), 0..40)) {
        let mut segment = MediaSegment::without_styp();
        let mut first_reference_id = None;

        for (i, is_sidx) in ops.into_iter().enumerate() {
            if is_sidx {
                segment.append_sidx(SegmentIndexBox::new(i as u32, 1000));
                if first_reference_id.is_none() {
                    first_reference_id = Some(i as u32);
                }
            } else {
                segment.append_fragment(Fragment::new(i as u32, 1));
            }

            let fragments = segment.fragments().len();
            let buckets = segment.sidx_bucket_count();
            prop_assert!(buckets == fragments || buckets == fragments + 1);
            prop_assert_eq!(segment.sidx().map(|s| s.reference_id), first_reference_id);
        }
    }
}
