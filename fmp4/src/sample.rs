use bytes::Bytes;

/// `sample_is_non_sync_sample` bit of the sample flags.
pub const NON_SYNC_SAMPLE_FLAG: u32 = 0x0001_0000;

/// A sample with every field resolved against the track defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FullSample {
    pub flags: u32,
    pub duration: u32,
    pub size: u32,
    pub composition_time_offset: i32,
    /// Decode time in the track timescale.
    pub decode_time: u64,
    pub data: Bytes,
}

impl FullSample {
    pub fn is_sync(&self) -> bool {
        self.flags & NON_SYNC_SAMPLE_FLAG == 0
    }

    pub fn presentation_time(&self) -> i64 {
        self.decode_time as i64 + self.composition_time_offset as i64
    }

    pub fn end_time(&self) -> u64 {
        self.decode_time + self.duration as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_helpers() {
        let sample = FullSample {
            flags: 0x0101_0000,
            duration: 1024,
            composition_time_offset: -512,
            decode_time: 2048,
            ..Default::default()
        };

        assert!(!sample.is_sync());
        assert_eq!(sample.presentation_time(), 1536);
        assert_eq!(sample.end_time(), 3072);
    }
}
