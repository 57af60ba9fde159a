//! Silence filtering for encoded audio blobs.
//!
//! Before an encoded chunk is dispatched for transcription it passes through
//! a [`SilenceFilter`]; blobs the filter rejects are never sent upstream.

/// Trait for deciding whether an encoded blob carries usable speech.
pub trait SilenceFilter: Send + Sync {
    /// Returns the blob to dispatch, or `None` if it should be dropped.
    fn filter(&self, blob: &[u8], threshold_bytes: usize) -> Option<Vec<u8>>;
}

/// Size-based silence filter.
///
/// An encoded blob at or below the threshold is treated as silence. This is
/// a cheap proxy for content analysis: an encoder fed only silence produces
/// a near-empty container.
pub struct SizeThresholdFilter;

impl SilenceFilter for SizeThresholdFilter {
    fn filter(&self, blob: &[u8], threshold_bytes: usize) -> Option<Vec<u8>> {
        if blob.len() <= threshold_bytes {
            None
        } else {
            Some(blob.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_at_threshold_is_dropped() {
        let filter = SizeThresholdFilter;
        assert!(filter.filter(&vec![0u8; 225], 225).is_none());
    }

    #[test]
    fn test_blob_below_threshold_is_dropped() {
        let filter = SizeThresholdFilter;
        assert!(filter.filter(&[], 225).is_none());
        assert!(filter.filter(&vec![0u8; 10], 225).is_none());
    }

    #[test]
    fn test_blob_above_threshold_passes_unchanged() {
        let filter = SizeThresholdFilter;
        let blob = vec![7u8; 226];
        assert_eq!(filter.filter(&blob, 225), Some(blob));
    }

    #[test]
    fn test_zero_threshold_passes_any_nonempty_blob() {
        let filter = SizeThresholdFilter;
        assert_eq!(filter.filter(&[1u8], 0), Some(vec![1u8]));
        assert!(filter.filter(&[], 0).is_none());
    }
}
