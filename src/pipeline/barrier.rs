//! Ordering barrier between conversion and playback
//!
//! Conversions finish in whatever order the TTS service answers. The barrier
//! holds finished clips until every earlier sequence number has been released
//! or skipped, so playback always follows chunk order.

use std::collections::BTreeMap;

use crate::voice::AudioClip;

/// Releases clips strictly by sequence number, starting at 1
#[derive(Debug)]
pub struct OrderingBarrier {
    next: u64,
    /// `None` marks a skipped (failed) slot
    held: BTreeMap<u64, Option<AudioClip>>,
}

impl OrderingBarrier {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: 1,
            held: BTreeMap::new(),
        }
    }

    /// Record a finished clip and return every clip now due, in order
    pub fn complete(&mut self, clip: AudioClip) -> Vec<AudioClip> {
        self.settle(clip.sequence(), Some(clip))
    }

    /// Mark a slot as failed so later clips are not held up by it
    pub fn skip(&mut self, sequence: u64) -> Vec<AudioClip> {
        self.settle(sequence, None)
    }

    /// Sequence number the barrier is waiting for
    #[must_use]
    pub const fn next_expected(&self) -> u64 {
        self.next
    }

    /// Clips and skips held back behind a missing sequence number
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.held.is_empty()
    }

    fn settle(&mut self, sequence: u64, slot: Option<AudioClip>) -> Vec<AudioClip> {
        if sequence < self.next || self.held.contains_key(&sequence) {
            tracing::warn!(sequence, "duplicate completion ignored");
            return Vec::new();
        }
        self.held.insert(sequence, slot);

        let mut ready = Vec::new();
        while let Some(slot) = self.held.remove(&self.next) {
            match slot {
                Some(clip) => ready.push(clip),
                None => tracing::debug!(sequence = self.next, "skipped slot passed"),
            }
            self.next += 1;
        }
        ready
    }
}

impl Default for OrderingBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(sequence: u64) -> AudioClip {
        AudioClip::new(sequence, vec![u8::try_from(sequence).unwrap()])
    }

    fn sequences(clips: &[AudioClip]) -> Vec<u64> {
        clips.iter().map(AudioClip::sequence).collect()
    }

    #[test]
    fn test_in_order_passes_straight_through() {
        let mut barrier = OrderingBarrier::new();
        assert_eq!(sequences(&barrier.complete(clip(1))), vec![1]);
        assert_eq!(sequences(&barrier.complete(clip(2))), vec![2]);
        assert!(barrier.is_drained());
        assert_eq!(barrier.next_expected(), 3);
    }

    #[test]
    fn test_holds_early_clips() {
        let mut barrier = OrderingBarrier::new();
        assert!(barrier.complete(clip(2)).is_empty());
        assert!(barrier.complete(clip(3)).is_empty());
        assert_eq!(barrier.held(), 2);

        assert_eq!(sequences(&barrier.complete(clip(1))), vec![1, 2, 3]);
        assert!(barrier.is_drained());
    }

    #[test]
    fn test_every_permutation_releases_in_order() {
        let orders: [[u64; 4]; 6] = [
            [1, 2, 3, 4],
            [4, 3, 2, 1],
            [2, 1, 4, 3],
            [3, 1, 4, 2],
            [4, 1, 2, 3],
            [2, 4, 1, 3],
        ];

        for order in orders {
            let mut barrier = OrderingBarrier::new();
            let mut released = Vec::new();
            for seq in order {
                released.extend(barrier.complete(clip(seq)));
            }
            assert_eq!(sequences(&released), vec![1, 2, 3, 4], "order {order:?}");
        }
    }

    #[test]
    fn test_skip_unblocks_later_clips() {
        let mut barrier = OrderingBarrier::new();
        assert_eq!(sequences(&barrier.complete(clip(1))), vec![1]);
        assert!(barrier.complete(clip(3)).is_empty());

        assert_eq!(sequences(&barrier.skip(2)), vec![3]);
        assert_eq!(barrier.next_expected(), 4);
    }

    #[test]
    fn test_skip_before_arrival_of_earlier() {
        let mut barrier = OrderingBarrier::new();
        assert!(barrier.skip(2).is_empty());
        assert!(barrier.complete(clip(3)).is_empty());
        assert_eq!(sequences(&barrier.complete(clip(1))), vec![1, 3]);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut barrier = OrderingBarrier::new();
        barrier.complete(clip(1));
        assert!(barrier.complete(clip(1)).is_empty());

        barrier.complete(clip(3));
        assert!(barrier.skip(3).is_empty());
        assert_eq!(barrier.held(), 1);
    }
}
