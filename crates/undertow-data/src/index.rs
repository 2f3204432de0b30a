use serde::{Deserialize, Serialize};

/// Address of one sample: a run (by position among accepted runs) and a frame within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleRef {
    pub run: usize,
    pub frame: usize,
}

/// Flat, 0-based enumeration of every `(run, frame)` pair, in run order then frame order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIndex {
    samples: Vec<SampleRef>,
}

impl SampleIndex {
    /// Builds the index from the frame count of each run, in run order.
    pub fn build<I: IntoIterator<Item = usize>>(frame_counts: I) -> SampleIndex {
        let samples = frame_counts
            .into_iter()
            .enumerate()
            .flat_map(|(run, count)| (0..count).map(move |frame| SampleRef { run, frame }))
            .collect();

        Self { samples }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, sample: usize) -> Option<SampleRef> {
        self.samples.get(sample).copied()
    }

    /// Looks up a sample that the caller knows to exist.
    ///
    /// Panics if `sample` is out of range.
    pub fn resolve(&self, sample: usize) -> SampleRef {
        assert!(
            sample < self.samples.len(),
            "sample {sample} is out of range for {} samples",
            self.samples.len(),
        );

        self.samples[sample]
    }

    pub fn iter(&self) -> impl Iterator<Item = SampleRef> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_frame_appears_once_in_order() {
        let counts = [3, 0, 2];
        let index = SampleIndex::build(counts);

        assert_eq!(index.len(), counts.iter().sum::<usize>());
        assert_eq!(index.resolve(0), SampleRef { run: 0, frame: 0 });
        assert_eq!(index.resolve(3), SampleRef { run: 2, frame: 0 });
        assert_eq!(index.resolve(4), SampleRef { run: 2, frame: 1 });

        let unique: HashSet<_> = index.iter().collect();
        assert_eq!(unique.len(), index.len());
    }

    #[test]
    fn empty_index_has_no_samples() {
        let index = SampleIndex::build(std::iter::empty());

        assert!(index.is_empty());
        assert_eq!(index.get(0), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn resolving_past_the_end_panics() {
        SampleIndex::build([2]).resolve(2);
    }
}
