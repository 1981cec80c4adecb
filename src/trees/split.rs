//! Class-count tables for candidate splits and the information gain that ranks them.

/// Left/right class counts for every (candidate feature, threshold) pair of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct CountTable {
    candidates: usize,
    thresholds: usize,
    classes: usize,
    left: Vec<u64>,
    right: Vec<u64>,
}

impl CountTable {
    pub fn new(candidates: usize, thresholds: usize, classes: usize) -> Self {
        let len = candidates * thresholds * classes;
        Self {
            candidates,
            thresholds,
            classes,
            left: vec![0; len],
            right: vec![0; len],
        }
    }

    #[inline]
    fn offset(&self, candidate: usize, threshold: usize) -> usize {
        (candidate * self.thresholds + threshold) * self.classes
    }

    #[inline]
    pub fn add(&mut self, candidate: usize, threshold: usize, class: usize, goes_left: bool) {
        let index = self.offset(candidate, threshold) + class;
        if goes_left {
            self.left[index] += 1;
        } else {
            self.right[index] += 1;
        }
    }

    /// Adds the counts of a table built over another part of the pixels.
    pub fn merge(&mut self, other: &CountTable) {
        debug_assert_eq!(self.left.len(), other.left.len());
        for (total, count) in self.left.iter_mut().zip(&other.left) {
            *total += count;
        }
        for (total, count) in self.right.iter_mut().zip(&other.right) {
            *total += count;
        }
    }

    pub fn left(&self, candidate: usize, threshold: usize) -> &[u64] {
        let start = self.offset(candidate, threshold);
        &self.left[start..start + self.classes]
    }

    pub fn right(&self, candidate: usize, threshold: usize) -> &[u64] {
        let start = self.offset(candidate, threshold);
        &self.right[start..start + self.classes]
    }

    /// Picks the pair with the highest information gain; the first one found wins a tie.
    ///
    /// Pairs that send every pixel the same way are skipped.
    pub fn best_split(&self) -> Option<SplitChoice> {
        let mut best: Option<SplitChoice> = None;
        for candidate in 0..self.candidates {
            for threshold in 0..self.thresholds {
                let left = self.left(candidate, threshold);
                let right = self.right(candidate, threshold);
                let left_count: u64 = left.iter().sum();
                let right_count: u64 = right.iter().sum();
                if left_count == 0 || right_count == 0 {
                    continue;
                }
                let gain = information_gain(left, right);
                if best.as_ref().map_or(true, |best| gain > best.gain) {
                    best = Some(SplitChoice {
                        candidate,
                        threshold,
                        gain,
                        left_count,
                        right_count,
                    });
                }
            }
        }
        best
    }
}

/// Winning (feature, threshold) pair of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitChoice {
    pub candidate: usize,
    pub threshold: usize,
    pub gain: f64,
    pub left_count: u64,
    pub right_count: u64,
}

/// Shannon entropy, in bits, of a class histogram.
pub fn entropy(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Entropy of the parent minus the size-weighted entropy of both branches.
pub fn information_gain(left: &[u64], right: &[u64]) -> f64 {
    let parent = left.iter().zip(right).map(|(l, r)| l + r).collect::<Vec<_>>();
    let left_total: u64 = left.iter().sum();
    let right_total: u64 = right.iter().sum();
    let total = (left_total + right_total) as f64;
    if total == 0.0 {
        return 0.0;
    }
    entropy(&parent)
        - (left_total as f64 / total) * entropy(left)
        - (right_total as f64 / total) * entropy(right)
}

/// Relative class frequencies; an empty histogram yields a uniform distribution.
pub fn leaf_probabilities(counts: &[u64]) -> Vec<f32> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return vec![1.0 / counts.len().max(1) as f32; counts.len()];
    }
    counts
        .iter()
        .map(|&count| (count as f64 / total as f64) as f32)
        .collect()
}
