//! Activity tiers.
//!
//! Raw readings are split into three half-open intervals by two thresholds:
//! `[0, no_top)` is no burner activity, `[no_top, maybe_top)` is ambiguous,
//! and everything from `maybe_top` up is the burner running.

use super::histogram::Histogram;
use serde::Serialize;

/// One of the three activity tiers, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    No,
    Maybe,
    Yes,
}

impl Category {
    /// All categories in the fixed reporting order.
    pub const ALL: [Category; 3] = [Category::No, Category::Maybe, Category::Yes];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::No => "no",
            Category::Maybe => "maybe",
            Category::Yes => "yes",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two tier boundaries. `no_top <= maybe_top` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    no_top: u16,
    maybe_top: u16,
}

impl Thresholds {
    /// Returns `None` when the boundaries are inverted.
    pub fn new(no_top: u16, maybe_top: u16) -> Option<Self> {
        (no_top <= maybe_top).then_some(Self { no_top, maybe_top })
    }

    pub fn no_top(&self) -> u16 {
        self.no_top
    }

    pub fn maybe_top(&self) -> u16 {
        self.maybe_top
    }

    /// Tier of a single raw reading. Boundary values belong to the higher tier.
    pub fn classify(&self, value: u16) -> Category {
        if value < self.no_top {
            Category::No
        } else if value < self.maybe_top {
            Category::Maybe
        } else {
            Category::Yes
        }
    }
}

/// Sample counts per tier for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub no: u64,
    pub maybe: u64,
    pub yes: u64,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::No => self.no,
            Category::Maybe => self.maybe,
            Category::Yes => self.yes,
        }
    }

    fn bucket_mut(&mut self, category: Category) -> &mut u64 {
        match category {
            Category::No => &mut self.no,
            Category::Maybe => &mut self.maybe,
            Category::Yes => &mut self.yes,
        }
    }

    pub fn total(&self) -> u64 {
        self.no + self.maybe + self.yes
    }
}

impl std::fmt::Display for CategoryCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no: {}, maybe: {}, yes: {}", self.no, self.maybe, self.yes)
    }
}

/// Sum histogram counts into tiers.
pub fn categorize(histogram: &Histogram, thresholds: &Thresholds) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for (value, count) in histogram.iter() {
        *counts.bucket_mut(thresholds.classify(value)) += count;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(no_top: u16, maybe_top: u16) -> Thresholds {
        Thresholds::new(no_top, maybe_top).unwrap()
    }

    #[test]
    fn test_reference_window() {
        let histogram: Histogram = [(50, 3), (100, 2), (499, 1), (500, 4)].into_iter().collect();
        let counts = categorize(&histogram, &thresholds(100, 500));

        assert_eq!(
            counts,
            CategoryCounts {
                no: 3,
                maybe: 3,
                yes: 4
            }
        );
    }

    #[test]
    fn test_empty_histogram_yields_zero_counts() {
        let counts = categorize(&Histogram::new(), &thresholds(100, 500));
        assert_eq!(counts, CategoryCounts::default());
    }

    #[test]
    fn test_boundaries_land_in_higher_tier() {
        let t = thresholds(100, 500);
        assert_eq!(t.classify(0), Category::No);
        assert_eq!(t.classify(99), Category::No);
        assert_eq!(t.classify(100), Category::Maybe);
        assert_eq!(t.classify(499), Category::Maybe);
        assert_eq!(t.classify(500), Category::Yes);
        assert_eq!(t.classify(1023), Category::Yes);
    }

    #[test]
    fn test_equal_thresholds_leave_maybe_empty() {
        let histogram: Histogram = (0..1024u16).map(|v| (v, 1)).collect();
        let counts = categorize(&histogram, &thresholds(300, 300));

        assert_eq!(counts.no, 300);
        assert_eq!(counts.maybe, 0);
        assert_eq!(counts.yes, 724);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        assert!(Thresholds::new(500, 100).is_none());
        assert!(Thresholds::new(100, 100).is_some());
    }

    #[test]
    fn test_every_sample_counted_once() {
        // Deterministic pseudo-random histograms over the full ADC range
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..50 {
            let mut histogram = Histogram::new();
            for _ in 0..200 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                histogram.record_n((seed % 1024) as u16, (seed % 7) as u64);
            }
            let no_top = (seed % 1024) as u16;
            let maybe_top = no_top + ((seed >> 10) % (1024 - no_top as u32)) as u16;

            let counts = categorize(&histogram, &thresholds(no_top, maybe_top));
            assert_eq!(counts.total(), histogram.total());

            let expected_no: u64 = histogram
                .iter()
                .filter(|(v, _)| *v < no_top)
                .map(|(_, c)| c)
                .sum();
            assert_eq!(counts.no, expected_no);
        }
    }

    #[test]
    fn test_counts_display_and_lookup() {
        let counts = CategoryCounts {
            no: 7,
            maybe: 2,
            yes: 1,
        };
        assert_eq!(counts.to_string(), "no: 7, maybe: 2, yes: 1");
        assert_eq!(counts.get(Category::Maybe), 2);
        assert_eq!(
            Category::ALL.map(Category::as_str),
            ["no", "maybe", "yes"]
        );
    }
}
