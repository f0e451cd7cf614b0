//! Core functionality for the furnace monitor.
//!
//! This module contains:
//! - Sampling windows that fold raw sensor readings into a histogram
//! - Categorization of a histogram into activity tiers

pub mod categorize;
pub mod histogram;

// Re-export commonly used types
pub use categorize::{categorize, Category, CategoryCounts, Thresholds};
pub use histogram::{Histogram, SampleAggregator, INDICATOR_PERIOD};
