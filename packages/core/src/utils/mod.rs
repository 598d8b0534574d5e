//! Utility functions for Quire Core

pub mod mentions;

pub use mentions::extract_mentions;
