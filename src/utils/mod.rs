//! Utility functions for string formatting and manipulation.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{digits_only, format_phone, is_all_digits, truncate_string};
