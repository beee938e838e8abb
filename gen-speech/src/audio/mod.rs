//! Audio handling: format sniffing, external tools, and concatenation.

pub mod concat;
pub mod format;
pub mod tools;

pub use concat::{ConcatOutcome, Concatenator};
pub use tools::AudioTools;
