//! Text cleanup applied before speech
//!
//! Normalization runs on every incoming line; user replacements run last so
//! they can also rewrite an announced speaker name.

pub mod normalize;
pub mod replace;

pub use normalize::{normalize_punctuation, normalize_text, strip_markup};
pub use replace::{ReplacementEngine, TextReplacement};
