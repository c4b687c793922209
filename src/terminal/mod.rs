//! Terminal output primitives: escape-sequence buffer, ANSI-aware line
//! measurement and colour capability.

pub mod ansi;
mod color;
mod output;

pub use color::ColorProfile;
pub use output::OutputBuffer;
