//! Provider wire format types
//!
//! Pure serde shapes, one module per dialect. Conversion logic lives in
//! [`crate::convert`]; nothing here inspects or transforms content.

pub mod codewhisperer;
pub mod gemini;
pub mod openai;
