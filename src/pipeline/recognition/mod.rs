//! Image-to-text recognition: OCR engines, preprocessing and best-of-N selection.

pub mod engine;
pub mod preprocess;
pub mod strategy;

pub use engine::*;
pub use strategy::{Recognition, RecognitionEngine, RecognitionPolicy, RecognitionStrategy};
