//! Repository layer: writes of extracted records.
//!
//! Reads live in `db::query`.

mod medical_image;

pub use medical_image::*;
