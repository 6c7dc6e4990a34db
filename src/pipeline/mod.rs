pub mod extraction;
pub mod normalize;
pub mod parsing;
pub mod recognition;
