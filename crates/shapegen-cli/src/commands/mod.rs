//! Subcommand implementations.

pub mod convert;
pub mod normalize;
pub mod optimize;
pub mod preprocess;
pub mod stats;
pub mod status;
pub mod views;
