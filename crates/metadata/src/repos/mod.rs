//! Repository traits for dataset metadata operations.

pub mod images;
pub mod samples;

pub use images::ImageRepo;
pub use samples::SampleRepo;
