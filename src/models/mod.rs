pub mod aggregate;
pub mod sample;

pub use aggregate::Aggregate;
pub use sample::Sample;
