pub mod parsers;

pub use parsers::{parse_gpu_indices, parse_only_use};
