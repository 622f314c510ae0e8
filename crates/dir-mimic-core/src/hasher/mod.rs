pub mod sample;

pub use sample::{full_hash, hash_file, sample_hash, SAMPLE_LENGTH};
