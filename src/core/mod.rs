pub mod duplicate;
pub mod hash;
pub mod image;
pub mod postprocess;
pub mod scanner;

pub use duplicate::{DuplicateIndex, DuplicateStatus};
pub use hash::{Fingerprint, HashError, PerceptualHasher};
pub use postprocess::{PostProcessOptions, PostProcessor};
