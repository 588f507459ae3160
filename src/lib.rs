//! Keyword image-search bulk downloader with duplicate removal and batch
//! post-processing.

pub mod acquisition;
pub mod config;
pub mod core;
pub mod logging;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;
