pub mod collate;
pub mod config;
pub mod convert;
pub mod curation;
pub mod distribution;
pub mod error;
pub mod expand;
pub mod packages;
pub mod pipeline;
pub mod reference_cache;
pub mod resolver;
pub mod synthesis;

#[cfg(test)]
mod test_support;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
