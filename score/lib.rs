#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod dataset;
pub mod engine;
pub mod export;
pub mod intervals;
pub mod pipeline;
pub mod policy;
pub mod reference;
pub mod storage;
pub mod types;
pub mod vcf;
pub mod weights;

pub use config::PrsConfig;
pub use pipeline::{PrsError, PrsRunSummary, calculate_prs};
