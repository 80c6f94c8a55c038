pub mod benchmark;
pub mod clinical;
pub mod cohort;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod plotting;
pub mod serde_utils;

pub use error::{Error, Result};
