//! Test input generation: bounded random ranges, simulated data-source
//! quotes with deterministic per-day variation, and custom generator code
//! run through the sandbox with the fetchers exposed as host calls.

pub mod datasource;
pub mod error;
pub mod generator;

pub use datasource::{daily_variation, round_to, MarketDataSource};
pub use error::{InputError, Result};
pub use generator::TestInputGenerator;
