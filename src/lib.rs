pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod storage;
