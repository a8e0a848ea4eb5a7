pub mod config;
pub mod execution;
pub mod hash;
pub mod storage;

#[cfg(feature = "logging")]
pub mod logging;
