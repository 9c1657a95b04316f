//! Service clients and the data they exchange

pub mod completion;
pub mod config;
pub mod cost;
pub mod errors;
pub mod models;
pub mod storage;
pub mod translator;
