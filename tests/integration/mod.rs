//! Integration tests for the deepflow pipeline

mod checkpoint_file;
mod config_loading;
mod flow_scenarios;
mod provider_http;
mod test_utils;

pub use test_utils::*;
