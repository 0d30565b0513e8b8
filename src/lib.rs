pub mod cli;
pub mod collector;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod model;
pub mod output;
pub mod parse;
pub mod privilege;
pub mod rates;
pub mod state;
pub mod system;
