pub mod claim_time;
pub mod config;
pub mod domain;
pub mod http;
pub mod state;
