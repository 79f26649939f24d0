pub mod config;
pub mod db;
pub mod display;
pub mod market;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod surface;

pub mod error;
pub mod time;
