pub mod alerts;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod log_io;
pub mod model;
pub mod normalizer;
pub mod sources;
pub mod state;
