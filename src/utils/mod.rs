pub mod error;
pub mod log_bridge;
