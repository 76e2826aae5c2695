//! Client-side orchestration for a Bloop-style build server.

pub mod bsp;
pub mod daemon;
pub mod utils;
