//! Application services layer.

pub mod error;
pub mod pdf;
pub mod repos;
