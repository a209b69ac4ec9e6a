//! Infrastructure Layer - repository implementations

pub mod memory;
pub mod postgres;
