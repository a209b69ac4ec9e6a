//! Infrastructure Layer - store implementations and the background writer

pub mod memory;
pub mod postgres;
pub mod writer;
