//! Application Layer - Use Cases
//!
//! Orchestrates domain logic and infrastructure.

pub mod check_token;
pub mod config;
pub mod issue_challenge;
pub mod proof_of_work;
pub mod solver;
pub mod submit_solution;
