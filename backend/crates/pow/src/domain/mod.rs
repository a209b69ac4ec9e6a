//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (PowChallenge, PowSolution, WorkToken)
//! - Domain value objects (Difficulty, DifficultyTarget)
//! - Domain services (solution hashing, solve-time estimate)
//! - Repository traits (interfaces)

pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;
