//! PoW (Proof of Work) Module
//!
//! Clean Architecture structure:
//! - `domain/` - Challenge, solution and work-token entities, difficulty rules, repository traits
//! - `application/` - The `ProofOfWork` service, the nonce solver and the issue/submit/check use cases
//! - `infra/` - PostgreSQL and in-memory repositories
//!
//! ## Security Model
//! - The server is the sole authority for challenge ids, difficulty and expiry
//! - A challenge is consumed on its first submission, so a solution cannot be replayed
//! - Client-reported solve times are telemetry only, never trusted
//! - Work tokens are bearer credentials; only their SHA-256 is stored

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;

pub use application::config::PowConfig;
pub use application::proof_of_work::ProofOfWork;
pub use application::solver::{solve_challenge, solve_challenge_within};
pub use domain::entities::{PowChallenge, PowSolution, WorkToken};
pub use domain::value_objects::Difficulty;
pub use error::{PowError, PowResult};
pub use infra::memory::MemoryPowRepository;
pub use infra::postgres::PgPowRepository;
