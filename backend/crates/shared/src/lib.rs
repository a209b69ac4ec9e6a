//! Shared Kernel
//!
//! Error vocabulary shared by every gating crate. Domain crates define their
//! own `thiserror` enums and convert into [`error::app_error::AppError`] at
//! the HTTP boundary.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
