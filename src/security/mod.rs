//! Centralized security module for promptrelay.
//!
//! See [`promptrelay`] for the module overview, request pipeline,
//! and public API documentation.

mod admission;
mod cipher;
mod context;
mod error;
mod kdf;
mod prompt_guard;
mod promptrelay;
mod response_guard;
mod rules;
mod token;
mod violations;

// The promptrelay.rs facade controls the entire public API surface.
pub use self::promptrelay::*;
