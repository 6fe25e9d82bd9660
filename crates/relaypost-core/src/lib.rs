//! # RelayPost Core
//!
//! Shared building blocks for the RelayPost dispatch scheduler:
//! configuration, the error taxonomy, value types that cross crate
//! boundaries, and the traits for the two external collaborators
//! (the outbound [`traits::Sender`] and the content [`traits::Classifier`]).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use traits::{Classifier, Sender};
pub use types::{Attribution, ItemKind, Priority, RenderRequest, SendOutcome};
