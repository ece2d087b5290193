//! Quire Core - Shared launch contract types
//!
//! This crate contains the types shared between the Quire CLI (`quire`) and
//! the process supervisor (`quired`): the resolved server identity with its
//! literal one-line text form, and the versioned configuration artifact the
//! supervisor consumes at launch.
//!
//! All interactive functionality (prompts, TLS provisioning, port probing,
//! spawning, etc.) lives in the `quire` crate.

mod artifact;
mod identity;

pub use artifact::*;
pub use identity::*;
