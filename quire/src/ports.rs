//! Retrying port allocation.
//!
//! A transient probe socket validates each candidate and is released
//! immediately; the real bind happens later inside the supervised process.
//! The check-then-act window is accepted and surfaces as the supervisor's
//! own bind failure.

use std::io::ErrorKind;
use std::net::TcpListener;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error(
        "No available port found in {tries} tries starting at {start}. Try a different port range."
    )]
    Exhausted { start: u16, tries: u32 },

    #[error("Failed to probe port {port}: {source}")]
    Probe {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Finds a usable port, probing `preferred, preferred+1, ...` for up to
/// `max_tries` attempts total. Candidates never leave that range; running
/// past the end of the port space counts as a failed attempt.
pub fn allocate(interface: &str, preferred: u16, max_tries: u32) -> Result<u16, PortError> {
    let mut candidate = preferred;
    for attempt in 0..max_tries {
        match TcpListener::bind((interface, candidate)) {
            Ok(probe) => {
                drop(probe);
                if candidate != preferred {
                    tracing::info!(port = candidate, "preferred port busy, using next free port");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse || e.kind() == ErrorKind::PermissionDenied => {
                tracing::debug!(port = candidate, "port unavailable: {e}");
            }
            Err(e) => {
                return Err(PortError::Probe {
                    port: candidate,
                    source: e,
                });
            }
        }
        if attempt + 1 == max_tries {
            break;
        }
        candidate = match candidate.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    Err(PortError::Exhausted {
        start: preferred,
        tries: max_tries,
    })
}
