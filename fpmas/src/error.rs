//! Error taxonomy, per spec §7.
//!
//! Propagation policy: everything but [`Error::OutOfField`] and
//! [`Error::UnknownNode`] is fatal to the current run. The `Runtime` catches
//! a fatal error, drives the collective barrier-abort sequence described in
//! §7 (every process that observes a fatal error marks itself `BLACK` and
//! sends `END` on every peer tag so that peers blocked on a `recv` unblock
//! and abort too), and returns the error to its caller.

use fpmas_transport::TransportError;

/// The full error taxonomy. Variant names track spec §7's *kinds*, not the
/// historical C++ exception type names.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Any failure reported by the underlying transport. Fatal.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Size mismatch, unknown tag for a polymorphic payload, or a truncated
    /// buffer. Fatal within the current operation.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An agent tried to inspect or move outside its allowed neighborhood.
    /// Surfaced to the caller, never retried, not fatal.
    #[error("out of field: {0}")]
    OutOfField(String),

    /// Lookup by id on a process that does not know this id. Surfaced, not
    /// fatal.
    #[error("unknown node: {0:?}")]
    UnknownNode(crate::id::DistributedId),

    /// `release_acquire` without a prior `acquire`, a mutex locked twice by
    /// the same holder, or similar caller misuse. Fatal; indicates a bug in
    /// the caller.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// A mutex/link request arrived after `END` of the current synchronize
    /// epoch. Fatal.
    #[error("termination violation: {0}")]
    TerminationViolation(String),
}

impl Error {
    /// Per §7's propagation policy: only these two kinds are surfaced to the
    /// caller without aborting the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::OutOfField(_) | Error::UnknownNode(_))
    }
}

/// Codec-specific failures (spec §4.C / §7).
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes, {available} remain")]
    Truncated { needed: usize, available: usize },
    #[error("failed to encode value: {0}")]
    Encode(String),
    #[error("failed to decode value: {0}")]
    Decode(String),
    #[error("unknown type tag {0} for polymorphic payload")]
    UnknownTag(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
