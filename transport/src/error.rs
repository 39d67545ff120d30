//! Transport-level error type.

/// Any failure reported by the underlying transport.
///
/// Per the core's error taxonomy, a `TransportError` is fatal to the epoch in
/// which it occurs; it is never retried internally.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// A peer's inbox/channel has been dropped; the peer is presumed gone.
    #[error("rank {0} is unreachable")]
    PeerUnreachable(crate::Rank),
    /// A message was received but its payload did not match the type
    /// requested by the caller of `recv`.
    #[error("payload type mismatch on tag {0:?}")]
    TypeMismatch(crate::Tag),
    /// A rank index was out of the configured cluster size.
    #[error("rank {0} out of range for a cluster of size {1}")]
    RankOutOfRange(crate::Rank, usize),
    /// A collective call (`barrier`, `all_to_all`, `gather`, `reduce`) was
    /// invoked with a call sequence that did not line up across ranks.
    #[error("collective call out of sequence: {0}")]
    CollectiveMismatch(String),
}
