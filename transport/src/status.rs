//! The result of a successful `recv`/`probe`: who sent it, and on what tag.

use crate::{Rank, Tag};

/// Metadata about a received (or probed) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub source: Rank,
    pub tag: Tag,
}
