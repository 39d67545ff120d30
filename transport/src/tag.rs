//! Tag assignments, per spec §6: a tag is `(epoch_parity_bit ∥ tag_code)`.

/// The small, closed set of message kinds the core ever sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// A token circulating in the termination-detection ring.
    Token = 1,
    /// The collective end-of-epoch broadcast.
    End = 2,
    /// A mutex request (read/acquire/lock/lock_shared/unlock/unlock_shared).
    MutexReq = 3,
    /// A reply to a mutex request.
    MutexReply = 4,
    /// A link (edge creation) migration message.
    Link = 5,
    /// An unlink (edge removal) migration message.
    Unlink = 6,
    /// A plain data message (ghost-mode refresh, node export, ...).
    Data = 7,
    /// A collective abort: a fatal task error raises this process's color
    /// BLACK and broadcasts this tag on every peer rank (both epoch
    /// parities, since the aborting process does not know which parity its
    /// peers are currently waiting on) so blocked recvs unblock and abort
    /// too, instead of waiting forever for a quiescent ring that will never
    /// come.
    Abort = 8,
}

impl TagKind {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TagKind::Token),
            2 => Some(TagKind::End),
            3 => Some(TagKind::MutexReq),
            4 => Some(TagKind::MutexReply),
            5 => Some(TagKind::Link),
            6 => Some(TagKind::Unlink),
            7 => Some(TagKind::Data),
            8 => Some(TagKind::Abort),
            _ => None,
        }
    }
}

/// A wire tag: a message kind plus the synchronize-epoch parity bit that
/// prevents a message from a just-finished synchronize from being consumed
/// by the next one (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: TagKind,
    pub epoch: bool,
}

impl Tag {
    pub fn new(kind: TagKind, epoch: bool) -> Self {
        Tag { kind, epoch }
    }

    /// Packs this tag into its mandatory wire form: epoch bit in the high
    /// position, tag code in the low bits.
    pub fn to_wire(self) -> u8 {
        (self.kind.code() & 0x7f) | if self.epoch { 0x80 } else { 0 }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        let epoch = byte & 0x80 != 0;
        TagKind::from_code(byte & 0x7f).map(|kind| Tag { kind, epoch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for epoch in [false, true] {
            for kind in [
                TagKind::Token,
                TagKind::End,
                TagKind::MutexReq,
                TagKind::MutexReply,
                TagKind::Link,
                TagKind::Unlink,
                TagKind::Data,
                TagKind::Abort,
            ] {
                let tag = Tag::new(kind, epoch);
                assert_eq!(Tag::from_wire(tag.to_wire()), Some(tag));
            }
        }
    }
}
