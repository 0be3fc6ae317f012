use converge_core::{ConcurrencyToken, ResourceRef};

/// Remote calls the in-memory backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    List,
    Update,
    Associate,
    Disassociate,
    Delete,
}

impl Operation {
    /// Returns `true` for calls that consume and produce a concurrency token.
    pub fn is_token_mutation(self) -> bool {
        matches!(self, Self::Update | Self::Associate | Self::Disassociate)
    }
}

/// One entry in the call journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub operation: Operation,
    pub resource: ResourceRef,
    /// Token carried by the request, for token-mutating calls.
    pub sent_token: Option<ConcurrencyToken>,
    /// Token returned on success.
    pub returned_token: Option<ConcurrencyToken>,
    /// Number of members in a batch call.
    pub items: usize,
    pub succeeded: bool,
}
