//! Participant identities and correlation identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a participant's execution context within one cluster.
///
/// `0` is reserved for the coordinator's local context; spawned workers are
/// numbered from `1` in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RalId(pub u32);

impl RalId {
    /// The coordinator's own context
    pub const COORDINATOR: RalId = RalId(0);

    /// Ral id of the worker at `index` (0-based spawn order)
    pub fn worker(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    pub fn is_coordinator(&self) -> bool {
        self.0 == 0
    }

    /// Position of this participant in the cluster membership list
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ral-{}", self.0)
    }
}

/// Identifies one distributed operation across every participant it touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(pub u64);

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key for one intermediate partition, derived from a correlation token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn from_token(token: CorrelationToken) -> Self {
        Self(format!("message_{}", token.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<CorrelationToken> for MessageId {
    fn from(token: CorrelationToken) -> Self {
        Self::from_token(token)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues correlation tokens for one coordinator.
///
/// Tokens start at 1 and are never reused, including across concurrent
/// callers.
#[derive(Debug, Default)]
pub struct TokenAllocator {
    issued: AtomicU64,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next token
    pub fn next_token(&self) -> CorrelationToken {
        CorrelationToken(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Allocate a token together with its derived message id
    pub fn next_message(&self) -> (CorrelationToken, MessageId) {
        let token = self.next_token();
        (token, MessageId::from_token(token))
    }

    /// Number of tokens handed out so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_message_id_format() {
        assert_eq!(MessageId::from_token(CorrelationToken(7)).as_str(), "message_7");
    }

    #[test]
    fn test_tokens_start_at_one() {
        let tokens = TokenAllocator::new();
        assert_eq!(tokens.next_token(), CorrelationToken(1));
        let (token, message_id) = tokens.next_message();
        assert_eq!(token, CorrelationToken(2));
        assert_eq!(message_id.as_str(), "message_2");
        assert_eq!(tokens.issued(), 2);
    }

    #[test]
    fn test_tokens_unique_across_threads() {
        let tokens = Arc::new(TokenAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tokens = Arc::clone(&tokens);
                std::thread::spawn(move || (0..250).map(|_| tokens.next_token()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token), "token {} issued twice", token);
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_allocators_are_independent() {
        let a = TokenAllocator::new();
        let b = TokenAllocator::new();
        a.next_token();
        a.next_token();
        assert_eq!(b.next_token(), CorrelationToken(1));
    }

    #[test]
    fn test_ral_id_numbering() {
        assert!(RalId::COORDINATOR.is_coordinator());
        assert_eq!(RalId::worker(0), RalId(1));
        assert_eq!(RalId::worker(2).index(), 3);
        assert_eq!(RalId(4).to_string(), "ral-4");
    }
}
