/*
 * Bounded call-string contexts
 *
 * A call string records the most recent call instructions on the
 * abstract call stack, truncated to the configured depth K. Two
 * concrete stacks that agree on their last K calls share one context,
 * which is what bounds the context space. K = 0 degenerates to a single
 * empty context (context-insensitive analysis).
 */

use serde::Serialize;

use crate::program::InstId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CallString {
    calls: Vec<InstId>,
}

impl CallString {
    pub fn empty() -> Self {
        CallString::default()
    }

    /// Context after descending through `call`, keeping at most `k`
    /// most-recent calls.
    pub fn push(&self, call: InstId, k: usize) -> Self {
        if k == 0 {
            return CallString::empty();
        }
        let mut calls = self.calls.clone();
        calls.push(call);
        if calls.len() > k {
            calls.drain(..calls.len() - k);
        }
        CallString { calls }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn as_slice(&self) -> &[InstId] {
        &self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_appends() {
        let c1 = InstId(1);
        let c2 = InstId(2);
        let cs = CallString::empty().push(c1, 3).push(c2, 3);
        assert_eq!(cs.as_slice(), &[c1, c2]);
    }

    #[test]
    fn test_truncates_to_most_recent() {
        let cs = CallString::empty()
            .push(InstId(1), 2)
            .push(InstId(2), 2)
            .push(InstId(3), 2);
        assert_eq!(cs.as_slice(), &[InstId(2), InstId(3)]);
    }

    #[test]
    fn test_zero_depth_collapses_to_empty() {
        let cs = CallString::empty().push(InstId(1), 0).push(InstId(2), 0);
        assert!(cs.is_empty());
        assert_eq!(cs, CallString::empty());
    }

    #[test]
    fn test_truncated_stacks_share_context() {
        let via_a = CallString::empty().push(InstId(1), 1).push(InstId(9), 1);
        let via_b = CallString::empty().push(InstId(2), 1).push(InstId(9), 1);
        assert_eq!(via_a, via_b);
    }
}
