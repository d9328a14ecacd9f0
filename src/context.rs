//! This module defines the per-call execution context.
//!
//! [`Extra`] carries the caller-facing knobs (strictness override, opaque
//! user context) and is threaded by argument into every hook invocation.
//! [`State`] is the mutable per-call bookkeeping: the recursion guard
//! stack and the depth counter.  A fresh `State` is created for each
//! top-level call and never shared, so concurrent validations against one
//! compiled schema need no locking.

use crate::errors::{ErrorKind, FatalError, LineItem, ValError, ValResult};
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The opaque caller-supplied context value, passed through to hooks
/// unchanged.  The engine neither inspects nor mutates it; hooks wanting
/// shared mutable state should supply their own interior-mutable type.
pub type UserContext = Arc<dyn Any + Send + Sync>;

/// Per-call settings threaded through every validate/serialize step.
#[derive(Clone, Default)]
pub struct Extra {
    /// Per-call strictness override; wins over any per-node setting.
    pub strict: Option<bool>,
    /// Opaque user context available to hooks via [`Extra::context`].
    pub context: Option<UserContext>,
}

impl Extra {
    /// Resolve the effective strictness for a node with the given
    /// per-node override.  The call-level setting wins; the default is
    /// lax.
    pub(crate) fn strictness(&self, node_strict: Option<bool>) -> bool {
        self.strict.or(node_strict).unwrap_or(false)
    }

    /// A copy of this Extra with strictness forced.
    pub(crate) fn with_strict(&self, strict: bool) -> Extra {
        Extra {
            strict: Some(strict),
            context: self.context.clone(),
        }
    }

    /// A container's strict setting becomes the ambient strictness for
    /// its elements and fields, unless the call already pinned one.
    pub(crate) fn scoped(&self, node_strict: Option<bool>) -> Extra {
        match (self.strict, node_strict) {
            (None, Some(s)) => self.with_strict(s),
            _ => self.clone(),
        }
    }
}

impl fmt::Debug for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extra")
            .field("strict", &self.strict)
            .field("context", &self.context.as_ref().map(|_| "<user context>"))
            .finish()
    }
}

/// Mutable per-call state: the recursion guard stack and depth counter.
#[derive(Debug, Default)]
pub(crate) struct State {
    // Pairs of (node identity, input identity) currently being processed.
    guards: Vec<(usize, usize)>,
    depth: u32,
}

impl State {
    // Hard ceiling on nesting, independent of the identity guard.  Deep
    // but finite data stays well under this; a hook or fallback that
    // keeps manufacturing fresh values does not.
    pub(crate) const MAX_DEPTH: u32 = 4096;

    pub(crate) fn new() -> State {
        State::default()
    }
}

/// Run `f` with a `(node, input)` recursion guard held.
///
/// Fails with a `recursion_loop` line-item if that exact pair is already
/// on the stack, and fatally if the depth ceiling is hit.  The guard is
/// released on every exit path, error or not.
pub(crate) fn guarded<T, F>(
    state: &mut State,
    node_key: usize,
    value: &Value,
    f: F,
) -> ValResult<T>
where
    F: FnOnce(&mut State) -> ValResult<T>,
{
    let pair = (node_key, value.ident());
    if state.guards.contains(&pair) {
        return Err(ValError::one(LineItem::new(ErrorKind::RecursionLoop, value)));
    }
    if state.depth >= State::MAX_DEPTH {
        return Err(ValError::Fatal(FatalError::DepthExceeded));
    }
    state.guards.push(pair);
    state.depth += 1;
    let result = f(state);
    state.depth -= 1;
    state.guards.pop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::int;

    #[test]
    fn guard_detects_repeated_pair() {
        let mut state = State::new();
        let value = int(1);
        let result = guarded(&mut state, 7, &value, |state| {
            // Same node, same input: must fail instead of recursing.
            guarded(state, 7, &value, |_| Ok(()))
        });
        match result {
            Err(ValError::LineErrors(items)) => {
                assert_eq!(items[0].kind, ErrorKind::RecursionLoop);
            }
            other => panic!("expected recursion_loop, got {:?}", other),
        }
        // The stack must be fully unwound afterward.
        assert!(state.guards.is_empty());
        assert_eq!(state.depth, 0);
    }

    #[test]
    fn guard_allows_distinct_inputs() {
        let mut state = State::new();
        let a = int(1);
        let b = int(2);
        let result = guarded(&mut state, 7, &a, |state| {
            guarded(state, 7, &b, |_| Ok(()))
        });
        assert!(result.is_ok());
    }
}
