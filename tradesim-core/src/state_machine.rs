//! Table-driven finite state machine.
//!
//! A `TransitionTable` maps `(state, action)` pairs to the next state. Tables
//! are built once and shared (`&'static`), so many machines can walk the same
//! table without copying it. A state with no outgoing action is terminal.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// No transition is defined for `action` from `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError<S, A> {
    pub state: S,
    pub action: A,
}

impl<S: fmt::Debug, A: fmt::Debug> fmt::Display for TransitionError<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition: {:?} has no {:?} action", self.state, self.action)
    }
}

impl<S: fmt::Debug, A: fmt::Debug> std::error::Error for TransitionError<S, A> {}

/// Immutable `(state, action) -> next_state` mapping.
#[derive(Debug, Clone)]
pub struct TransitionTable<S, A> {
    transitions: HashMap<(S, A), S>,
    sources: HashSet<S>,
}

impl<S, A> TransitionTable<S, A>
where
    S: Copy + Eq + Hash,
    A: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self { transitions: HashMap::new(), sources: HashSet::new() }
    }

    /// Add `from --action--> to`. Later definitions of the same pair win.
    pub fn with(mut self, from: S, action: A, to: S) -> Self {
        self.transitions.insert((from, action), to);
        self.sources.insert(from);
        self
    }

    /// Add the same action from several source states.
    pub fn with_many(mut self, from: &[S], action: A, to: S) -> Self {
        for &state in from {
            self = self.with(state, action, to);
        }
        self
    }

    pub fn next(&self, state: S, action: A) -> Option<S> {
        self.transitions.get(&(state, action)).copied()
    }

    pub fn is_terminal(&self, state: S) -> bool {
        !self.sources.contains(&state)
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl<S, A> Default for TransitionTable<S, A>
where
    S: Copy + Eq + Hash,
    A: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A current state walking a shared transition table.
pub struct StateMachine<S: 'static, A: 'static> {
    state: S,
    table: &'static TransitionTable<S, A>,
}

impl<S, A> StateMachine<S, A>
where
    S: Copy + Eq + Hash + fmt::Debug,
    A: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new(initial: S, table: &'static TransitionTable<S, A>) -> Self {
        Self { state: initial, table }
    }

    pub fn state(&self) -> S {
        self.state
    }

    /// Apply `action`, returning the state that was left.
    pub fn execute_action(&mut self, action: A) -> Result<S, TransitionError<S, A>> {
        let next = self
            .table
            .next(self.state, action)
            .ok_or(TransitionError { state: self.state, action })?;
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }

    pub fn can_execute(&self, action: A) -> bool {
        self.table.next(self.state, action).is_some()
    }

    pub fn is_in_terminal_state(&self) -> bool {
        self.table.is_terminal(self.state)
    }
}

impl<S: Copy, A> Clone for StateMachine<S, A> {
    fn clone(&self) -> Self {
        Self { state: self.state, table: self.table }
    }
}

impl<S: fmt::Debug, A> fmt::Debug for StateMachine<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine").field("state", &self.state).finish()
    }
}
