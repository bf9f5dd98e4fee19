//! The `fsm` module contains the state machine every edge tracker walks through.
//!
//! ```text
//!            /--> AtOneStepProof ----------\
//! Started ---+--> AddingSubchallengeLeaf ---+--> Confirming --> Confirmed
//!            \--> Bisecting ---------------/
//! ```
//!
//! Every state but [State::Confirmed] can fall back to [State::Started], and every state but
//! [State::Confirmed] can move straight to it once the edge is seen confirmed.

use crate::errors::DriverError;
use serde::Serialize;
use std::{collections::VecDeque, fmt};

/// The number of transitions an [Fsm] remembers.
pub const HISTORY_LIMIT: usize = 32;

/// The [State] of an edge tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    #[default]
    Started,
    AtOneStepProof,
    AddingSubchallengeLeaf,
    Bisecting,
    Confirming,
    Confirmed,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Started,
        State::AtOneStepProof,
        State::AddingSubchallengeLeaf,
        State::Bisecting,
        State::Confirming,
        State::Confirmed,
    ];

    pub fn is_terminal(&self) -> bool {
        *self == State::Confirmed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Started => "started",
            State::AtOneStepProof => "at_one_step_proof",
            State::AddingSubchallengeLeaf => "adding_subchallenge_leaf",
            State::Bisecting => "bisecting",
            State::Confirming => "confirming",
            State::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

/// An [Action] moves an edge tracker from one [State] to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    BackToStart,
    HandleOneStepProof,
    OpenSubchallengeLeaf,
    Bisect,
    AwaitConfirmation,
    Confirm,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::BackToStart,
        Action::HandleOneStepProof,
        Action::OpenSubchallengeLeaf,
        Action::Bisect,
        Action::AwaitConfirmation,
        Action::Confirm,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::BackToStart => "back_to_start",
            Action::HandleOneStepProof => "handle_one_step_proof",
            Action::OpenSubchallengeLeaf => "open_subchallenge_leaf",
            Action::Bisect => "bisect",
            Action::AwaitConfirmation => "await_confirmation",
            Action::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

/// A row of the transition table.
///
/// 0. `&[State]` - the states the action may be taken from
/// 1. [Action] - the action
/// 2. [State] - the resulting state
pub struct Transition(pub &'static [State], pub Action, pub State);

const NON_TERMINAL: &[State] = &[
    State::Started,
    State::AtOneStepProof,
    State::AddingSubchallengeLeaf,
    State::Bisecting,
    State::Confirming,
];

/// The transitions of the edge tracker.
pub const TRANSITIONS: &[Transition] = &[
    Transition(NON_TERMINAL, Action::BackToStart, State::Started),
    Transition(&[State::Started], Action::HandleOneStepProof, State::AtOneStepProof),
    Transition(
        &[State::Started],
        Action::OpenSubchallengeLeaf,
        State::AddingSubchallengeLeaf,
    ),
    Transition(&[State::Started], Action::Bisect, State::Bisecting),
    Transition(
        &[
            State::AtOneStepProof,
            State::AddingSubchallengeLeaf,
            State::Bisecting,
            State::Confirming,
        ],
        Action::AwaitConfirmation,
        State::Confirming,
    ),
    Transition(NON_TERMINAL, Action::Confirm, State::Confirmed),
];

/// Looks up the state `action` leads to from `from`, if the transition exists.
pub fn next_state(from: State, action: Action) -> Option<State> {
    TRANSITIONS
        .iter()
        .find(|Transition(sources, a, _)| *a == action && sources.contains(&from))
        .map(|Transition(_, _, to)| *to)
}

/// A transition taken by an [Fsm].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Taken {
    pub from: State,
    pub action: Action,
    pub to: State,
}

/// The [FsmSummary] struct is a point in time view of an [Fsm], for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsmSummary {
    pub current: State,
    pub last_error: Option<String>,
}

/// The [Fsm] struct walks the [TRANSITIONS] table, remembering the last [HISTORY_LIMIT]
/// transitions it took.
#[derive(Debug, Clone, Default)]
pub struct Fsm {
    current: State,
    history: VecDeque<Taken>,
    last_error: Option<String>,
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> State {
        self.current
    }

    /// Takes `action` from the current state.
    ///
    /// ### Returns
    /// - `Ok(State)`: The new current state.
    /// - `Err(DriverError::InvalidTransition)`: The action cannot be taken from the current
    ///   state. The state is left unchanged.
    pub fn do_action(&mut self, action: Action) -> Result<State, DriverError> {
        let from = self.current;
        let to = next_state(from, action).ok_or(DriverError::InvalidTransition { from, action })?;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Taken { from, action, to });
        self.current = to;
        Ok(to)
    }

    /// Records the failure that caused the next transition.
    pub fn mark_error(&mut self, err: &anyhow::Error) {
        self.last_error = Some(format!("{err:#}"));
    }

    /// The remembered transitions, oldest first.
    pub fn history(&self) -> Vec<Taken> {
        self.history.iter().copied().collect()
    }

    pub fn summary(&self) -> FsmSummary {
        FsmSummary {
            current: self.current,
            last_error: self.last_error.clone(),
        }
    }
}
