// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Federate lifecycle state machine.
//!
//! ```text
//! Created ──> Initializing ──> Executing ──> Finalized
//!    │             │   └──────────────────────^
//!    └─────────────┴───────────┴──> Error (terminal)
//! ```
//!
//! Every public federate operation names an [`Operation`]; the machine
//! decides whether it is legal in the current state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a federate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederateState {
    Created,
    Initializing,
    Executing,
    Finalized,
    Error,
}

impl FederateState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, FederateState::Finalized | FederateState::Error)
    }
}

impl fmt::Display for FederateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FederateState::Created => "created",
            FederateState::Initializing => "initializing",
            FederateState::Executing => "executing",
            FederateState::Finalized => "finalized",
            FederateState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Operations gated by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterInterface,
    EnterExecutingMode,
    RequestTime,
    Publish,
    ReadValue,
    SetDefault,
    SendMessage,
    ReceiveMessage,
    SetProperty,
    Finalize,
}

impl Operation {
    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Operation::RegisterInterface => "register_interface",
            Operation::EnterExecutingMode => "enter_executing_mode",
            Operation::RequestTime => "request_time",
            Operation::Publish => "publish",
            Operation::ReadValue => "get_value",
            Operation::SetDefault => "set_default",
            Operation::SendMessage => "send_message",
            Operation::ReceiveMessage => "receive_message",
            Operation::SetProperty => "set_property",
            Operation::Finalize => "finalize",
        }
    }

    /// Whether this operation is legal in `state`.
    pub fn allowed_in(self, state: FederateState) -> bool {
        use FederateState::{Executing, Initializing};
        match self {
            Operation::RegisterInterface | Operation::EnterExecutingMode => state == Initializing,
            Operation::RequestTime
            | Operation::Publish
            | Operation::ReadValue
            | Operation::SendMessage
            | Operation::ReceiveMessage => state == Executing,
            Operation::SetDefault | Operation::SetProperty | Operation::Finalize => {
                matches!(state, Initializing | Executing)
            }
        }
    }
}

/// State holder enforcing legal transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: FederateState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: FederateState::Created,
        }
    }

    pub fn state(&self) -> FederateState {
        self.state
    }

    /// Fail with `InvalidStateTransition` unless `op` is legal now.
    pub fn check(&self, op: Operation) -> Result<()> {
        if op.allowed_in(self.state) {
            Ok(())
        } else {
            Err(Error::invalid_state(op.name(), self.state))
        }
    }

    /// `Created -> Initializing` once the broker acknowledged the federate.
    pub fn initialized(&mut self) -> Result<()> {
        self.transition(FederateState::Created, FederateState::Initializing, "initialize")
    }

    /// `Initializing -> Executing` on the broker's exec grant.
    pub fn executing(&mut self) -> Result<()> {
        self.transition(
            FederateState::Initializing,
            FederateState::Executing,
            Operation::EnterExecutingMode.name(),
        )
    }

    /// `Initializing | Executing -> Finalized`.
    pub fn finalize(&mut self) -> Result<()> {
        self.check(Operation::Finalize)?;
        self.state = FederateState::Finalized;
        Ok(())
    }

    /// Any non-terminal state `-> Error`. Returns false if already terminal.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = FederateState::Error;
        true
    }

    fn transition(
        &mut self,
        from: FederateState,
        to: FederateState,
        operation: &'static str,
    ) -> Result<()> {
        if self.state != from {
            return Err(Error::invalid_state(operation, self.state));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state(), FederateState::Created);
        sm.initialized().unwrap();
        sm.check(Operation::RegisterInterface).unwrap();
        sm.executing().unwrap();
        sm.check(Operation::RequestTime).unwrap();
        sm.finalize().unwrap();
        assert_eq!(sm.state(), FederateState::Finalized);
    }

    #[test]
    fn test_registration_only_while_initializing() {
        let mut sm = StateMachine::new();
        sm.initialized().unwrap();
        sm.executing().unwrap();
        let err = sm.check(Operation::RegisterInterface).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidStateTransition {
                state: FederateState::Executing,
                ..
            }
        ));
    }

    #[test]
    fn test_time_and_values_only_while_executing() {
        let mut sm = StateMachine::new();
        sm.initialized().unwrap();
        assert!(sm.check(Operation::RequestTime).is_err());
        assert!(sm.check(Operation::Publish).is_err());
        assert!(sm.check(Operation::ReadValue).is_err());
        assert!(sm.check(Operation::SetDefault).is_ok());
    }

    #[test]
    fn test_finalized_rejects_everything() {
        let mut sm = StateMachine::new();
        sm.initialized().unwrap();
        sm.executing().unwrap();
        sm.finalize().unwrap();
        for op in [
            Operation::Publish,
            Operation::RequestTime,
            Operation::ReadValue,
            Operation::Finalize,
        ] {
            assert!(sm.check(op).is_err(), "{:?} should be rejected", op);
        }
        assert!(sm.finalize().is_err());
    }

    #[test]
    fn test_error_is_terminal() {
        let mut sm = StateMachine::new();
        sm.initialized().unwrap();
        assert!(sm.fail());
        assert_eq!(sm.state(), FederateState::Error);
        assert!(!sm.fail());
        assert!(sm.executing().is_err());
        assert!(sm.finalize().is_err());
    }

    #[test]
    fn test_cannot_skip_initializing() {
        let mut sm = StateMachine::new();
        assert!(sm.executing().is_err());
    }
}
