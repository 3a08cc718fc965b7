//! UI-side mirror of the decision function.
//!
//! Only hides or disables affordances. Every operation it gates is checked
//! again by [`Enforcer`](super::Enforcer) on the server.

use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use super::principal::Principal;
use super::{Action, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Identity not resolved yet; render nothing.
    Loading,
    Denied,
    Granted,
}

/// Gate decision for the current (possibly unresolved) principal.
pub fn gate_state(principal: Option<&Principal>, module: Module, action: Action) -> GateState {
    match principal {
        None => GateState::Loading,
        Some(p) if p.authorize(module, action) => GateState::Granted,
        Some(_) => GateState::Denied,
    }
}

/// Gate driven by a reactive identity source.
#[derive(Debug, Clone)]
pub struct PresentationGate {
    identity: watch::Receiver<Option<Principal>>,
}

impl PresentationGate {
    pub fn new(identity: watch::Receiver<Option<Principal>>) -> Self {
        Self { identity }
    }

    pub fn state(&self, module: Module, action: Action) -> GateState {
        gate_state(self.identity.borrow().as_ref(), module, action)
    }

    pub fn can_access(&self, module: Module) -> GateState {
        self.state(module, Action::View)
    }

    /// Renders `granted` or `fallback`; `None` while the identity is loading.
    pub fn render<T>(
        &self,
        module: Module,
        action: Action,
        granted: impl FnOnce() -> T,
        fallback: impl FnOnce() -> T,
    ) -> Option<T> {
        match self.state(module, action) {
            GateState::Loading => None,
            GateState::Granted => Some(granted()),
            GateState::Denied => Some(fallback()),
        }
    }

    /// Waits until the identity source resolves, then returns the decision.
    /// Stays `Loading` if the source is dropped before resolving.
    pub async fn resolved(&mut self, module: Module, action: Action) -> GateState {
        match self.identity.wait_for(Option::is_some).await {
            Ok(principal) => gate_state(principal.as_ref(), module, action),
            Err(_) => GateState::Loading,
        }
    }
}
