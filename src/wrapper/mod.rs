// ============================================================================
// Action Wrapping
// ============================================================================
//
// Domain actions declared on specifications and the factory that invokes
// them: visibility, usability and argument rules are checked before the
// action body runs inside its own unit of work.
//
// ============================================================================

pub mod action;
pub mod factory;

pub use crate::core::InteractionVeto;
pub use action::{ActionBody, DisableRule, HideRule, ObjectAction, ValidateRule};
pub use factory::WrapperFactory;

/// How much of an invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Check the rules, then run the action.
    #[default]
    Execute,
    /// Run the action without checking its rules.
    SkipRules,
    /// Check the rules only.
    NoExecute,
}

impl ExecutionMode {
    pub fn checks_rules(&self) -> bool {
        !matches!(self, ExecutionMode::SkipRules)
    }

    pub fn executes(&self) -> bool {
        !matches!(self, ExecutionMode::NoExecute)
    }
}
