//! Rule-group document schema.
//!
//! Two shapes of the same document:
//! - [`ConfigRuleGroups`]: what users write, each group optionally tagged with
//!   `partial_response_strategy`.
//! - [`RuleGroups`]: the policy-stripped form written to the scratch directory
//!   and consumed by the evaluation engines, which reject unknown fields.

mod config;
mod group;

pub use config::*;
pub use group::*;

#[cfg(test)]
mod tests;
