//! Rule definitions, lifecycle and execution.
//!
//! # Module Structure
//! - `models`: rules, lifecycle states and execution results
//! - `config`: batch concurrency and sample size
//! - `compile`: kind/parameter validation into statements
//! - `engine`: storage, transitions and execution

mod compile;
mod config;
mod engine;
mod models;

pub use config::RulesConfig;
pub use engine::RuleEngine;
pub use models::{
    ExecutionResult, NewRule, Rule, RuleKind, RuleStatus, RuleUpdate, Severity, pass_rate,
};
