//! charday-bot library interface
//!
//! Exposes the daily workflow and its collaborators for the binary and for
//! integration tests.

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod images;
pub mod lifecycle;
pub mod matching;
pub mod publish;
pub mod resolver;
pub mod source;
pub mod utils;
pub mod workflow;

pub use crate::api::{build_router, AppState};
pub use crate::bootstrap::{build_components, BootstrapError, Components};
pub use crate::resolver::CharacterResolver;
pub use crate::workflow::{DailyWorkflow, DaySummary, Housekeeper, SlotOutcome, WorkflowError};
