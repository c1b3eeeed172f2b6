#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts in budget/timing code (token counts, durations, counters)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
// Orchestrator functions are naturally long; splitting would be artificial
#![allow(clippy::too_many_lines)]
// Module structure — our investigation module has investigation::InvestigationRecord by design
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod config;
pub mod context;
pub mod convo;
pub mod errors;
pub mod investigation;
pub mod provider;
pub mod safety;
pub mod telemetry;
pub mod tools;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
