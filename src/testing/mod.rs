//! Test plan execution
//!
//! Loads declarative test plans, runs each step's script through the
//! registry and checks the device afterwards. Results come back as
//! structured data ([`RunReport`]) rather than console text so callers can
//! build their own reports.

mod engine;
mod plan;
pub mod report;

pub use engine::{
    output_matches, CancelSignal, ExecutionEngine, ExecutionResult, Failure, FailureKind,
    RunReport, StepState,
};
pub use plan::{load_plan, PlanFormat, TestPlan, TestStep, Verification};
