//! Test plan execution engine
//!
//! Steps run strictly one after another; a later step may rely on device
//! configuration left behind by an earlier one. Each step moves through
//!
//! ```text
//! Pending -> RunningScript -> ScriptFailed
//!                          -> ScriptOk -> Done                       (no verification)
//!                                      -> Verifying -> Verified | VerifyFailed
//! ```
//!
//! Nothing is rolled back: if a step fails after earlier steps changed the
//! device, those changes stay in place.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::Instrument;

use super::plan::{TestPlan, TestStep, Verification};
use crate::common::config::RunPolicy;
use crate::common::Error;
use crate::device::DeviceQueryChannel;
use crate::scripts::ScriptRegistry;

/// Where a step is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    RunningScript,
    ScriptFailed,
    ScriptOk,
    Verifying,
    Verified,
    VerifyFailed,
    Done,
}

impl StepState {
    /// Terminal states that count as a pass
    pub fn is_success(self) -> bool {
        matches!(self, StepState::Verified | StepState::Done)
    }
}

/// Why a step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ScriptNotFound,
    ScriptExecutionFailed,
    ScriptTimeout,
    DeviceQueryFailed,
    DeviceQueryTimeout,
    VerificationMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    fn from_error(error: &Error) -> Self {
        let kind = match error {
            Error::ScriptNotFound(_) => FailureKind::ScriptNotFound,
            Error::ScriptTimeout { .. } => FailureKind::ScriptTimeout,
            Error::DeviceQueryTimeout { .. } => FailureKind::DeviceQueryTimeout,
            Error::DeviceQueryFailed { .. } => FailureKind::DeviceQueryFailed,
            Error::VerificationMismatch { .. } => FailureKind::VerificationMismatch,
            _ => FailureKind::ScriptExecutionFailed,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// 0-based position in the plan
    pub index: usize,
    pub script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: StepState,
    pub script_succeeded: bool,
    pub verification_ran: bool,
    /// `None` when no verification ran or the query itself failed
    pub verification_passed: Option<bool>,
    pub raw_output: Option<String>,
    pub failure: Option<Failure>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn new(index: usize, step: &TestStep) -> Self {
        Self {
            index,
            script: step.script.clone(),
            description: step.description.clone(),
            state: StepState::Pending,
            script_succeeded: false,
            verification_ran: false,
            verification_passed: None,
            raw_output: None,
            failure: None,
            duration_ms: 0,
        }
    }

    fn transition(&mut self, to: StepState) {
        tracing::debug!(from = ?self.state, to = ?to, "Step state changed");
        self.state = to;
    }

    fn fail(&mut self, to: StepState, error: &Error) {
        self.failure = Some(Failure::from_error(error));
        self.transition(to);
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.state.is_success()
    }
}

/// Results of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub plan: Option<String>,
    pub policy: RunPolicy,
    pub total_steps: usize,
    pub results: Vec<ExecutionResult>,
    /// Index of the failed step that stopped the run
    pub aborted_at: Option<usize>,
    /// The run was cancelled between steps
    pub cancelled: bool,
}

impl RunReport {
    /// Every step ran and passed
    pub fn passed(&self) -> bool {
        !self.cancelled
            && self.aborted_at.is_none()
            && self.results.len() == self.total_steps
            && self.results.iter().all(ExecutionResult::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// Steps that never started
    pub fn not_run_count(&self) -> usize {
        self.total_steps - self.results.len()
    }
}

/// Cooperative cancellation, honoured between steps only
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs test plans against a script registry and a device channel
pub struct ExecutionEngine {
    registry: ScriptRegistry,
    channel: Arc<dyn DeviceQueryChannel>,
    policy: RunPolicy,
    script_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl ExecutionEngine {
    pub fn new(registry: ScriptRegistry, channel: Arc<dyn DeviceQueryChannel>) -> Self {
        Self {
            registry,
            channel,
            policy: RunPolicy::default(),
            script_timeout: None,
            query_timeout: None,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Default limit for scripts that do not set their own
    pub fn with_script_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, plan: &TestPlan) -> RunReport {
        self.run_with(plan, |_| {}).await
    }

    /// Run a plan, calling `on_step` as each step finishes
    pub async fn run_with<F>(&self, plan: &TestPlan, mut on_step: F) -> RunReport
    where
        F: FnMut(&ExecutionResult),
    {
        let mut report = RunReport {
            plan: plan.name.clone(),
            policy: self.policy,
            total_steps: plan.len(),
            results: Vec::with_capacity(plan.len()),
            aborted_at: None,
            cancelled: false,
        };

        tracing::info!(plan = ?plan.name, steps = plan.len(), policy = ?self.policy, "Starting test plan");

        for (index, step) in plan.steps().iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(next_step = index, "Run cancelled");
                report.cancelled = true;
                break;
            }

            let span = tracing::info_span!("step", index, script = %step.script);
            let result = self.execute_step(index, step).instrument(span).await;
            on_step(&result);

            let failed = !result.passed();
            report.results.push(result);

            if failed && self.policy == RunPolicy::AbortOnFirstFailure {
                tracing::warn!(step = index, "Step failed, aborting remaining steps");
                report.aborted_at = Some(index);
                break;
            }
        }

        tracing::info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            not_run = report.not_run_count(),
            "Test plan finished"
        );
        report
    }

    async fn execute_step(&self, index: usize, step: &TestStep) -> ExecutionResult {
        let started = Instant::now();
        let mut result = ExecutionResult::new(index, step);
        self.drive_step(step, &mut result).await;
        result.duration_ms = started.elapsed().as_millis() as u64;

        match &result.failure {
            None => tracing::info!(state = ?result.state, "Step passed"),
            Some(failure) => tracing::warn!(kind = ?failure.kind, "{}", failure.message),
        }
        result
    }

    async fn drive_step(&self, step: &TestStep, result: &mut ExecutionResult) {
        result.transition(StepState::RunningScript);

        let handle = match self.registry.resolve(&step.script) {
            Ok(handle) => handle,
            Err(e) => return result.fail(StepState::ScriptFailed, &e),
        };

        let entry_point = handle.entry_point();
        let timeout = entry_point.timeout().or(self.script_timeout);
        let outcome = with_timeout(timeout, entry_point.run_test(&step.params), |secs| {
            Error::ScriptTimeout {
                script: step.script.clone(),
                secs,
            }
        })
        .await;

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                let e = Error::script_failed(&step.script, "returned a falsy or empty result");
                return result.fail(StepState::ScriptFailed, &e);
            }
            Err(e) => return result.fail(StepState::ScriptFailed, &e),
        }

        result.script_succeeded = true;
        result.transition(StepState::ScriptOk);

        match &step.verification {
            None => result.transition(StepState::Done),
            Some(verification) => self.verify(verification, result).await,
        }
    }

    async fn verify(&self, verification: &Verification, result: &mut ExecutionResult) {
        result.transition(StepState::Verifying);
        result.verification_ran = true;

        let command = &verification.command;
        let output = with_timeout(self.query_timeout, self.channel.query(command), |secs| {
            Error::DeviceQueryTimeout {
                command: command.clone(),
                secs,
            }
        })
        .await;

        // Anything the channel raises means the answer is unknown
        let output = match output {
            Ok(output) => output,
            Err(e @ (Error::DeviceQueryFailed { .. } | Error::DeviceQueryTimeout { .. })) => {
                return result.fail(StepState::VerifyFailed, &e)
            }
            Err(e) => {
                let e = Error::query_failed(command, e.to_string());
                return result.fail(StepState::VerifyFailed, &e);
            }
        };

        let passed = output_matches(&output, &verification.expected_output);
        result.raw_output = Some(output);
        result.verification_passed = Some(passed);

        if passed {
            result.transition(StepState::Verified);
        } else {
            let e = Error::VerificationMismatch {
                expected: verification.expected_output.clone(),
            };
            result.fail(StepState::VerifyFailed, &e);
        }
    }
}

/// Exact, case-sensitive containment; empty output never matches
pub fn output_matches(output: &str, expected: &str) -> bool {
    !output.is_empty() && output.contains(expected)
}

async fn with_timeout<T, Fut, E>(
    limit: Option<Duration>,
    fut: Fut,
    on_elapsed: E,
) -> crate::common::Result<T>
where
    Fut: Future<Output = crate::common::Result<T>>,
    E: FnOnce(u64) -> Error,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(on_elapsed(limit.as_secs()))),
        None => fut.await,
    }
}
