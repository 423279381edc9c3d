use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::domain::{Stage, StageTransition, TransitionTrigger};
use super::identifiers::Generation;
use super::timeline::Timeline;
use super::validation::ValidationErrors;

/// Offsets of the automated review stages, measured from the submit instant.
///
/// Offsets never decrease, so each timer finds its predecessor stage already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimings {
    profile_review: Duration,
    interview: Duration,
    approved: Duration,
}

impl Default for StageTimings {
    fn default() -> Self {
        Self::evenly_spaced(Duration::from_secs(4))
    }
}

/// Rejected stage offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimingsError {
    #[error("the {stage} offset must not be earlier than the offset of the stage before it")]
    OutOfOrder { stage: Stage },
}

impl StageTimings {
    pub fn new(
        profile_review: Duration,
        interview: Duration,
        approved: Duration,
    ) -> Result<Self, TimingsError> {
        if interview < profile_review {
            return Err(TimingsError::OutOfOrder {
                stage: Stage::Interview,
            });
        }
        if approved < interview {
            return Err(TimingsError::OutOfOrder {
                stage: Stage::Approved,
            });
        }
        Ok(Self {
            profile_review,
            interview,
            approved,
        })
    }

    pub fn evenly_spaced(step: Duration) -> Self {
        Self {
            profile_review: step,
            interview: step.saturating_mul(2),
            approved: step.saturating_mul(3),
        }
    }

    pub fn profile_review(&self) -> Duration {
        self.profile_review
    }

    pub fn interview(&self) -> Duration {
        self.interview
    }

    pub fn approved(&self) -> Duration {
        self.approved
    }

    fn schedule(&self) -> [(Duration, Stage, Stage); 3] {
        [
            (self.profile_review, Stage::Analyzing, Stage::ProfileReview),
            (self.interview, Stage::ProfileReview, Stage::Interview),
            (self.approved, Stage::Interview, Stage::Approved),
        ]
    }
}

/// Caller-initiated request to change workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    EditCandidate,
    Submit,
    RequestContractAuthorization,
    CancelContractAuthorization,
    ConfirmContract,
    ConfirmPayment,
}

impl Intent {
    pub const fn label(self) -> &'static str {
        match self {
            Intent::EditCandidate => "edit candidate",
            Intent::Submit => "submit",
            Intent::RequestContractAuthorization => "request contract authorization",
            Intent::CancelContractAuthorization => "cancel contract authorization",
            Intent::ConfirmContract => "confirm contract",
            Intent::ConfirmPayment => "confirm payment",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Recoverable failures reported back to the presenter. Neither mutates state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("submission rejected: {0}")]
    Validation(ValidationErrors),
    #[error("cannot {intent} while the workflow is in the {stage} stage")]
    InvalidTransition { intent: Intent, stage: Stage },
}

/// Token carried by an automated transition, checked when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimer {
    pub generation: Generation,
    pub expected: Stage,
    pub target: Stage,
}

/// Linear stage controller with timer-driven review stages.
#[derive(Debug)]
pub struct StageMachine {
    generation: Generation,
    stage: Stage,
    authorization_prompt_open: bool,
    loading: bool,
    timings: StageTimings,
    timers: Timeline<StageTimer>,
    history: Vec<StageTransition>,
}

impl StageMachine {
    pub fn new(generation: Generation, timings: StageTimings) -> Self {
        Self {
            generation,
            stage: Stage::Application,
            authorization_prompt_open: false,
            loading: false,
            timings,
            timers: Timeline::default(),
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_authorization_prompt_open(&self) -> bool {
        self.authorization_prompt_open
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Start over under a new generation. Already scheduled timers stay queued and are
    /// discarded as stale when they fire.
    pub fn restart(&mut self, generation: Generation) {
        self.generation = generation;
        self.stage = Stage::Application;
        self.authorization_prompt_open = false;
        self.loading = false;
        self.history.clear();
    }

    pub fn ensure_stage(&self, intent: Intent, required: Stage) -> Result<(), WorkflowError> {
        if self.stage == required {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                intent,
                stage: self.stage,
            })
        }
    }

    /// Move from Application into Analyzing and queue the review timers.
    ///
    /// All three offsets are anchored to `now`, not to the previous stage change.
    pub fn begin_analysis(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_stage(Intent::Submit, Stage::Application)?;

        self.loading = true;
        self.advance(Stage::Analyzing, None, TransitionTrigger::User, now);

        for (delay, expected, target) in self.timings.schedule() {
            self.timers.schedule_after(
                now,
                delay,
                StageTimer {
                    generation: self.generation,
                    expected,
                    target,
                },
            );
        }
        Ok(())
    }

    pub fn request_contract_authorization(&mut self) -> Result<(), WorkflowError> {
        self.ensure_stage(Intent::RequestContractAuthorization, Stage::Approved)?;
        self.authorization_prompt_open = true;
        Ok(())
    }

    pub fn cancel_contract_authorization(&mut self) -> Result<(), WorkflowError> {
        self.ensure_prompt_open(Intent::CancelContractAuthorization)?;
        self.authorization_prompt_open = false;
        Ok(())
    }

    /// Approved goes straight to Equipment; Contract has no screen of its own.
    pub fn confirm_contract(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_prompt_open(Intent::ConfirmContract)?;
        self.authorization_prompt_open = false;
        self.advance(
            Stage::Equipment,
            Some(Stage::Contract),
            TransitionTrigger::User,
            now,
        );
        Ok(())
    }

    pub fn confirm_payment(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_stage(Intent::ConfirmPayment, Stage::Equipment)?;
        self.advance(Stage::Completed, None, TransitionTrigger::User, now);
        Ok(())
    }

    /// Apply every timer due at or before `now`, in deadline order.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<StageTransition> {
        let mut applied = Vec::new();

        while let Some((due, timer)) = self.timers.pop_due(now) {
            if timer.generation != self.generation || timer.expected != self.stage {
                debug!(
                    expected = %timer.expected,
                    target = %timer.target,
                    current = %self.stage,
                    "discarding stale stage timer"
                );
                continue;
            }

            if timer.target == Stage::Approved {
                self.loading = false;
            }
            self.advance(timer.target, None, TransitionTrigger::Timer, due);
            applied.extend(self.history.last().cloned());
        }

        applied
    }

    fn ensure_prompt_open(&self, intent: Intent) -> Result<(), WorkflowError> {
        if self.stage == Stage::Approved && self.authorization_prompt_open {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                intent,
                stage: self.stage,
            })
        }
    }

    fn advance(
        &mut self,
        to: Stage,
        via: Option<Stage>,
        trigger: TransitionTrigger,
        at: DateTime<Utc>,
    ) {
        let from = self.stage;
        self.stage = to;
        info!(%from, %to, ?trigger, "stage transition");
        self.history.push(StageTransition {
            from,
            to,
            via,
            trigger,
            at,
        });
    }
}
