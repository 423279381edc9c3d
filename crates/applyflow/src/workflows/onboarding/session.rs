use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::chat::{
    CannedReplies, ChatConfig, ChatError, ChatSimulator, RandomReplySelector, ReplySelector,
};
use super::domain::{
    CandidateField, CandidateRecord, ChatMessage, MessageId, ProcessId, Progress, Stage,
    StageTransition, TrackingCode,
};
use super::identifiers::{next_generation, next_process_id, next_tracking_code};
use super::machine::{Intent, StageMachine, StageTimings, WorkflowError};
use super::validation::{format_national_id, validate, ValidationErrors};

/// Knobs applied when a session is created or reset.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub stage_timings: StageTimings,
    pub chat: ChatConfig,
    pub replies: CannedReplies,
}

/// Identifiers and candidate data owned by one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    process_id: ProcessId,
    tracking_code: Option<TrackingCode>,
    candidate: CandidateRecord,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            process_id: next_process_id(now),
            tracking_code: None,
            candidate: CandidateRecord::default(),
            started_at: now,
        }
    }

    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    pub fn tracking_code(&self) -> Option<&TrackingCode> {
        self.tracking_code.as_ref()
    }

    pub fn candidate(&self) -> &CandidateRecord {
        &self.candidate
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Everything that changed during one [`OnboardingSession::poll`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionEvents {
    pub transitions: Vec<StageTransition>,
    pub replies: Vec<ChatMessage>,
}

impl SessionEvents {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.replies.is_empty()
    }
}

/// Single-user workflow session: stage machine, validator, and chat assistant.
///
/// Time is always supplied by the caller, so the same session runs under a real clock
/// or a simulated one.
#[derive(Debug)]
pub struct OnboardingSession {
    settings: SessionSettings,
    context: SessionContext,
    machine: StageMachine,
    chat: ChatSimulator,
    validation: ValidationErrors,
}

impl OnboardingSession {
    pub fn new(settings: SessionSettings, now: DateTime<Utc>) -> Self {
        Self::with_selector(settings, Box::new(RandomReplySelector), now)
    }

    pub fn with_selector(
        settings: SessionSettings,
        selector: Box<dyn ReplySelector>,
        now: DateTime<Utc>,
    ) -> Self {
        let generation = next_generation();
        let context = SessionContext::new(now);
        info!(process_id = %context.process_id, "session started");

        Self {
            machine: StageMachine::new(generation, settings.stage_timings),
            chat: ChatSimulator::new(
                generation,
                settings.chat,
                settings.replies.clone(),
                selector,
                now,
            ),
            context,
            validation: ValidationErrors::default(),
            settings,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn process_id(&self) -> &ProcessId {
        self.context.process_id()
    }

    pub fn tracking_code(&self) -> Option<&TrackingCode> {
        self.context.tracking_code()
    }

    pub fn candidate(&self) -> &CandidateRecord {
        self.context.candidate()
    }

    pub fn stage(&self) -> Stage {
        self.machine.stage()
    }

    pub fn progress(&self) -> Progress {
        self.machine.stage().progress()
    }

    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.validation
    }

    pub fn is_authorization_prompt_open(&self) -> bool {
        self.machine.is_authorization_prompt_open()
    }

    pub fn is_loading(&self) -> bool {
        self.machine.is_loading()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.chat.messages()
    }

    pub fn history(&self) -> &[StageTransition] {
        self.machine.history()
    }

    /// Earliest pending timer across both the stage and chat timelines.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.machine.next_deadline(), self.chat.next_deadline()) {
            (Some(stage), Some(chat)) => Some(stage.min(chat)),
            (stage, chat) => stage.or(chat),
        }
    }

    /// Edit one form field. National ids are normalized as they are typed.
    pub fn update_candidate(
        &mut self,
        field: CandidateField,
        value: &str,
    ) -> Result<(), WorkflowError> {
        self.ensure_editable()?;
        let value = match field {
            CandidateField::NationalId => format_national_id(value),
            _ => value.to_string(),
        };
        self.context.candidate.set_value(field, value);
        Ok(())
    }

    /// Recompute the error set for the current draft.
    pub fn validate_draft(&mut self) -> &ValidationErrors {
        self.validation = validate(&self.context.candidate);
        &self.validation
    }

    /// Submit the given record. On success it replaces the draft and review starts.
    pub fn submit(
        &mut self,
        record: CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.machine.ensure_stage(Intent::Submit, Stage::Application)?;

        let errors = validate(&record);
        if !errors.is_empty() {
            info!(fields = errors.len(), "submission rejected");
            self.validation = errors.clone();
            return Err(WorkflowError::Validation(errors));
        }

        self.machine.begin_analysis(now)?;
        self.validation = ValidationErrors::default();
        self.context.candidate = record;
        Ok(())
    }

    pub fn submit_draft(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        let record = self.context.candidate.clone();
        self.submit(record, now)
    }

    pub fn request_contract_authorization(&mut self) -> Result<(), WorkflowError> {
        self.machine.request_contract_authorization()
    }

    pub fn cancel_contract_authorization(&mut self) -> Result<(), WorkflowError> {
        self.machine.cancel_contract_authorization()
    }

    pub fn confirm_contract(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.machine.confirm_contract(now)
    }

    pub fn confirm_payment(&mut self, now: DateTime<Utc>) -> Result<&TrackingCode, WorkflowError> {
        self.machine.confirm_payment(now)?;
        let code = self
            .context
            .tracking_code
            .insert(next_tracking_code(now));
        info!(process_id = %self.context.process_id, tracking_code = %code, "workflow completed");
        Ok(code)
    }

    pub fn send_user_message(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageId, ChatError> {
        self.chat.send_user_message(text, now)
    }

    /// Fire every timer due at or before `now`. Stage and chat timelines never wait on
    /// each other.
    pub fn poll(&mut self, now: DateTime<Utc>) -> SessionEvents {
        SessionEvents {
            transitions: self.machine.fire_due(now),
            replies: self.chat.fire_due(now),
        }
    }

    /// Begin a fresh session in place: new process id, empty draft, new chat log.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let generation = next_generation();
        self.context = SessionContext::new(now);
        self.validation = ValidationErrors::default();
        self.machine.restart(generation);
        self.chat.restart(generation, now);
        info!(process_id = %self.context.process_id, "session reset");
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let stage = self.stage();
        SessionSnapshot {
            process_id: self.context.process_id.clone(),
            tracking_code: self.context.tracking_code.clone(),
            stage,
            stage_label: stage.label(),
            progress_percent: stage.progress().percent(),
            candidate: self.context.candidate.clone(),
            validation_errors: self.validation.clone(),
            authorization_prompt_open: self.is_authorization_prompt_open(),
            loading: self.is_loading(),
            messages: self.chat.messages().to_vec(),
            transitions: self.machine.history().to_vec(),
        }
    }

    fn ensure_editable(&self) -> Result<(), WorkflowError> {
        if self.stage().accepts_candidate_edits() {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                intent: Intent::EditCandidate,
                stage: self.stage(),
            })
        }
    }
}

/// Serializable view handed to the presenter after each change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub process_id: ProcessId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<TrackingCode>,
    pub stage: Stage,
    pub stage_label: &'static str,
    pub progress_percent: f64,
    pub candidate: CandidateRecord,
    pub validation_errors: ValidationErrors,
    pub authorization_prompt_open: bool,
    pub loading: bool,
    pub messages: Vec<ChatMessage>,
    pub transitions: Vec<StageTransition>,
}
