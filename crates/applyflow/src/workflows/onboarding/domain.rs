use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete phase of the application workflow.
///
/// Order is defined by [`Stage::ORDERED`], never by declaration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Application,
    Analyzing,
    ProfileReview,
    Interview,
    Approved,
    Contract,
    Equipment,
    Completed,
}

impl Stage {
    /// Canonical pipeline order. Drives both transition adjacency and progress.
    pub const ORDERED: [Stage; 8] = [
        Stage::Application,
        Stage::Analyzing,
        Stage::ProfileReview,
        Stage::Interview,
        Stage::Approved,
        Stage::Contract,
        Stage::Equipment,
        Stage::Completed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Analyzing => "Analyzing",
            Self::ProfileReview => "Profile Review",
            Self::Interview => "Interview",
            Self::Approved => "Approved",
            Self::Contract => "Contract",
            Self::Equipment => "Equipment",
            Self::Completed => "Completed",
        }
    }

    /// Zero-based index within [`Stage::ORDERED`].
    pub fn position(self) -> usize {
        Self::ORDERED
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or_default()
    }

    pub fn successor(self) -> Option<Stage> {
        Self::ORDERED.get(self.position() + 1).copied()
    }

    pub fn progress(self) -> Progress {
        Progress {
            position: self.position() + 1,
            total: Self::ORDERED.len(),
        }
    }

    /// Candidate data is only editable before the automated review starts.
    pub fn accepts_candidate_edits(self) -> bool {
        self == Self::Application
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived completion ratio for a stage. Never stored on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    position: usize,
    total: usize,
}

impl Progress {
    /// One-based position of the stage.
    pub fn position(self) -> usize {
        self.position
    }

    pub fn total(self) -> usize {
        self.total
    }

    pub fn fraction(self) -> f64 {
        self.position as f64 / self.total as f64
    }

    pub fn percent(self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Form fields captured on the application screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateField {
    Name,
    NationalId,
    Email,
    Phone,
    Address,
    PriorExperience,
    MotivationText,
}

impl CandidateField {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Name,
            Self::NationalId,
            Self::Email,
            Self::Phone,
            Self::Address,
            Self::PriorExperience,
            Self::MotivationText,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Full name",
            Self::NationalId => "National ID",
            Self::Email => "E-mail",
            Self::Phone => "Phone",
            Self::Address => "Address",
            Self::PriorExperience => "Prior experience",
            Self::MotivationText => "Motivation",
        }
    }

    pub const fn is_required(self) -> bool {
        !matches!(self, Self::PriorExperience)
    }
}

impl fmt::Display for CandidateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Applicant data assembled from form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub prior_experience: Option<String>,
    pub motivation_text: String,
}

impl CandidateRecord {
    pub fn value(&self, field: CandidateField) -> &str {
        match field {
            CandidateField::Name => &self.name,
            CandidateField::NationalId => &self.national_id,
            CandidateField::Email => &self.email,
            CandidateField::Phone => &self.phone,
            CandidateField::Address => &self.address,
            CandidateField::PriorExperience => self.prior_experience.as_deref().unwrap_or(""),
            CandidateField::MotivationText => &self.motivation_text,
        }
    }

    pub fn set_value(&mut self, field: CandidateField, value: String) {
        match field {
            CandidateField::Name => self.name = value,
            CandidateField::NationalId => self.national_id = value,
            CandidateField::Email => self.email = value,
            CandidateField::Phone => self.phone = value,
            CandidateField::Address => self.address = value,
            CandidateField::PriorExperience => {
                self.prior_experience = if value.trim().is_empty() {
                    None
                } else {
                    Some(value)
                };
            }
            CandidateField::MotivationText => self.motivation_text = value,
        }
    }
}

/// Identifier assigned once when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub String);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier issued when the workflow reaches [`Stage::Completed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingCode(pub String);

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Sender,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// What caused a stage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    User,
    Timer,
}

/// Audit entry appended each time the active stage changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    /// Stage passed through without its own screen, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<Stage>,
    pub trigger: TransitionTrigger,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_covers_every_stage_once() {
        for (index, stage) in Stage::ORDERED.iter().enumerate() {
            assert_eq!(stage.position(), index);
        }
        assert_eq!(Stage::Completed.successor(), None);
        assert_eq!(Stage::Approved.successor(), Some(Stage::Contract));
    }

    #[test]
    fn interview_progress_is_half_way() {
        let progress = Stage::Interview.progress();
        assert_eq!(progress.position(), 4);
        assert_eq!(progress.total(), 8);
        assert!((progress.percent() - 50.0).abs() < f64::EPSILON);
        assert!((Stage::Completed.progress().percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_prior_experience_clears_field() {
        let mut record = CandidateRecord::default();
        record.set_value(CandidateField::PriorExperience, "Retail, 3 years".to_string());
        assert_eq!(record.value(CandidateField::PriorExperience), "Retail, 3 years");

        record.set_value(CandidateField::PriorExperience, "   ".to_string());
        assert_eq!(record.prior_experience, None);
    }
}
