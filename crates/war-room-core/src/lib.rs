//! Rubric scoring for crisis-communications drills.
//!
//! Everything in this crate is pure: the statement and decision evaluators are
//! functions of their input, and the rubric itself is a set of constant tables
//! so it can be extended without touching the scoring logic.

use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub mod scenario;

pub use scenario::{elapsed_minute, EventKind, Scenario, ScenarioEvent, SCENARIO_MAX_MINUTE};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("scenario error: {0}")]
    Scenario(String),
    #[error("timestamp format error: {0}")]
    Format(String),
}

/// Canonical crisis-communication phrases, in match-reporting order.
pub const KEY_PHRASES: [&str; 11] = [
    "neutral step",
    "full and fair investigation",
    "without prejudice",
    "lawful free expression",
    "free expression",
    "free speech",
    "harassment or discrimination",
    "zero tolerance",
    "consider all relevant evidence",
    "we will not be making further comment",
    "respect for due process",
];

/// Emotionally loaded terms that cost the tone check.
pub const LOADED_TERMS: [&str; 5] = ["woke", "witch hunt", "mob", "racist!", "hate speech!"];

pub const PHRASE_POINTS: u32 = 5;
pub const MAX_SCORE: u32 = 100;
pub const MAX_LISTED_MATCHES: usize = 5;
pub const NO_STATEMENT_NOTE: &str = "No statement provided.";
pub const ALIGNMENT_NOTE_PREFIX: &str = "Good alignment with best practice phrases: ";

/// One weighted boolean heuristic over lower-cased statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RubricCheck {
    pub name: &'static str,
    pub weight: u32,
    pub corrective_note: &'static str,
    /// Each group needs at least one of its cues present.
    pub required_cues: &'static [&'static [&'static str]],
    /// None of these may appear.
    pub forbidden_cues: &'static [&'static str],
}

impl RubricCheck {
    #[must_use]
    pub fn passes(&self, lower: &str) -> bool {
        self.required_cues.iter().all(|group| group.iter().any(|cue| lower.contains(cue)))
            && self.forbidden_cues.iter().all(|cue| !lower.contains(cue))
    }
}

/// Heuristics in note order: clarity, balance, tone, control.
pub const STATEMENT_CHECKS: [RubricCheck; 4] = [
    RubricCheck {
        name: "clarity",
        weight: 15,
        corrective_note: "Add clear process: precautionary suspension and investigation.",
        required_cues: &[&["suspend", "suspension"], &["investig"]],
        forbidden_cues: &[],
    },
    RubricCheck {
        name: "balance",
        weight: 15,
        corrective_note: "Balance both: free speech/expression AND zero tolerance for harassment/discrimination.",
        required_cues: &[&["free speech", "free expression"], &["harassment", "discrimination"]],
        forbidden_cues: &[],
    },
    RubricCheck {
        name: "tone",
        weight: 10,
        corrective_note: "Avoid emotionally loaded terms that could inflame coverage.",
        required_cues: &[],
        forbidden_cues: &LOADED_TERMS,
    },
    RubricCheck {
        name: "control",
        weight: 10,
        corrective_note: "Include a line controlling information flow (e.g., no further comment during investigation).",
        required_cues: &[&["further comment"]],
        forbidden_cues: &[],
    },
];

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScoredStatement {
    pub score: u32,
    pub notes: Vec<String>,
    #[serde(default)]
    pub matches: Vec<String>,
}

/// Blank also covers the ASCII information separators U+001C..U+001F, which
/// `char::is_whitespace` leaves out.
fn is_blank(text: &str) -> bool {
    text.chars().all(|ch| ch.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&ch))
}

/// Score a holding statement against the phrase list and the heuristic table.
#[must_use]
pub fn score_statement(text: &str) -> ScoredStatement {
    if is_blank(text) {
        return ScoredStatement {
            score: 0,
            notes: vec![NO_STATEMENT_NOTE.to_string()],
            matches: Vec::new(),
        };
    }

    let lower = text.to_lowercase();
    let matches = KEY_PHRASES
        .iter()
        .filter(|phrase| lower.contains(*phrase))
        .map(|phrase| (*phrase).to_string())
        .collect::<Vec<_>>();

    let mut raw = PHRASE_POINTS.saturating_mul(u32::try_from(matches.len()).unwrap_or(u32::MAX));
    let mut notes = Vec::new();
    for check in &STATEMENT_CHECKS {
        if check.passes(&lower) {
            raw = raw.saturating_add(check.weight);
        } else {
            notes.push(check.corrective_note.to_string());
        }
    }

    if !matches.is_empty() {
        let listed = matches.iter().take(MAX_LISTED_MATCHES).cloned().collect::<Vec<_>>();
        let ellipsis = if matches.len() > MAX_LISTED_MATCHES { "..." } else { "" };
        notes.push(format!("{ALIGNMENT_NOTE_PREFIX}{}{ellipsis}", listed.join(", ")));
    }

    ScoredStatement { score: raw.min(MAX_SCORE), notes, matches }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPoint {
    RespondNow,
    BbcRequest,
    CharityStory,
}

impl DecisionPoint {
    pub const ALL: [Self; 3] = [Self::RespondNow, Self::BbcRequest, Self::CharityStory];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RespondNow => "respond_now",
            Self::BbcRequest => "bbc_request",
            Self::CharityStory => "charity_story",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "respond_now" => Some(Self::RespondNow),
            "bbc_request" => Some(Self::BbcRequest),
            "charity_story" => Some(Self::CharityStory),
            _ => None,
        }
    }

    /// Question shown to the trainee at this point of the drill.
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::RespondNow => "T+8 min: Respond now or delay?",
            Self::BbcRequest => "T+25 min: BBC Today request",
            Self::CharityStory => "T+45 min: Push charity story now or hold?",
        }
    }

    /// Menu offered to the trainee. Any free text is still accepted.
    #[must_use]
    pub fn choices(self) -> &'static [&'static str] {
        match self {
            Self::RespondNow => &["Respond now with holding statement", "Delay pending internal review"],
            Self::BbcRequest => &[
                "Accept live principal interview",
                "Decline and issue written statement",
                "Offer deputy spokesperson instead",
            ],
            Self::CharityStory => &["Push now", "Hold"],
        }
    }
}

/// Raw selections for the three decision points. Missing keys read as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DecisionSelections {
    #[serde(default)]
    pub respond_now: String,
    #[serde(default)]
    pub bbc_request: String,
    #[serde(default)]
    pub charity_story: String,
}

impl DecisionSelections {
    #[must_use]
    pub fn get(&self, point: DecisionPoint) -> &str {
        match point {
            DecisionPoint::RespondNow => &self.respond_now,
            DecisionPoint::BbcRequest => &self.bbc_request,
            DecisionPoint::CharityStory => &self.charity_story,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionRule {
    pub point: DecisionPoint,
    pub cues: &'static [&'static str],
    pub points: u32,
    pub credit_note: &'static str,
    pub miss_note: &'static str,
}

pub const DECISION_RULES: [DecisionRule; 3] = [
    DecisionRule {
        point: DecisionPoint::RespondNow,
        cues: &["respond"],
        points: 15,
        credit_note: "Responded early with a holding statement to shape the frame.",
        miss_note: "Delayed response; risked losing the narrative.",
    },
    DecisionRule {
        point: DecisionPoint::BbcRequest,
        cues: &["written", "deputy"],
        points: 10,
        credit_note: "Chose controlled format for BBC request (written or deputy).",
        miss_note: "Accepted live principal interview; higher risk unless extremely well-prepped.",
    },
    DecisionRule {
        point: DecisionPoint::CharityStory,
        cues: &["hold"],
        points: 10,
        credit_note: "Held the unrelated positive story to avoid appearing evasive.",
        miss_note: "Pushed positive story during crisis; could be perceived as deflection.",
    },
];

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScoredDecisions {
    pub score: u32,
    pub notes: Vec<String>,
}

/// Score the three decision points. Always yields one note per point.
#[must_use]
pub fn score_decisions(decisions: &DecisionSelections) -> ScoredDecisions {
    let mut score = 0_u32;
    let mut notes = Vec::with_capacity(DECISION_RULES.len());

    for rule in &DECISION_RULES {
        let value = decisions.get(rule.point).to_lowercase();
        if rule.cues.iter().any(|cue| value.contains(cue)) {
            score += rule.points;
            notes.push(rule.credit_note.to_string());
        } else {
            notes.push(rule.miss_note.to_string());
        }
    }

    ScoredDecisions { score, notes }
}

/// Statement weighted at 70%, decisions added as-is, rounded half up, capped at 100.
#[must_use]
pub fn overall_score(statement_score: u32, decisions_score: u32) -> u32 {
    let weighted_statement = statement_score.saturating_mul(7).saturating_add(5) / 10;
    weighted_statement.saturating_add(decisions_score).min(MAX_SCORE)
}

pub const SESSION_SCHEMA_VERSION: u32 = 1;

const SESSION_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

fn default_schema_version() -> u32 {
    SESSION_SCHEMA_VERSION
}

/// Format a creation time as the second-resolution UTC stamp used in session names.
///
/// # Errors
/// Returns [`CoreError::Format`] when the time cannot be rendered (years outside 0..=9999).
pub fn format_session_timestamp(at: OffsetDateTime) -> Result<String, CoreError> {
    at.to_offset(UtcOffset::UTC)
        .format(SESSION_TIMESTAMP_FORMAT)
        .map_err(|err| CoreError::Format(err.to_string()))
}

/// Parse a `YYYYMMDD_HHMMSS` stamp back into a UTC time.
///
/// # Errors
/// Returns [`CoreError::Format`] when the value is not a valid stamp.
pub fn parse_session_timestamp(value: &str) -> Result<OffsetDateTime, CoreError> {
    PrimitiveDateTime::parse(value, SESSION_TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|err| CoreError::Format(format!("invalid session timestamp `{value}`: {err}")))
}

/// One scored trainee attempt. Written once, replayed many times.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SessionRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub timestamp_utc: String,
    pub statement: String,
    pub statement_breakdown: ScoredStatement,
    pub decisions: DecisionSelections,
    pub decisions_breakdown: ScoredDecisions,
    pub overall: u32,
}

impl SessionRecord {
    /// Run both evaluators and assemble the record for one attempt.
    ///
    /// # Errors
    /// Returns [`CoreError::Format`] when `created_at` cannot be stamped.
    pub fn score(
        statement: String,
        decisions: DecisionSelections,
        created_at: OffsetDateTime,
    ) -> Result<Self, CoreError> {
        let timestamp_utc = format_session_timestamp(created_at)?;
        let statement_breakdown = score_statement(&statement);
        let decisions_breakdown = score_decisions(&decisions);
        let overall = overall_score(statement_breakdown.score, decisions_breakdown.score);

        Ok(Self {
            schema_version: SESSION_SCHEMA_VERSION,
            timestamp_utc,
            statement,
            statement_breakdown,
            decisions,
            decisions_breakdown,
            overall,
        })
    }

    /// Creation time recovered from `timestamp_utc`.
    ///
    /// # Errors
    /// Returns [`CoreError::Format`] when the stored stamp is malformed.
    pub fn created_at(&self) -> Result<OffsetDateTime, CoreError> {
        parse_session_timestamp(&self.timestamp_utc)
    }

    /// Check structural invariants of a loaded record.
    ///
    /// `overall` is only bounds-checked: older documents truncated instead of rounding.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] or [`CoreError::Format`] on the first violation.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.schema_version == 0 || self.schema_version > SESSION_SCHEMA_VERSION {
            return Err(CoreError::Validation(format!(
                "unsupported schema_version {}; supported range is 1..={SESSION_SCHEMA_VERSION}",
                self.schema_version
            )));
        }

        self.created_at()?;

        for (field, value) in [
            ("statement_breakdown.score", self.statement_breakdown.score),
            ("overall", self.overall),
        ] {
            if value > MAX_SCORE {
                return Err(CoreError::Validation(format!(
                    "{field} MUST be <= {MAX_SCORE} (got {value})"
                )));
            }
        }

        let max_decisions = DECISION_RULES.iter().map(|rule| rule.points).sum::<u32>();
        if self.decisions_breakdown.score > max_decisions {
            return Err(CoreError::Validation(format!(
                "decisions_breakdown.score MUST be <= {max_decisions} (got {})",
                self.decisions_breakdown.score
            )));
        }

        if self.decisions_breakdown.notes.len() != DECISION_RULES.len() {
            return Err(CoreError::Validation(format!(
                "decisions_breakdown MUST carry exactly {} notes",
                DECISION_RULES.len()
            )));
        }

        Ok(())
    }
}
