//! Scenario timeline: the static feed a trainee watches while drafting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::CoreError;

/// Length of a drill in simulated minutes.
pub const SCENARIO_MAX_MINUTE: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub title: String,
    /// Free-form: some scenario files carry a label, others a number.
    #[serde(default)]
    pub baseline_sentiment: Value,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioEvent {
    pub minute: u32,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Headline {
        source: String,
        title: String,
        #[serde(default)]
        tone: Option<String>,
    },
    Tweet {
        handle: String,
        followers: u64,
        text: String,
    },
    Email {
        from: String,
        subject: String,
        body: String,
    },
    MediaRequest {
        from: String,
        request: String,
    },
    Trend {
        hashtag: String,
        mentions_30m: u64,
    },
    Post {
        platform: String,
        actor: String,
        text: String,
    },
    Linkedin {
        actor: String,
        text: String,
    },
    Tv {
        source: String,
        segment: String,
        format: String,
    },
    Opportunity {
        title: String,
        question: String,
    },
    Internal {
        text: String,
    },
    Wrap {
        summary: String,
    },
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Headline { .. } => "headline",
            Self::Tweet { .. } => "tweet",
            Self::Email { .. } => "email",
            Self::MediaRequest { .. } => "media_request",
            Self::Trend { .. } => "trend",
            Self::Post { .. } => "post",
            Self::Linkedin { .. } => "linkedin",
            Self::Tv { .. } => "tv",
            Self::Opportunity { .. } => "opportunity",
            Self::Internal { .. } => "internal",
            Self::Wrap { .. } => "wrap",
        }
    }
}

impl ScenarioEvent {
    /// One feed line, prefixed with the simulated time.
    #[must_use]
    pub fn render(&self) -> String {
        let at = format!("T+{}m", self.minute);
        match &self.kind {
            EventKind::Headline { source, title, tone } => format!(
                "{at} - Headline ({source}): {title} (tone: {})",
                tone.as_deref().unwrap_or("n/a")
            ),
            EventKind::Tweet { handle, followers, text } => {
                format!("{at} - Tweet {handle} ({} followers): {text}", group_thousands(*followers))
            }
            EventKind::Email { from, subject, body } => {
                format!("{at} - Email from {from}: {subject} - {body}")
            }
            EventKind::MediaRequest { from, request } => {
                format!("{at} - Media request ({from}): {request}")
            }
            EventKind::Trend { hashtag, mentions_30m } => format!(
                "{at} - Hashtag Trend: {hashtag} - {} mentions",
                group_thousands(*mentions_30m)
            ),
            EventKind::Post { platform, actor, text } => format!("{at} - {platform} ({actor}): {text}"),
            EventKind::Linkedin { actor, text } => format!("{at} - LinkedIn ({actor}): {text}"),
            EventKind::Tv { source, segment, format: programme_format } => {
                format!("{at} - TV ({source}): {segment} - {programme_format}")
            }
            EventKind::Opportunity { title, question } => {
                format!("{at} - Opportunity: {title} - {question}")
            }
            EventKind::Internal { text } => format!("{at} - Internal note: {text}"),
            EventKind::Wrap { summary } => format!("{at} - Wrap summary: {summary}"),
        }
    }
}

impl Scenario {
    /// Parse and validate a scenario document.
    ///
    /// # Errors
    /// Returns [`CoreError::Scenario`] when the JSON is malformed or fails validation.
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let scenario: Self = serde_json::from_str(raw)
            .map_err(|err| CoreError::Scenario(format!("invalid scenario document: {err}")))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// # Errors
    /// Returns [`CoreError::Scenario`] for an empty title or out-of-order events.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Scenario("title MUST be non-empty".to_string()));
        }

        for pair in self.events.windows(2) {
            if pair[1].minute < pair[0].minute {
                return Err(CoreError::Scenario(format!(
                    "events MUST be ordered by minute (T+{}m follows T+{}m)",
                    pair[1].minute, pair[0].minute
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn baseline_label(&self) -> String {
        match &self.baseline_sentiment {
            Value::String(label) => label.clone(),
            Value::Null => "n/a".to_string(),
            other => other.to_string(),
        }
    }

    /// Events visible at `minute`, in document order. Minutes past the drill are clamped.
    pub fn feed_at(&self, minute: u32) -> impl Iterator<Item = &ScenarioEvent> + '_ {
        let minute = minute.min(SCENARIO_MAX_MINUTE);
        self.events.iter().filter(move |event| event.minute <= minute)
    }
}

/// Drill minute reached after starting at `started_at`: whole minutes elapsed plus one, capped.
#[must_use]
pub fn elapsed_minute(started_at: OffsetDateTime, now: OffsetDateTime) -> u32 {
    let seconds = (now - started_at).whole_seconds().max(0);
    u32::try_from(seconds / 60)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
        .min(SCENARIO_MAX_MINUTE)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
