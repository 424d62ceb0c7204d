use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One check-in inside the current week.
///
/// Stored as a `[count, unix_seconds]` pair so the `hits` column stays a
/// compact JSON array of pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(u32, i64)", try_from = "(u32, i64)")]
pub struct Hit {
    pub count: u32,
    pub at: DateTime<Utc>,
}

impl From<Hit> for (u32, i64) {
    fn from(value: Hit) -> Self {
        (value.count, value.at.timestamp())
    }
}

impl TryFrom<(u32, i64)> for Hit {
    type Error = String;

    fn try_from((count, seconds): (u32, i64)) -> Result<Self, Self::Error> {
        let at = DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| format!("hit timestamp {} out of range", seconds))?;
        Ok(Self { count, at })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRecord {
    pub id: String,
    pub started: Option<DateTime<Utc>>,
    pub days: u8,
    pub hits: Vec<Hit>,
    pub streak: u32,
    pub long_streak: u32,
    pub active: bool,
}

impl ChallengeRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            started: None,
            days: 0,
            hits: Vec::new(),
            streak: 0,
            long_streak: 0,
            active: false,
        }
    }

    pub fn hits_this_week(&self) -> usize {
        self.hits.len()
    }

    pub fn target_met(&self) -> bool {
        self.days > 0 && self.hits.len() >= usize::from(self.days)
    }
}

/// What to do with a second check-in inside the same week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateHitPolicy {
    /// Leave the record untouched and tell the user they already checked in.
    #[default]
    Reject,
    /// Append another hit; the streak only moves on the first hit of the week.
    Accumulate,
}

impl DuplicateHitPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Accumulate => "accumulate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInOutcome {
    Recorded {
        streak: u32,
        long_streak: u32,
        new_best: bool,
    },
    Accumulated {
        hits_this_week: usize,
    },
    AlreadyCheckedIn,
    NotActive,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub user_id: String,
    pub hits: usize,
    pub target: u8,
    pub met: bool,
    pub streak: u32,
    pub weeks_elapsed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Challenge,
    Help,
    ShowPrivacy,
    Stop,
    SetWeekly,
    Post,
    MyStat,
    DeleteData,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Self::Challenge,
        Self::Help,
        Self::SetWeekly,
        Self::Post,
        Self::MyStat,
        Self::Stop,
        Self::DeleteData,
        Self::ShowPrivacy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::Help => "help",
            Self::ShowPrivacy => "show_privacy",
            Self::Stop => "stop",
            Self::SetWeekly => "set_weekly",
            Self::Post => "post",
            Self::MyStat => "my_stat",
            Self::DeleteData => "delete_data",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == raw)
    }
}
