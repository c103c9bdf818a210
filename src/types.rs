use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

/// Lifecycle of a server-side analysis task.
///
/// Transitions only move forward: `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        match self {
            Self::Pending | Self::InProgress => false,
            Self::Completed | Self::Failed => true,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct TaskFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hashtags: BTreeSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platforms: BTreeSet<String>,
}

impl TaskFilters {
    pub fn start(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_filter_date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_filter_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "optional_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: TaskFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Post {
    pub id: i64,
    pub source: String,
    pub post_id: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub content_type: String,
}

impl Post {
    pub fn engagement(&self) -> u64 {
        self.likes + self.comments + self.shares
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Analytics {
    pub total_posts: u64,
    pub total_engagement: u64,
    /// Occurrence count per hashtag. Iteration order carries no meaning.
    #[serde(default)]
    pub hashtag_counts: std::collections::HashMap<String, u64>,
}

/// The task, its posts and its analytics as retrieved together by one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub task: Task,
    pub posts: Vec<Post>,
    pub analytics: Analytics,
    pub fetched_at: DateTime<Utc>,
}

pub type SharedSnapshot = Arc<Snapshot>;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum NewTaskError {
    #[error("task name cannot be empty")]
    EmptyName,
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct NewTask {
    name: String,
    filters: TaskFilters,
}

impl NewTask {
    pub fn new(
        name: impl Into<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        hashtags: impl IntoIterator<Item = String>,
        platforms: impl IntoIterator<Item = String>,
    ) -> Result<Self, NewTaskError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(NewTaskError::EmptyName);
        }
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(NewTaskError::InvertedDateRange { start, end });
        }

        let filters = TaskFilters {
            start_date: start.map(|date| date.format(FILTER_DATE_FORMAT).to_string()),
            end_date: end.map(|date| date.format(FILTER_DATE_FORMAT).to_string()),
            hashtags: normalize_set(hashtags),
            platforms: normalize_set(platforms),
        };

        Ok(Self { name, filters })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &TaskFilters {
        &self.filters
    }
}

const FILTER_DATE_FORMAT: &str = "%Y-%m-%d";

fn normalize_set(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().trim_start_matches('#').to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_filter_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date_part, FILTER_DATE_FORMAT).ok()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

mod optional_timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
            None => Ok(None),
        }
    }
}
