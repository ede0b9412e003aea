//! Parsing of the AI-authored curriculum document into typed weeks.
//!
//! The document is untrusted: it is produced once by the authoring service
//! and persisted as a JSON blob, then re-read on every recalculation. Anything
//! unusable degrades to [`fallback_weeks`] instead of failing.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::{
    error::{Error, Result},
    utils::percent,
};

const MODULE_COUNT_KEYS: [&str; 3] = ["moduleCount", "module_count", "modules"];

/// Largest module count a single week may claim; larger entries are dropped.
pub const MAX_WEEK_MODULES: i64 = 10_000;

/// One week of the curriculum, in curriculum order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekRecord {
    /// 1-based position in the curriculum
    pub index: i64,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    pub module_count: i64,
    #[serde(default)]
    pub completed_modules: i64,
    #[serde(default)]
    pub progress_percent: i64,
    /// Authored fields this crate does not interpret, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WeekRecord {
    pub fn new(index: i64, title: &str, module_count: i64) -> Self {
        Self {
            index,
            title: title.to_string(),
            subtitle: String::new(),
            description: String::new(),
            module_count,
            completed_modules: 0,
            progress_percent: 0,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekSource {
    Authored,
    /// Canonical curriculum substituted, with the reason the document was rejected
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct ParsedWeeks {
    pub weeks: Vec<WeekRecord>,
    pub source: WeekSource,
}

impl ParsedWeeks {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, WeekSource::Fallback(_))
    }
}

/// Shape the authoring service is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumDocument {
    /// Title of the learning path
    pub title: String,
    /// Sum of all weeks' module counts
    pub total_modules: i64,
    /// Weeks in the order they should be studied
    pub weeks: Vec<AuthoredWeek>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredWeek {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    /// Number of modules (quizzes or coding challenges) planned for this week, at least 1
    pub module_count: i64,
}

/// JSON schema of [`CurriculumDocument`], usable as a structured-output tool definition
pub fn document_schema() -> Value {
    json!(schema_for!(CurriculumDocument))
}

/// The fixed 6-week curriculum used whenever the authored one is unusable.
pub fn fallback_weeks() -> Vec<WeekRecord> {
    [
        ("Foundations", "Core vocabulary and setup", 4),
        ("Core Concepts", "The ideas everything else builds on", 4),
        ("Applied Practice", "Small exercises with feedback", 3),
        ("Intermediate Patterns", "Combining concepts", 4),
        ("Project Work", "A guided end-to-end project", 5),
        ("Review and Next Steps", "Consolidation and assessment", 4),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (title, subtitle, modules))| {
        let mut week = WeekRecord::new(i as i64 + 1, title, modules);
        week.subtitle = subtitle.to_string();
        week
    })
    .collect()
}

/// Saturates instead of overflowing on hand-built weeks.
pub fn module_total(weeks: &[WeekRecord]) -> i64 {
    weeks
        .iter()
        .fold(0i64, |total, w| total.saturating_add(w.module_count.max(0)))
}

/// Title of the authored document, empty when absent
pub fn document_title(raw: &Value) -> String {
    raw.get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `totalModules` as the authoring service claimed it
pub fn authored_total(raw: &Value) -> Option<i64> {
    raw.get("totalModules")
        .or_else(|| raw.get("total_modules"))
        .and_then(as_count)
}

/// Parse the stored TEXT column, falling back on invalid JSON.
pub fn parse_weeks_str(text: &str) -> ParsedWeeks {
    match serde_json::from_str::<Value>(text) {
        Ok(raw) => parse_weeks(&raw),
        Err(e) => fallback(format!("invalid json: {e}")),
    }
}

/// Never fails; see [`try_parse_weeks`] for the strict form.
pub fn parse_weeks(raw: &Value) -> ParsedWeeks {
    match try_parse_weeks(raw) {
        Ok(weeks) => ParsedWeeks {
            weeks,
            source: WeekSource::Authored,
        },
        Err(e) => fallback(e.to_string()),
    }
}

fn fallback(reason: String) -> ParsedWeeks {
    warn!("curriculum document rejected, using fallback curriculum: {}", reason);
    ParsedWeeks {
        weeks: fallback_weeks(),
        source: WeekSource::Fallback(reason),
    }
}

pub fn try_parse_weeks(raw: &Value) -> Result<Vec<WeekRecord>> {
    let weeks = match raw {
        Value::Array(_) => raw,
        Value::Object(obj) => obj
            .get("weeks")
            .ok_or_else(|| malformed("missing `weeks`"))?,
        _ => return Err(malformed("document is neither an object nor an array")),
    };
    // double-encoded blob
    let decoded;
    let weeks = match weeks {
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s)
                .map_err(|e| malformed(format!("`weeks` string is not json: {e}")))?;
            &decoded
        }
        other => other,
    };
    let Value::Array(items) = weeks else {
        return Err(malformed("`weeks` is not an array"));
    };
    if items.is_empty() {
        return Err(malformed("`weeks` is empty"));
    }

    let mut result = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        match parse_week(item, result.len() as i64 + 1) {
            Some(week) => result.push(week),
            None => warn!("dropping unusable week entry at position {}", position),
        }
    }
    if result.is_empty() {
        return Err(malformed("no week has a usable module count"));
    }
    Ok(result)
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedCurriculumDocument(reason.into())
}

fn parse_week(item: &Value, index: i64) -> Option<WeekRecord> {
    let obj = item.as_object()?;
    let module_count = MODULE_COUNT_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|v| match v {
            Value::Array(modules) => Some(modules.len() as i64),
            other => as_count(other),
        })
        .filter(|count| (1..=MAX_WEEK_MODULES).contains(count))?;

    let mut extra = obj.clone();
    for key in [
        "index",
        "title",
        "subtitle",
        "description",
        "moduleCount",
        "module_count",
        "completedModules",
        "progressPercent",
    ] {
        extra.remove(key);
    }
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let mut title = text("title");
    if title.is_empty() {
        title = format!("Week {index}");
    }
    let completed_modules = obj
        .get("completedModules")
        .and_then(as_count)
        .unwrap_or(0)
        .clamp(0, module_count);

    Some(WeekRecord {
        index,
        title,
        subtitle: text("subtitle"),
        description: text("description"),
        module_count,
        completed_modules,
        progress_percent: percent(completed_modules, module_count),
        extra,
    })
}

/// Integer, integral float, or numeric string
fn as_count(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
