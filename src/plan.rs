//! Study plan data model
//!
//! A plan arrives from the planner as loosely-shaped JSON (`PlanCandidate`),
//! is validated record by record into a `SchedulePlan`, and is stored as a
//! `PlanDocument`, the format shared by the persist and sync tools.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Timezone applied to records that do not name one
pub const DEFAULT_TIME_ZONE: &str = "Asia/Ho_Chi_Minh";

/// Wire format for wall-clock timestamps (no offset)
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Accepted input formats, tried in order before falling back to RFC 3339
const INPUT_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Why a single event record was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("summary must not be empty")]
    EmptySummary,
    #[error("{field} is not a valid timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("end ({end}) must be after start ({start})")]
    EndNotAfterStart { start: String, end: String },
}

/// Start or end of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Wall-clock time in the record's timezone
    Local(NaiveDateTime),
    /// A fixed instant that carries its own UTC offset
    Offset(DateTime<FixedOffset>),
}

impl Timestamp {
    /// Wall-clock reading, ignoring any offset
    fn naive(self) -> NaiveDateTime {
        match self {
            Timestamp::Local(ts) => ts,
            Timestamp::Offset(dt) => dt.naive_local(),
        }
    }

    fn is_after(self, other: Timestamp) -> bool {
        match (self, other) {
            (Timestamp::Offset(a), Timestamp::Offset(b)) => a > b,
            _ => self.naive() > other.naive(),
        }
    }

    /// Offset timestamps are written with their offset
    fn format(self) -> String {
        match self {
            Timestamp::Local(ts) => ts.format(DATE_TIME_FORMAT).to_string(),
            Timestamp::Offset(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(ts: NaiveDateTime) -> Self {
        Timestamp::Local(ts)
    }
}

/// One scheduled study session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub summary: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub time_zone: String,
    pub description: Option<String>,
}

impl EventRecord {
    pub fn new(
        summary: impl Into<String>,
        start: impl Into<Timestamp>,
        end: impl Into<Timestamp>,
        time_zone: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let summary = summary.into();
        let (start, end) = (start.into(), end.into());
        if summary.trim().is_empty() {
            return Err(ValidationError::EmptySummary);
        }
        if !end.is_after(start) {
            return Err(ValidationError::EndNotAfterStart {
                start: start.format(),
                end: end.format(),
            });
        }
        Ok(Self {
            summary,
            start,
            end,
            time_zone: time_zone.into(),
            description: None,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate one raw record as produced by the planner.
    ///
    /// `start`/`end` may be plain timestamp strings (the planner's format) or
    /// `{dateTime, timeZone}` objects (the stored document format).
    pub fn from_value(item: &Value, default_time_zone: &str) -> Result<Self, ValidationError> {
        let obj = item.as_object().ok_or(ValidationError::NotAnObject)?;

        let summary = obj
            .get("summary")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingField("summary"))?;

        let (start, start_zone) = read_time(obj.get("start"), "start")?;
        let (end, end_zone) = read_time(obj.get("end"), "end")?;

        let time_zone = obj
            .get("timeZone")
            .and_then(Value::as_str)
            .or(start_zone)
            .or(end_zone)
            .unwrap_or(default_time_zone);

        let record = Self::new(summary, start, end, time_zone)?;
        Ok(match obj.get("description").and_then(Value::as_str) {
            Some(description) if !description.is_empty() => record.with_description(description),
            _ => record,
        })
    }
}

fn read_time<'a>(
    field: Option<&'a Value>,
    name: &'static str,
) -> Result<(Timestamp, Option<&'a str>), ValidationError> {
    let field = field.ok_or(ValidationError::MissingField(name))?;
    let (raw, zone) = match field {
        Value::String(s) => (s.as_str(), None),
        Value::Object(obj) => {
            let raw = obj
                .get("dateTime")
                .and_then(Value::as_str)
                .ok_or(ValidationError::MissingField(name))?;
            (raw, obj.get("timeZone").and_then(Value::as_str))
        }
        _ => return Err(ValidationError::MissingField(name)),
    };
    let parsed = parse_timestamp(raw).ok_or_else(|| ValidationError::InvalidTimestamp {
        field: name,
        value: raw.to_string(),
    })?;
    Ok((parsed, zone))
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(Timestamp::Local)
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(Timestamp::Offset))
}

/// A validated schedule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePlan {
    pub events: Vec<EventRecord>,
}

impl SchedulePlan {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_document(&self) -> PlanDocument {
        PlanDocument {
            events: self.events.iter().map(DocumentEvent::from).collect(),
        }
    }
}

/// A record dropped during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub reason: ValidationError,
}

/// Outcome of validating a candidate: the surviving plan plus what was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPlan {
    pub plan: SchedulePlan,
    pub rejected: Vec<RejectedRecord>,
}

/// Unvalidated plan as proposed by the planner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanCandidate {
    items: Vec<Value>,
}

impl PlanCandidate {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Accept `{"events": [...]}`, the same wrapped in `{"json_data": ...}`,
    /// a JSON string holding either, or a bare array of records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => serde_json::from_str(&s).ok().and_then(Self::from_value),
            Value::Array(items) => Some(Self::new(items)),
            Value::Object(mut obj) => {
                if let Some(inner) = obj.remove("json_data") {
                    return Self::from_value(inner);
                }
                match obj.remove("events") {
                    Some(Value::Array(items)) => Some(Self::new(items)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Validate each record independently; bad records are dropped, not fatal.
    pub fn validate(&self, default_time_zone: &str) -> ValidatedPlan {
        let mut events = Vec::with_capacity(self.items.len());
        let mut rejected = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            match EventRecord::from_value(item, default_time_zone) {
                Ok(record) => events.push(record),
                Err(reason) => {
                    tracing::warn!(index, %reason, "Dropping invalid event record");
                    rejected.push(RejectedRecord { index, reason });
                }
            }
        }
        ValidatedPlan {
            plan: SchedulePlan::new(events),
            rejected,
        }
    }
}

// ============================================================================
// Persisted document format
// ============================================================================

/// Stored plan: a single `events` field. This is the contract between the
/// persist and sync tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub events: Vec<DocumentEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: String,
    pub time_zone: String,
}

impl EventTime {
    fn new(ts: Timestamp, time_zone: &str) -> Self {
        Self {
            date_time: ts.format(),
            time_zone: time_zone.to_string(),
        }
    }
}

impl From<&EventRecord> for DocumentEvent {
    fn from(record: &EventRecord) -> Self {
        Self {
            summary: record.summary.clone(),
            start: EventTime::new(record.start, &record.time_zone),
            end: EventTime::new(record.end, &record.time_zone),
            description: record.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_planner_record_uses_default_zone() {
        let record = EventRecord::from_value(
            &json!({
                "summary": "Learn Math",
                "start": "2025-07-25T08:00:00",
                "end": "2025-07-25T09:30:00",
                "description": "Review integrals"
            }),
            DEFAULT_TIME_ZONE,
        )
        .unwrap();

        assert_eq!(record.summary, "Learn Math");
        assert_eq!(record.time_zone, DEFAULT_TIME_ZONE);
        assert_eq!(record.start, Timestamp::Local(ts("2025-07-25T08:00:00")));
        assert_eq!(record.description.as_deref(), Some("Review integrals"));
    }

    #[test]
    fn test_explicit_zone_wins() {
        let record = EventRecord::from_value(
            &json!({
                "summary": "Physics",
                "start": "2025-07-25T08:00:00",
                "end": "2025-07-25T09:00:00",
                "timeZone": "Europe/Berlin"
            }),
            DEFAULT_TIME_ZONE,
        )
        .unwrap();
        assert_eq!(record.time_zone, "Europe/Berlin");
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_missing_summary_rejected() {
        let err = EventRecord::from_value(
            &json!({"start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"}),
            DEFAULT_TIME_ZONE,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("summary"));
    }

    #[test]
    fn test_blank_summary_rejected() {
        let err = EventRecord::from_value(
            &json!({"summary": "  ", "start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"}),
            DEFAULT_TIME_ZONE,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptySummary);
    }

    #[test]
    fn test_end_must_follow_start() {
        let err = EventRecord::from_value(
            &json!({"summary": "x", "start": "2025-07-25T09:00:00", "end": "2025-07-25T09:00:00"}),
            DEFAULT_TIME_ZONE,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EndNotAfterStart { .. }));
    }

    #[test]
    fn test_unparsable_timestamp() {
        let err = EventRecord::from_value(
            &json!({"summary": "x", "start": "tomorrow morning", "end": "2025-07-25T09:00:00"}),
            DEFAULT_TIME_ZONE,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidTimestamp {
                field: "start",
                value: "tomorrow morning".to_string()
            }
        );
    }

    #[test]
    fn test_offset_input_keeps_its_instant() {
        let candidate = PlanCandidate::new(vec![json!({
            "summary": "Math",
            "start": "2025-07-25T08:00:00+02:00",
            "end": "2025-07-25T09:00:00Z"
        })]);
        let validated = candidate.validate(DEFAULT_TIME_ZONE);
        assert!(validated.rejected.is_empty());

        let doc = validated.plan.to_document();
        let event = &doc.events[0];
        assert_eq!(event.start.date_time, "2025-07-25T08:00:00+02:00");
        assert_eq!(event.start.time_zone, DEFAULT_TIME_ZONE);

        // Same instant as the input, not 09:00 in the default zone
        let end = DateTime::parse_from_rfc3339(&event.end.date_time).unwrap();
        assert_eq!(
            end,
            DateTime::parse_from_rfc3339("2025-07-25T09:00:00+00:00").unwrap()
        );
    }

    #[test]
    fn test_offset_ordering_uses_instants() {
        // 10:00+02:00 is 08:00Z, so this ends before it starts
        let err = EventRecord::from_value(
            &json!({"summary": "x", "start": "2025-07-25T08:30:00Z", "end": "2025-07-25T10:00:00+02:00"}),
            DEFAULT_TIME_ZONE,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::EndNotAfterStart { .. }));
    }

    #[test]
    fn test_candidate_drops_only_bad_records() {
        let candidate = PlanCandidate::from_value(json!({
            "events": [
                {"summary": "Chemistry", "start": "2025-07-26T10:00:00", "end": "2025-07-26T11:00:00"},
                {"start": "2025-07-26T12:00:00", "end": "2025-07-26T13:00:00"},
                {"summary": "Biology", "start": "2025-07-26T12:00:00"}
            ]
        }))
        .unwrap();

        let validated = candidate.validate(DEFAULT_TIME_ZONE);
        assert_eq!(validated.plan.len(), 1);
        assert_eq!(validated.rejected.len(), 2);
        assert_eq!(validated.rejected[0].index, 1);
        assert_eq!(validated.rejected[1].reason, ValidationError::MissingField("end"));
    }

    #[test]
    fn test_candidate_accepts_wrapped_and_string_forms() {
        let events = json!([{"summary": "a", "start": "2025-07-26T10:00:00", "end": "2025-07-26T11:00:00"}]);
        let wrapped = PlanCandidate::from_value(json!({"json_data": {"events": events.clone()}})).unwrap();
        assert_eq!(wrapped.len(), 1);

        let text = json!({"events": events}).to_string();
        let stringly = PlanCandidate::from_value(Value::String(text)).unwrap();
        assert_eq!(stringly.len(), 1);

        assert!(PlanCandidate::from_value(json!({"plan": []})).is_none());
        assert!(PlanCandidate::from_value(json!(42)).is_none());
    }

    #[test]
    fn test_document_wire_format() {
        let plan = SchedulePlan::new(vec![EventRecord::new(
            "Learn Math",
            ts("2025-07-25T08:00:00"),
            ts("2025-07-25T09:30:00"),
            "Asia/Ho_Chi_Minh",
        )
        .unwrap()]);

        let value = serde_json::to_value(plan.to_document()).unwrap();
        assert_eq!(
            value,
            json!({
                "events": [{
                    "summary": "Learn Math",
                    "start": {"dateTime": "2025-07-25T08:00:00", "timeZone": "Asia/Ho_Chi_Minh"},
                    "end": {"dateTime": "2025-07-25T09:30:00", "timeZone": "Asia/Ho_Chi_Minh"}
                }]
            })
        );
    }
}
