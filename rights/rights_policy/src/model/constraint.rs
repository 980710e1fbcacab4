//! Policy constraint model.
//!
//! Constraint documents arrive as loosely-typed JSON objects. They are parsed
//! into one [`Constraint`] per key: recognized keys with well-formed values
//! become typed variants, everything else is kept as [`Constraint::Opaque`]
//! and never evaluated. The original document is retained so a policy reads
//! back exactly as it was written.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rights_core::id::ActorId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Key holding the actor allow-list.
pub const ACTOR_IDS: &str = "actor_ids";
/// Key holding the start of the validity window.
pub const VALID_FROM: &str = "valid_from";
/// Key holding the end of the validity window.
pub const VALID_TO: &str = "valid_to";
/// Key holding the usage cap.
pub const MAX_USES: &str = "max_uses";

/// A single parsed constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Only these actors satisfy the policy. An empty list restricts nothing.
    ActorAllowList(Vec<ActorId>),

    /// The policy applies from this instant on (inclusive).
    ValidFrom(DateTime<Utc>),

    /// The policy applies up to this instant (inclusive).
    ValidTo(DateTime<Utc>),

    /// Cap on prior permitted decisions for the same policy and actor.
    /// Zero means uncapped.
    MaxUses(u64),

    /// An unknown key, or a recognized key whose value could not be parsed.
    Opaque {
        /// The document key.
        key: String,

        /// The value, verbatim.
        value: Value,
    },
}

impl Constraint {
    /// Parse one document entry.
    pub fn parse(key: &str, value: &Value) -> Self {
        let parsed = match key {
            ACTOR_IDS => parse_actor_ids(value).map(Self::ActorAllowList),
            VALID_FROM => parse_instant(value, DayBound::Start).map(Self::ValidFrom),
            VALID_TO => parse_instant(value, DayBound::End).map(Self::ValidTo),
            MAX_USES => parse_count(value).map(Self::MaxUses),
            _ => None,
        };

        parsed.unwrap_or_else(|| {
            if is_recognized(key) && !value.is_null() {
                warn!(
                    constraint = key,
                    value = %value,
                    "Malformed constraint value ignored"
                );
            }
            Self::Opaque {
                key: key.to_string(),
                value: value.clone(),
            }
        })
    }

    /// Get the document key of this constraint.
    pub fn key(&self) -> &str {
        match self {
            Self::ActorAllowList(_) => ACTOR_IDS,
            Self::ValidFrom(_) => VALID_FROM,
            Self::ValidTo(_) => VALID_TO,
            Self::MaxUses(_) => MAX_USES,
            Self::Opaque { key, .. } => key,
        }
    }

    /// Whether the evaluator acts on this constraint.
    pub fn is_evaluated(&self) -> bool {
        !matches!(self, Self::Opaque { .. })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorAllowList(actors) => {
                write!(f, "Actors [")?;
                for (i, actor) in actors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", actor)?;
                }
                write!(f, "]")
            }
            Self::ValidFrom(at) => write!(f, "Valid from {}", at.to_rfc3339()),
            Self::ValidTo(at) => write!(f, "Valid to {}", at.to_rfc3339()),
            Self::MaxUses(max) => write!(f, "At most {} uses", max),
            Self::Opaque { key, value } => write!(f, "Unevaluated '{}' = {}", key, value),
        }
    }
}

/// The parsed constraints of one policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<Value>", into = "Option<Value>")]
pub struct ConstraintSet {
    /// The document as written.
    document: Option<Value>,

    /// One entry per document key.
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// Parse a constraint document.
    ///
    /// `None` and `null` mean no constraints. A document that is not a JSON
    /// object is kept for round-tripping but contributes no constraints.
    pub fn from_document(document: Option<Value>) -> Self {
        let document = document.filter(|value| !value.is_null());
        let constraints = match &document {
            None => Vec::new(),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(key, value)| Constraint::parse(key, value))
                .collect(),
            Some(other) => {
                warn!(document = %other, "Constraint document is not an object; ignoring it");
                Vec::new()
            }
        };

        Self {
            document,
            constraints,
        }
    }

    /// Parse stored JSON text.
    ///
    /// Text that is not valid JSON is kept as a string document and yields no
    /// constraints, the same as any other malformed document.
    pub fn from_json_text(text: Option<&str>) -> Self {
        match text.map(str::trim).filter(|text| !text.is_empty()) {
            None => Self::default(),
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => Self::from_document(Some(value)),
                Err(err) => {
                    warn!(error = %err, "Stored constraint text is not valid JSON; ignoring it");
                    Self::from_document(Some(Value::String(text.to_string())))
                }
            },
        }
    }

    /// The document as written, if any.
    pub fn document(&self) -> Option<&Value> {
        self.document.as_ref()
    }

    /// Serialize the document for storage.
    pub fn to_json_text(&self) -> Option<String> {
        self.document.as_ref().map(Value::to_string)
    }

    /// Whether any constraint will be evaluated.
    pub fn is_empty(&self) -> bool {
        !self.constraints.iter().any(Constraint::is_evaluated)
    }

    /// Iterate all parsed entries, opaque ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// The actor allow-list, if one is present.
    pub fn actor_allow_list(&self) -> Option<&[ActorId]> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::ActorAllowList(actors) => Some(actors.as_slice()),
            _ => None,
        })
    }

    /// The start of the validity window, if present.
    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::ValidFrom(at) => Some(*at),
            _ => None,
        })
    }

    /// The end of the validity window, if present.
    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::ValidTo(at) => Some(*at),
            _ => None,
        })
    }

    /// The effective usage cap. A cap of zero is reported as `None`.
    pub fn max_uses(&self) -> Option<u64> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::MaxUses(max) if *max > 0 => Some(*max),
            _ => None,
        })
    }
}

impl From<Option<Value>> for ConstraintSet {
    fn from(document: Option<Value>) -> Self {
        Self::from_document(document)
    }
}

impl From<ConstraintSet> for Option<Value> {
    fn from(set: ConstraintSet) -> Self {
        set.document
    }
}

fn is_recognized(key: &str) -> bool {
    matches!(key, ACTOR_IDS | VALID_FROM | VALID_TO | MAX_USES)
}

fn parse_actor_ids(value: &Value) -> Option<Vec<ActorId>> {
    value
        .as_array()?
        .iter()
        .map(|entry| parse_integer(entry).map(ActorId::new))
        .collect()
}

fn parse_count(value: &Value) -> Option<u64> {
    parse_integer(value).and_then(|count| u64::try_from(count).ok())
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Which end of a bare date an instant refers to.
#[derive(Debug, Clone, Copy)]
enum DayBound {
    Start,
    End,
}

fn parse_instant(value: &Value, bound: DayBound) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let time = match bound {
        DayBound::Start => NaiveTime::MIN,
        DayBound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?,
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_document_is_empty() {
        assert!(ConstraintSet::from_document(None).is_empty());
        assert!(ConstraintSet::from_document(Some(Value::Null)).is_empty());
        assert!(ConstraintSet::from_document(Some(json!({}))).is_empty());
        assert!(ConstraintSet::from_json_text(Some("  ")).is_empty());
    }

    #[test]
    fn test_recognized_keys() {
        let set = ConstraintSet::from_document(Some(json!({
            "actor_ids": [3, "4"],
            "valid_from": "2024-01-01T00:00:00Z",
            "valid_to": "2024-12-31",
            "max_uses": 2
        })));

        assert_eq!(
            set.actor_allow_list(),
            Some([ActorId::new(3), ActorId::new(4)].as_slice())
        );
        assert_eq!(
            set.valid_from(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        let end = set.valid_to().unwrap();
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(end > Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
        assert_eq!(set.max_uses(), Some(2));
        assert!(!set.is_empty());
    }

    #[test]
    fn test_bare_date_starts_at_midnight() {
        let set = ConstraintSet::from_document(Some(json!({"valid_from": "2024-03-05"})));
        assert_eq!(
            set.valid_from(),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );

        let set = ConstraintSet::from_document(Some(json!({"valid_from": "2024-03-05 10:30:00"})));
        assert_eq!(
            set.valid_from(),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_unknown_and_malformed_keys_are_opaque() {
        let set = ConstraintSet::from_document(Some(json!({
            "purpose": "research",
            "max_uses": "lots",
            "actor_ids": [3, "someone"]
        })));

        assert!(set.is_empty());
        assert_eq!(set.max_uses(), None);
        assert_eq!(set.actor_allow_list(), None);
        let keys: Vec<&str> = set.iter().map(Constraint::key).collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"purpose"));
    }

    #[test]
    fn test_zero_max_uses_is_uncapped() {
        let set = ConstraintSet::from_document(Some(json!({"max_uses": 0})));
        assert_eq!(set.max_uses(), None);

        let set = ConstraintSet::from_document(Some(json!({"max_uses": -1})));
        assert_eq!(set.max_uses(), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_non_object_document() {
        let set = ConstraintSet::from_document(Some(json!(["actor_ids", 3])));
        assert!(set.is_empty());
        assert_eq!(set.document(), Some(&json!(["actor_ids", 3])));

        let set = ConstraintSet::from_json_text(Some("{actor_ids: [3]"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_document_round_trip_preserves_unknown_keys() {
        let document = json!({"max_uses": 1, "purpose": "teaching"});
        let set = ConstraintSet::from_document(Some(document.clone()));
        let text = set.to_json_text().unwrap();
        let reparsed = ConstraintSet::from_json_text(Some(&text));

        assert_eq!(reparsed.document(), Some(&document));
        assert_eq!(reparsed, set);
    }

    #[test]
    fn test_display() {
        let constraint = Constraint::ActorAllowList(vec![ActorId::new(1), ActorId::new(2)]);
        assert_eq!(constraint.to_string(), "Actors [1, 2]");
        assert_eq!(Constraint::MaxUses(3).to_string(), "At most 3 uses");
    }
}
