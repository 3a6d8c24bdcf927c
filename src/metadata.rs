//! Metadata storage and filter predicates.
//!
//! Unlike a flat `HashMap<String, u32>` categorical-id model, filters here
//! match against a small fixed set of typed fields so callers never have to
//! pre-encode strings into integers. Unknown fields are rejected at
//! construction rather than silently ignored, so a typo in a filter key
//! fails loudly instead of returning an unfiltered result set.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::{AttributeValue, Document};
use crate::error::EngineError;

/// The recognized filter fields. Any other key is a validation error.
const RECOGNIZED_FIELDS: &[&str] = &[
    "min_experience",
    "seniority_levels",
    "required_skills",
    "date_range",
];

/// A single filter bag evaluated against a document's metadata.
///
/// All present fields are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBag {
    pub min_experience: Option<i64>,
    pub seniority_levels: Option<Vec<String>>,
    pub required_skills: Option<Vec<String>>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive, days since the Unix epoch.
    pub start: i64,
    /// Inclusive, days since the Unix epoch.
    pub end: i64,
}

impl FilterBag {
    /// Parse a filter bag from a JSON object, rejecting unrecognized fields.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EngineError> {
        let object = value
            .as_object()
            .ok_or_else(|| EngineError::validation("filter must be a JSON object"))?;

        for key in object.keys() {
            if !RECOGNIZED_FIELDS.contains(&key.as_str()) {
                return Err(EngineError::validation(format!(
                    "unrecognized filter field: {key}"
                )));
            }
        }

        let min_experience = object
            .get("min_experience")
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| EngineError::validation("min_experience must be an integer"))
            })
            .transpose()?;

        let seniority_levels = object
            .get("seniority_levels")
            .map(parse_string_set)
            .transpose()?;

        let required_skills = object
            .get("required_skills")
            .map(parse_string_set)
            .transpose()?;

        let date_range = object
            .get("date_range")
            .map(|v| {
                let start = v
                    .get("start")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| EngineError::validation("date_range.start must be an ISO-8601 date string"))?;
                let end = v
                    .get("end")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| EngineError::validation("date_range.end must be an ISO-8601 date string"))?;
                Ok::<_, EngineError>(DateRange {
                    start: parse_iso_date(start)?,
                    end: parse_iso_date(end)?,
                })
            })
            .transpose()?;

        Ok(FilterBag {
            min_experience,
            seniority_levels,
            required_skills,
            date_range,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min_experience.is_none()
            && self.seniority_levels.is_none()
            && self.required_skills.is_none()
            && self.date_range.is_none()
    }

    /// Canonical sorted-JSON fingerprint used as a cache key. Two filter bags
    /// with the same semantic content always produce the same fingerprint,
    /// regardless of field or set-element input order.
    pub fn fingerprint(&self) -> String {
        let mut map = BTreeMap::new();
        if let Some(v) = self.min_experience {
            map.insert("min_experience".to_string(), serde_json::json!(v));
        }
        if let Some(levels) = &self.seniority_levels {
            let mut sorted: Vec<String> = levels.iter().map(|s| s.to_lowercase()).collect();
            sorted.sort();
            map.insert("seniority_levels".to_string(), serde_json::json!(sorted));
        }
        if let Some(skills) = &self.required_skills {
            let mut sorted: Vec<String> = skills.iter().map(|s| s.to_lowercase()).collect();
            sorted.sort();
            map.insert("required_skills".to_string(), serde_json::json!(sorted));
        }
        if let Some(range) = &self.date_range {
            map.insert(
                "date_range".to_string(),
                serde_json::json!({"start": range.start, "end": range.end}),
            );
        }
        serde_json::to_string(&map).expect("BTreeMap<String, Value> always serializes")
    }

    pub fn matches(&self, attributes: &BTreeMap<String, AttributeValue>) -> bool {
        if let Some(min_exp) = self.min_experience {
            let actual = attributes.get("min_experience").and_then(as_int);
            if actual.is_none_or(|v| v < min_exp) {
                return false;
            }
        }
        if let Some(levels) = &self.seniority_levels {
            let actual = attributes.get("seniority_levels").and_then(as_string_set);
            match actual {
                Some(set) => {
                    let wanted: HashSet<String> =
                        levels.iter().map(|s| s.to_lowercase()).collect();
                    if wanted.intersection(&set).next().is_none() {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(skills) = &self.required_skills {
            let actual = attributes.get("required_skills").and_then(as_string_set);
            match actual {
                Some(set) => {
                    if !skills
                        .iter()
                        .all(|s| set.contains(&s.to_lowercase()))
                    {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(range) = &self.date_range {
            let actual = attributes.get("date_range").and_then(as_int);
            match actual {
                Some(date) => {
                    if date < range.start || date > range.end {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

fn as_int(value: &AttributeValue) -> Option<i64> {
    match value {
        AttributeValue::Int(v) => Some(*v),
        AttributeValue::Date(v) => Some(*v),
        _ => None,
    }
}

fn as_string_set(value: &AttributeValue) -> Option<HashSet<String>> {
    match value {
        AttributeValue::StringSet(items) => {
            Some(items.iter().map(|s| s.to_lowercase()).collect())
        }
        AttributeValue::Text(text) => Some(std::iter::once(text.to_lowercase()).collect()),
        _ => None,
    }
}

fn parse_string_set(value: &serde_json::Value) -> Result<Vec<String>, EngineError> {
    value
        .as_array()
        .ok_or_else(|| EngineError::validation("expected a JSON array of strings"))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| EngineError::validation("expected string elements"))
        })
        .collect()
}

/// Parse `YYYY-MM-DD` into days since the Unix epoch using proleptic Gregorian
/// civil-to-days arithmetic (Howard Hinnant's algorithm), avoiding a chrono
/// dependency for a single narrow conversion.
fn parse_iso_date(s: &str) -> Result<i64, EngineError> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(EngineError::validation(format!(
            "invalid ISO-8601 date: {s}"
        )));
    }
    let year: i64 = parts[0]
        .parse()
        .map_err(|_| EngineError::validation(format!("invalid ISO-8601 date: {s}")))?;
    let month: i64 = parts[1]
        .parse()
        .map_err(|_| EngineError::validation(format!("invalid ISO-8601 date: {s}")))?;
    let day: i64 = parts[2]
        .parse()
        .map_err(|_| EngineError::validation(format!("invalid ISO-8601 date: {s}")))?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(EngineError::validation(format!(
            "invalid ISO-8601 date: {s}"
        )));
    }
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Ok(era * 146097 + doe - 719468)
}

/// Per-document attribute bags keyed by doc-id, used by filter evaluation and
/// result hydration.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetadataStore {
    attributes: HashMap<String, BTreeMap<String, AttributeValue>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, doc: &Document) {
        self.attributes
            .insert(doc.id.clone(), doc.attributes.clone());
    }

    pub fn remove(&mut self, doc_id: &str) {
        self.attributes.remove(doc_id);
    }

    pub fn get(&self, doc_id: &str) -> Option<&BTreeMap<String, AttributeValue>> {
        self.attributes.get(doc_id)
    }

    pub fn matches(&self, doc_id: &str, filter: &FilterBag) -> bool {
        if filter.is_empty() {
            return true;
        }
        match self.attributes.get(doc_id) {
            Some(attrs) => filter.matches(attrs),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
