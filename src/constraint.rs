//! Typed griddap constraints and their validation.
//!
//! A constraint key is a [`Dimension`] paired with an [`Operator`], written on
//! the wire as `time>=`, `latitude<=`, `longitude_step`, and so on. String keys
//! are parsed when they enter a [`ConstraintSet`], so a malformed key is
//! rejected before validation ever runs.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Grid dimensions understood by the query builder.
///
/// The declaration order is the emission order of griddap clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Time,
    Depth,
    Latitude,
    Longitude,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Time,
        Dimension::Depth,
        Dimension::Latitude,
        Dimension::Longitude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Time => "time",
            Dimension::Depth => "depth",
            Dimension::Latitude => "latitude",
            Dimension::Longitude => "longitude",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time" => Ok(Dimension::Time),
            "depth" => Ok(Dimension::Depth),
            "latitude" => Ok(Dimension::Latitude),
            "longitude" => Ok(Dimension::Longitude),
            other => Err(Error::InvalidConstraintKey {
                key: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// `>=`
    Lower,
    /// `<=`
    Upper,
    /// `_step`
    Step,
}

impl Operator {
    pub fn suffix(&self) -> &'static str {
        match self {
            Operator::Lower => ">=",
            Operator::Upper => "<=",
            Operator::Step => "_step",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintKey {
    pub dimension: Dimension,
    pub operator: Operator,
}

impl ConstraintKey {
    pub fn new(dimension: Dimension, operator: Operator) -> Self {
        Self {
            dimension,
            operator,
        }
    }
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dimension, self.operator.suffix())
    }
}

impl FromStr for ConstraintKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        let invalid = || Error::InvalidConstraintKey {
            key: s.to_string(),
        };

        let (dim, operator) = if let Some(d) = key.strip_suffix(">=") {
            (d, Operator::Lower)
        } else if let Some(d) = key.strip_suffix("<=") {
            (d, Operator::Upper)
        } else if let Some(d) = key.strip_suffix("_step") {
            (d, Operator::Step)
        } else {
            return Err(invalid());
        };

        let dimension = dim.parse::<Dimension>().map_err(|_| invalid())?;
        Ok(Self::new(dimension, operator))
    }
}

/// A bound or stride value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintValue {
    Time(DateTime<Utc>),
    Number(f64),
}

impl ConstraintValue {
    /// Parses a number, an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date
    /// (midnight UTC), in that order.
    pub fn parse(key: &str, raw: &str) -> Result<Self> {
        let s = raw.trim();
        if let Ok(n) = s.parse::<f64>() {
            return Ok(ConstraintValue::Number(n));
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(ConstraintValue::Time(t.with_timezone(&Utc)));
        }
        if let Some(t) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(ConstraintValue::Time(t.and_utc()));
        }
        Err(Error::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    /// Numeric view used for range comparison; timestamps become epoch seconds.
    fn as_f64(&self) -> f64 {
        match self {
            ConstraintValue::Time(t) => {
                t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9
            }
            ConstraintValue::Number(n) => *n,
        }
    }
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintValue::Time(t) => {
                f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            ConstraintValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<f64> for ConstraintValue {
    fn from(v: f64) -> Self {
        ConstraintValue::Number(v)
    }
}

impl From<i64> for ConstraintValue {
    fn from(v: i64) -> Self {
        ConstraintValue::Number(v as f64)
    }
}

impl From<i32> for ConstraintValue {
    fn from(v: i32) -> Self {
        ConstraintValue::Number(f64::from(v))
    }
}

impl From<u32> for ConstraintValue {
    fn from(v: u32) -> Self {
        ConstraintValue::Number(f64::from(v))
    }
}

impl From<DateTime<Utc>> for ConstraintValue {
    fn from(v: DateTime<Utc>) -> Self {
        ConstraintValue::Time(v)
    }
}

/// Constraints for one request, kept in normalized key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    entries: BTreeMap<ConstraintKey, ConstraintValue>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under a string key such as `"latitude>="`.
    pub fn insert(&mut self, key: &str, value: impl Into<ConstraintValue>) -> Result<()> {
        let key = key.parse::<ConstraintKey>()?;
        self.entries.insert(key, value.into());
        Ok(())
    }

    /// Like [`insert`](Self::insert), but the value is given as text.
    pub fn insert_str(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed_key = key.parse::<ConstraintKey>()?;
        let value = ConstraintValue::parse(key, value)?;
        self.entries.insert(parsed_key, value);
        Ok(())
    }

    /// Builder-style typed insert.
    pub fn with(
        mut self,
        dimension: Dimension,
        operator: Operator,
        value: impl Into<ConstraintValue>,
    ) -> Self {
        self.entries
            .insert(ConstraintKey::new(dimension, operator), value.into());
        self
    }

    /// Builds a set from a JSON object like
    /// `{"time>=": "2000-01-01T00:00:00Z", "latitude_step": 100}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| Error::InvalidValue {
            key: "<constraints>".to_string(),
            value: value.to_string(),
        })?;

        let mut set = Self::new();
        for (k, v) in obj {
            match v {
                Value::Number(n) => {
                    let n = n.as_f64().ok_or_else(|| Error::InvalidValue {
                        key: k.clone(),
                        value: n.to_string(),
                    })?;
                    set.insert(k, n)?;
                }
                Value::String(s) => set.insert_str(k, s)?,
                other => {
                    // Surface a bad key before complaining about its value.
                    k.parse::<ConstraintKey>()?;
                    return Err(Error::InvalidValue {
                        key: k.clone(),
                        value: other.to_string(),
                    });
                }
            }
        }
        Ok(set)
    }

    pub fn get(&self, dimension: Dimension, operator: Operator) -> Option<&ConstraintValue> {
        self.entries.get(&ConstraintKey::new(dimension, operator))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates in normalized order: time, depth, latitude, longitude; within a
    /// dimension `>=`, `<=`, `_step`.
    pub fn iter(&self) -> impl Iterator<Item = (&ConstraintKey, &ConstraintValue)> {
        self.entries.iter()
    }

    /// Dimensions that carry at least one constraint, in normalized order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = self.entries.keys().map(|k| k.dimension).collect();
        dims.dedup();
        dims
    }
}

/// `time>=2000-01-01T00:00:00Z, latitude<=10, longitude_step=2`, or `(none)`.
impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("(none)");
        }
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match key.operator {
                Operator::Step => write!(f, "{}={}", key, value)?,
                _ => write!(f, "{}{}", key, value)?,
            }
        }
        Ok(())
    }
}

/// A [`ConstraintSet`] that passed [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConstraints(ConstraintSet);

impl ValidatedConstraints {
    pub fn get(&self, dimension: Dimension, operator: Operator) -> Option<&ConstraintValue> {
        self.0.get(dimension, operator)
    }

    pub fn as_set(&self) -> &ConstraintSet {
        &self.0
    }

    pub fn into_inner(self) -> ConstraintSet {
        self.0
    }
}

/// Checks bounds and strides; returns the set unchanged on success.
pub fn validate(set: &ConstraintSet) -> Result<ValidatedConstraints> {
    if set.is_empty() {
        return Err(Error::EmptyConstraintSet);
    }

    for (key, value) in set.iter() {
        match key.operator {
            Operator::Step => check_step(key.dimension, value)?,
            Operator::Lower | Operator::Upper => check_bound(key, value)?,
        }
    }

    for dimension in set.dimensions() {
        let lower = set.get(dimension, Operator::Lower);
        let upper = set.get(dimension, Operator::Upper);
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if lower.as_f64() > upper.as_f64() {
                return Err(Error::InvalidRange {
                    dimension,
                    lower: lower.to_string(),
                    upper: upper.to_string(),
                });
            }
        }
    }

    Ok(ValidatedConstraints(set.clone()))
}

fn check_step(dimension: Dimension, value: &ConstraintValue) -> Result<()> {
    let ok = match value {
        ConstraintValue::Number(n) => n.is_finite() && *n > 0.0 && n.fract() == 0.0,
        ConstraintValue::Time(_) => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidStep {
            dimension,
            value: value.to_string(),
        })
    }
}

fn check_bound(key: &ConstraintKey, value: &ConstraintValue) -> Result<()> {
    match value {
        ConstraintValue::Number(n) if n.is_finite() => Ok(()),
        // Only the time axis takes timestamps; ERDDAP also accepts epoch seconds there.
        ConstraintValue::Time(_) if key.dimension == Dimension::Time => Ok(()),
        other => Err(Error::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}
