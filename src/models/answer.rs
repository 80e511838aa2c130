// src/models/answer.rs

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::form::FieldType;

/// A responder's answer to one field.
///
/// Each `FieldType` accepts exactly one variant, so the shape of an answer is
/// known from the field alone. On the wire the value travels untagged (a
/// string, number or array) and is decoded with [`AnswerValue::from_wire`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Choice(String),
    Choices(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected:?} answer: {detail}")]
pub struct AnswerShapeError {
    pub expected: FieldType,
    pub detail: String,
}

impl AnswerValue {
    /// True when the responder left the answer blank.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) => s.trim().is_empty(),
            AnswerValue::Choices(v) => v.is_empty(),
            AnswerValue::Number(n) => n.is_nan(),
            AnswerValue::Date(_) | AnswerValue::Time(_) => false,
        }
    }

    /// Decodes an untagged wire value according to the field type.
    pub fn from_wire(field_type: FieldType, value: &Value) -> Result<Self, AnswerShapeError> {
        let shape_err = |detail: &str| AnswerShapeError {
            expected: field_type,
            detail: detail.to_string(),
        };

        match field_type {
            FieldType::ShortText | FieldType::LongText | FieldType::Email => value
                .as_str()
                .map(|s| AnswerValue::Text(s.to_string()))
                .ok_or_else(|| shape_err("not a string")),
            FieldType::Number => match value {
                Value::Number(n) => n
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .map(AnswerValue::Number)
                    .ok_or_else(|| shape_err("not a finite number")),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(AnswerValue::Number)
                    .ok_or_else(|| shape_err("not a finite number")),
                _ => Err(shape_err("not a number")),
            },
            FieldType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(AnswerValue::Date)
                .ok_or_else(|| shape_err("not a YYYY-MM-DD date")),
            FieldType::Time => value
                .as_str()
                .and_then(|s| {
                    NaiveTime::parse_from_str(s, "%H:%M:%S")
                        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                        .ok()
                })
                .map(AnswerValue::Time)
                .ok_or_else(|| shape_err("not a HH:MM time")),
            FieldType::SingleChoice | FieldType::Dropdown => value
                .as_str()
                .map(|s| AnswerValue::Choice(s.to_string()))
                .ok_or_else(|| shape_err("not an option label")),
            FieldType::MultiChoice => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .map(AnswerValue::Choices)
                    .ok_or_else(|| shape_err("array holds a non-string")),
                _ => Err(shape_err("not an array of option labels")),
            },
        }
    }

    /// Encodes the answer in the untagged wire shape.
    pub fn to_wire(&self) -> Value {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) => Value::String(s.clone()),
            AnswerValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AnswerValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            AnswerValue::Time(t) => Value::String(t.format("%H:%M:%S").to_string()),
            AnswerValue::Choices(v) => {
                Value::Array(v.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Human-readable rendering used by results screens.
    pub fn display(&self) -> String {
        match self {
            AnswerValue::Choices(v) => v.join(", "),
            AnswerValue::Number(n) => n.to_string(),
            other => other.to_wire().as_str().unwrap_or_default().to_string(),
        }
    }
}
