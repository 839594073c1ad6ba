//! Backend health status
//!
//! Structured data only. Rendering (tables, colors, HTML) belongs to the
//! caller. `fields` keeps the column order of the operator status table.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Okay,
    Error(String),
}

impl HealthStatus {
    pub fn is_okay(&self) -> bool {
        matches!(self, HealthStatus::Okay)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Okay => write!(f, "OK"),
            HealthStatus::Error(reason) => write!(f, "ERROR: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthField {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Backend that produced the report, e.g. "GrapheneBackend"
    pub manager: &'static str,
    pub symbol: String,
    pub status: HealthStatus,
    pub fields: Vec<HealthField>,
}

impl HealthReport {
    pub fn new(manager: &'static str, symbol: impl Into<String>) -> Self {
        Self {
            manager,
            symbol: symbol.into(),
            status: HealthStatus::Okay,
            fields: Vec::new(),
        }
    }

    /// Append a column. Order of calls is the display order.
    pub fn field(&mut self, name: &'static str, value: impl Into<String>) {
        self.fields.push(HealthField {
            name,
            value: value.into(),
        });
    }

    /// Mark degraded. The first reason wins.
    pub fn degrade(&mut self, reason: impl Into<String>) {
        if self.status.is_okay() {
            self.status = HealthStatus::Error(reason.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}
