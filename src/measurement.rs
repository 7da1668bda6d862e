//! Output boundary of the poller.
//!
//! Every poll cycle hands its results to an [`Accumulator`]: one
//! [`Measurement`] per (measurement name, tag set) and slave, plus the
//! errors that were scoped to a slave or a field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::PollError;
use crate::value::FieldValue;

/// A set of field values sharing a name, tags and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Sink for poll results.
pub trait Accumulator {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: BTreeMap<String, FieldValue>,
        tags: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    );

    fn add_error(&mut self, error: PollError);
}

/// Keeps everything in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccumulator {
    pub measurements: Vec<Measurement>,
    pub errors: Vec<PollError>,
}

impl MemoryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measurements emitted for `slave`.
    pub fn for_slave(&self, slave: u8) -> impl Iterator<Item = &Measurement> {
        let slave = slave.to_string();
        self.measurements
            .iter()
            .filter(move |m| m.tag("slave_id") == Some(slave.as_str()))
    }

    /// Drain both lists, leaving the accumulator empty.
    pub fn take(&mut self) -> (Vec<Measurement>, Vec<PollError>) {
        (
            std::mem::take(&mut self.measurements),
            std::mem::take(&mut self.errors),
        )
    }
}

impl Accumulator for MemoryAccumulator {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: BTreeMap<String, FieldValue>,
        tags: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) {
        self.measurements.push(Measurement {
            name: measurement.to_string(),
            tags,
            fields,
            timestamp,
        });
    }

    fn add_error(&mut self, error: PollError) {
        self.errors.push(error);
    }
}
