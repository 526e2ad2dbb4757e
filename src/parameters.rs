//! In-memory cache of camera-reported parameter values.
//!
//! Every decoded report lands here keyed by (category, parameter id);
//! command modules and applications read back the last known value with
//! typed conversions.

use std::collections::HashMap;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::{fixed16_to_float, Category, DataType, DecodedPacket, OperationType};

/// The most recently observed value for one (category, parameter id) key.
#[derive(Debug, Clone)]
pub struct ParameterEntry {
    pub category: Category,
    pub parameter: u8,
    pub data_type: DataType,
    pub operation: OperationType,
    pub raw: Vec<u8>,
    pub updated_at: Instant,
}

impl ParameterEntry {
    pub fn from_packet(packet: DecodedPacket) -> Self {
        Self {
            category: packet.category,
            parameter: packet.parameter,
            data_type: packet.data_type,
            operation: packet.operation,
            raw: packet.payload,
            updated_at: Instant::now(),
        }
    }

    fn invalid(&self, what: &str) -> Error {
        Error::InvalidParameter(format!(
            "{}/{:#04x}: {what}",
            self.category.name(),
            self.parameter
        ))
    }

    fn leading_bytes<const N: usize>(&self) -> Result<[u8; N]> {
        match self.raw.get(..N).and_then(|b| <[u8; N]>::try_from(b).ok()) {
            Some(bytes) => Ok(bytes),
            None => Err(self.invalid(&format!(
                "payload of {} bytes is shorter than the {N}-byte value",
                self.raw.len()
            ))),
        }
    }

    /// Interpret the leading element as a signed integer.
    ///
    /// `Fixed16` yields the raw fixed-point value; strings are parsed and
    /// report a typed failure on non-numeric text.
    pub fn to_i64(&self) -> Result<i64> {
        match self.data_type {
            DataType::Void => Ok(self.raw.first().map(|&b| (b != 0) as i64).unwrap_or(0)),
            DataType::SignedByte => Ok(self.leading_bytes::<1>()?[0] as i8 as i64),
            DataType::SignedInt16 => Ok(i16::from_le_bytes(self.leading_bytes()?) as i64),
            DataType::SignedInt32 => Ok(i32::from_le_bytes(self.leading_bytes()?) as i64),
            DataType::SignedInt64 => Ok(i64::from_le_bytes(self.leading_bytes()?)),
            DataType::Fixed16 => Ok(i16::from_le_bytes(self.leading_bytes()?) as i64),
            DataType::Utf8String => {
                let text = self.to_string_lossy();
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| self.invalid(&format!("cannot parse {text:?} as an integer")))
            }
        }
    }

    /// Interpret the leading element as a float. `Fixed16` applies the 5.11
    /// conversion.
    pub fn to_f32(&self) -> Result<f32> {
        match self.data_type {
            DataType::Fixed16 => Ok(fixed16_to_float(i16::from_le_bytes(self.leading_bytes()?))),
            DataType::Utf8String => {
                let text = self.to_string_lossy();
                text.trim()
                    .parse::<f32>()
                    .map_err(|_| self.invalid(&format!("cannot parse {text:?} as a number")))
            }
            _ => Ok(self.to_i64()? as f32),
        }
    }

    /// First payload byte, non-zero = true. An empty payload is false.
    pub fn to_bool(&self) -> bool {
        self.raw.first().is_some_and(|&b| b != 0)
    }

    /// Payload as text: stops at the first NUL and drops non-printable
    /// bytes rather than replacing them.
    pub fn to_string_lossy(&self) -> String {
        self.raw
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|&&b| (0x20..0x7F).contains(&b))
            .map(|&b| b as char)
            .collect()
    }
}

/// Last-write-wins cache of parameter reports.
///
/// Unbounded by default; a capacity can be configured for memory-constrained
/// targets, in which case inserting a new key past the cap reports
/// [`Error::StoreFull`] instead of silently dropping.
#[derive(Debug, Default)]
pub struct ParameterStore {
    entries: HashMap<(Category, u8), ParameterEntry>,
    capacity: Option<usize>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: Some(capacity),
        }
    }

    /// Insert or overwrite by key, refreshing the timestamp.
    pub fn update(&mut self, mut entry: ParameterEntry) -> Result<()> {
        let key = (entry.category, entry.parameter);
        if let Some(cap) = self.capacity {
            if !self.entries.contains_key(&key) && self.entries.len() >= cap {
                return Err(Error::StoreFull(cap));
            }
        }
        entry.updated_at = Instant::now();
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn get(&self, category: Category, parameter: u8) -> Option<&ParameterEntry> {
        self.entries.get(&(category, parameter))
    }

    pub fn has(&self, category: Category, parameter: u8) -> bool {
        self.entries.contains_key(&(category, parameter))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the parameter ids cached for one category, sorted.
    pub fn parameters_for_category(&self, category: Category) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .entries
            .keys()
            .filter(|(cat, _)| *cat == category)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of the categories with at least one cached parameter.
    pub fn categories(&self) -> Vec<Category> {
        let mut cats: Vec<Category> = self.entries.keys().map(|(cat, _)| *cat).collect();
        cats.sort_unstable();
        cats.dedup();
        cats
    }
}
