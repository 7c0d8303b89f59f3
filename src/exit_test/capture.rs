//! Captured values
//!
//! An exit test's body cannot close over the parent's state, so the caller
//! lists named values to carry into the child as one JSON blob.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ExitTestError;

/// Named values carried from the parent into an exit test's child
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapturedValues {
    values: BTreeMap<String, Value>,
}

impl CapturedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `value` under `name`
    pub fn with<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Result<Self, ExitTestError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn insert<T: Serialize>(&mut self, name: impl Into<String>, value: &T) -> Result<(), ExitTestError> {
        let name = name.into();
        let encoded = serde_json::to_value(value).map_err(|source| ExitTestError::CaptureEncode {
            name: name.clone(),
            source,
        })?;
        self.values.insert(name, encoded);
        Ok(())
    }

    /// Decode the value captured as `name`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ExitTestError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ExitTestError::CaptureMissing(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|source| ExitTestError::CaptureDecode {
            name: name.to_string(),
            source,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ExitTestError> {
        serde_json::to_vec(&self.values).map_err(ExitTestError::CaptureBlob)
    }

    pub fn decode(blob: &[u8]) -> Result<Self, ExitTestError> {
        let values = serde_json::from_slice(blob).map_err(ExitTestError::CaptureBlob)?;
        Ok(Self { values })
    }
}
