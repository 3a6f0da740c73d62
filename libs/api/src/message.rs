use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OperatorError;
use crate::value::{Payload, Value};

/// Logical clock value: coordinates compared lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    coordinates: Vec<u64>,
}

impl Timestamp {
    pub fn new(coordinates: Vec<u64>) -> Self {
        Self { coordinates }
    }

    pub fn coordinates(&self) -> &[u64] {
        &self.coordinates
    }
}

impl From<u64> for Timestamp {
    fn from(t: u64) -> Self {
        Self { coordinates: vec![t] }
    }
}

impl From<Vec<u64>> for Timestamp {
    fn from(coordinates: Vec<u64>) -> Self {
        Self { coordinates }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.coordinates)
    }
}

/// Timestamped payload flowing through a stream.
///
/// `stream` names the stream the message was last sent on. The engine stamps
/// it on send; operators building new messages leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub payload: Value,
    pub timestamp: Timestamp,
    pub stream: String,
}

impl Message {
    pub fn new(payload: impl Into<Value>, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            payload: payload.into(),
            timestamp: timestamp.into(),
            stream: String::new(),
        }
    }

    /// Build a message from any [`Payload`] type.
    pub fn typed<T: Payload>(payload: T, timestamp: impl Into<Timestamp>) -> Self {
        Self::new(payload.into_value(), timestamp)
    }

    /// Read the payload back as `T`.
    pub fn payload_as<T: Payload>(&self) -> Result<T, OperatorError> {
        T::from_value(self.payload.clone())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}: {}", self.stream, self.timestamp, self.payload)
    }
}
