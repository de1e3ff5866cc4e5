//! Producer Type
//!
//! Selects the sequencer a ring buffer is built with: the single-producer
//! sequencer keeps its claim state in plain fields owned by one thread, the
//! multi-producer sequencer claims with CAS and tracks per-slot availability.

use crate::disruptor::DisruptorError;
use serde::{Deserialize, Serialize};

/// How many threads may publish into a ring buffer
///
/// # Examples
/// ```
/// use ringbatch::disruptor::ProducerType;
///
/// let producer_type: ProducerType = "multi".parse().unwrap();
/// assert!(producer_type.is_multi());
/// assert_eq!(producer_type.to_string(), "multi");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// Exactly one publishing thread. Publishing from more than one thread
    /// with this type corrupts the sequence protocol.
    Single,

    /// Any number of publishing threads (the default)
    #[default]
    Multi,
}

impl ProducerType {
    /// Returns true for [`ProducerType::Single`]
    pub fn is_single(&self) -> bool {
        matches!(self, ProducerType::Single)
    }

    /// Returns true for [`ProducerType::Multi`]
    pub fn is_multi(&self) -> bool {
        matches!(self, ProducerType::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerType::Single => write!(f, "single"),
            ProducerType::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for ProducerType {
    type Err = DisruptorError;

    /// Parse `single` or `multi`, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ProducerType::Single),
            "multi" => Ok(ProducerType::Multi),
            _ => Err(DisruptorError::InvalidArgument(format!(
                "invalid producer type '{s}', expected 'single' or 'multi'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_is_multi() {
        assert_eq!(ProducerType::default(), ProducerType::Multi);
        assert!(ProducerType::default().is_multi());
        assert!(!ProducerType::default().is_single());
    }

    #[test]
    fn test_from_str_ignores_case() {
        assert_eq!(ProducerType::from_str("SINGLE").unwrap(), ProducerType::Single);
        assert_eq!(ProducerType::from_str("Multi").unwrap(), ProducerType::Multi);

        let err = ProducerType::from_str("several").unwrap_err();
        assert!(matches!(err, DisruptorError::InvalidArgument(_)));
        assert!(ProducerType::from_str("").is_err());
    }

    #[test]
    fn test_display_matches_serde_names() {
        for producer_type in [ProducerType::Single, ProducerType::Multi] {
            let json = serde_json::to_string(&producer_type).unwrap();
            assert_eq!(json, format!("\"{producer_type}\""));
            let parsed: ProducerType = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, producer_type);
        }
    }
}
