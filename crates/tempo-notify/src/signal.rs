use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalCommand {
    Start,
    Stop,
}

impl fmt::Display for SignalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalCommand::Start => "START",
            SignalCommand::Stop => "STOP",
        })
    }
}

/// Payload sent to a worker's channel.
///
/// Wire form: `{"ConfigID": 42, "Command": "START", "Ts": 1704067200}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSignal {
    #[serde(rename = "ConfigID")]
    pub chain_id: i64,
    #[serde(rename = "Command")]
    pub command: SignalCommand,
    /// Unix epoch seconds.
    #[serde(rename = "Ts")]
    pub ts: i64,
}

impl ChainSignal {
    pub fn new(chain_id: i64, command: SignalCommand) -> Self {
        Self {
            chain_id,
            command,
            ts: Utc::now().timestamp(),
        }
    }

    pub fn start(chain_id: i64) -> Self {
        Self::new(chain_id, SignalCommand::Start)
    }

    pub fn stop(chain_id: i64) -> Self {
        Self::new(chain_id, SignalCommand::Stop)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let signal: ChainSignal = serde_json::from_str(payload)?;
        if signal.chain_id <= 0 {
            return Err(NotifyError::InvalidSignal(format!(
                "chain id must be positive, got {}",
                signal.chain_id
            )));
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn wire_field_names() {
        let signal = ChainSignal {
            chain_id: 42,
            command: SignalCommand::Start,
            ts: 1_704_067_200,
        };
        let value: Value = serde_json::from_str(&signal.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"ConfigID": 42, "Command": "START", "Ts": 1_704_067_200})
        );
    }

    #[test]
    fn parse_accepts_payload_from_other_producers() {
        let signal = ChainSignal::parse(r#"{"Ts": 5, "Command": "STOP", "ConfigID": 3}"#).unwrap();
        assert_eq!(signal.chain_id, 3);
        assert_eq!(signal.command, SignalCommand::Stop);
        assert_eq!(signal.ts, 5);
    }

    #[test]
    fn parse_rejects_bad_payloads() {
        assert!(matches!(
            ChainSignal::parse(r#"{"ConfigID": 1, "Command": "PAUSE", "Ts": 0}"#),
            Err(NotifyError::Serialization(_))
        ));
        assert!(matches!(
            ChainSignal::parse("not json"),
            Err(NotifyError::Serialization(_))
        ));
        assert!(matches!(
            ChainSignal::parse(r#"{"ConfigID": 0, "Command": "START", "Ts": 0}"#),
            Err(NotifyError::InvalidSignal(_))
        ));
    }

    #[test]
    fn timestamp_is_current() {
        let before = Utc::now().timestamp();
        let signal = ChainSignal::start(1);
        assert!(signal.ts >= before && signal.ts <= Utc::now().timestamp());
    }
}
