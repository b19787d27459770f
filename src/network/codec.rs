// src/network/codec.rs
//! Pool wire encoding
//!
//! The pool client speaks in terms of [`Outbound`] and [`Inbound`] messages;
//! a [`WireCodec`] maps them to and from text frames. [`StratumCodec`]
//! implements the line-delimited JSON-RPC dialect used by Stratum pools.

use crate::miner::job::{Digest, SubmitOutcome, Target};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Client to pool messages
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Open a session
    Subscribe {
        /// Request id
        id: u64,
        /// Client name and version
        user_agent: String,
    },
    /// Authenticate a worker
    Authorize {
        /// Request id
        id: u64,
        /// Worker login
        user: String,
        /// Worker password
        password: String,
    },
    /// Submit a share
    Submit {
        /// Request id
        id: u64,
        /// Worker login
        user: String,
        /// Job the share was found against
        job_id: String,
        /// Winning nonce
        nonce: u64,
        /// Resulting digest
        digest: Digest,
    },
}

/// A job notification as sent by the pool
#[derive(Debug, Clone, PartialEq)]
pub struct JobNotification {
    /// Pool job identifier
    pub job_id: String,
    /// Header template without nonce
    pub header: Vec<u8>,
    /// Abandon earlier jobs
    pub clean_jobs: bool,
    /// Explicit target; when absent the session difficulty applies
    pub target: Option<Target>,
}

/// Reply to one of our requests
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Id of the request being answered
    pub id: u64,
    /// Result payload (`null` when absent)
    pub result: Value,
    /// Error payload, if the pool reported one
    pub error: Option<Value>,
}

/// Pool to client messages
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// New work
    Notify(JobNotification),
    /// New session difficulty for subsequent jobs
    SetDifficulty(f64),
    /// The pool asks us to reconnect
    Reconnect,
    /// Reply to a request
    Response(RpcResponse),
    /// A notification we do not handle
    Unknown(String),
}

/// Session context from a successful subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Pool-assigned extra-nonce prefix
    pub extra_nonce: Vec<u8>,
    /// Size of the client-chosen extra-nonce part
    pub extra_nonce2_size: usize,
}

/// Encodes and decodes pool messages
///
/// Implementations are stateless so a single codec serves every session.
pub trait WireCodec: Send + Sync {
    /// Encodes one message as a single frame (without line terminator)
    fn encode(&self, message: &Outbound) -> Result<String, MinerError>;

    /// Decodes one frame
    ///
    /// # Errors
    /// Returns `MinerError::Protocol` for malformed frames.
    fn decode(&self, frame: &str) -> Result<Inbound, MinerError>;

    /// Extracts the session context from a subscribe reply
    fn parse_subscription(&self, response: &RpcResponse) -> Result<Subscription, MinerError>;

    /// Interprets an authorize reply
    ///
    /// # Returns
    /// `Err(reason)` when the pool rejected the credentials
    fn parse_authorization(&self, response: &RpcResponse) -> Result<(), String>;

    /// Interprets a submit reply
    fn parse_submission(&self, response: &RpcResponse) -> SubmitOutcome;
}

/// JSON-RPC message envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonRpcMessage {
    /// Request or notification
    Request {
        id: Option<Value>,
        method: String,
        #[serde(default)]
        params: Value,
    },
    /// Response to a request
    Response {
        id: Value,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
}

/// Stratum v1 style JSON-RPC codec
#[derive(Debug, Clone, Copy)]
pub struct StratumCodec {
    algorithm: AlgorithmType,
}

impl StratumCodec {
    /// Creates a codec for `algorithm`, which fixes the nonce width on submit
    pub fn new(algorithm: AlgorithmType) -> Self {
        StratumCodec { algorithm }
    }

    fn parse_notify(params: &Value) -> Result<JobNotification, MinerError> {
        let params = params
            .as_array()
            .ok_or_else(|| MinerError::Protocol("mining.notify params not an array".into()))?;
        if params.len() < 3 {
            return Err(MinerError::Protocol("mining.notify params too short".into()));
        }

        let job_id = match &params[0] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(MinerError::Protocol("job_id not a string".into())),
        };
        let header = params[1]
            .as_str()
            .ok_or_else(|| MinerError::Protocol("header not a string".into()))?;
        let header = hex::decode(header)?;
        let clean_jobs = params[2]
            .as_bool()
            .ok_or_else(|| MinerError::Protocol("clean_jobs not a boolean".into()))?;
        let target = match params.get(3) {
            Some(Value::String(s)) => Some(Target::from_hex(s)?),
            Some(Value::Null) | None => None,
            Some(_) => return Err(MinerError::Protocol("target not a string".into())),
        };

        Ok(JobNotification {
            job_id,
            header,
            clean_jobs,
            target,
        })
    }

    fn parse_difficulty(params: &Value) -> Result<f64, MinerError> {
        let difficulty = params
            .get(0)
            .and_then(Value::as_f64)
            .ok_or_else(|| MinerError::Protocol("mining.set_difficulty missing value".into()))?;
        if !difficulty.is_finite() || difficulty <= 0.0 {
            return Err(MinerError::Protocol(format!(
                "Invalid difficulty: {}",
                difficulty
            )));
        }
        Ok(difficulty)
    }
}

/// Human-readable text of a JSON-RPC error value
///
/// Pools send `[code, "message", data]`, `{"message": ...}` or plain strings.
fn error_reason(error: &Value) -> String {
    match error {
        Value::Array(parts) => match (parts.first(), parts.get(1)) {
            (Some(code), Some(Value::String(msg))) => format!("{} (code {})", msg, code),
            _ => error.to_string(),
        },
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn response_error(response: &RpcResponse) -> Option<String> {
    match &response.error {
        Some(Value::Null) | None => None,
        Some(error) => Some(error_reason(error)),
    }
}

impl WireCodec for StratumCodec {
    fn encode(&self, message: &Outbound) -> Result<String, MinerError> {
        let value = match message {
            Outbound::Subscribe { id, user_agent } => json!({
                "id": id,
                "method": "mining.subscribe",
                "params": [user_agent],
            }),
            Outbound::Authorize { id, user, password } => json!({
                "id": id,
                "method": "mining.authorize",
                "params": [user, password],
            }),
            Outbound::Submit {
                id,
                user,
                job_id,
                nonce,
                digest,
            } => json!({
                "id": id,
                "method": "mining.submit",
                "params": [
                    user,
                    job_id,
                    format!("{:0width$x}", nonce, width = self.algorithm.nonce_bytes() * 2),
                    hex::encode(digest),
                ],
            }),
        };
        Ok(serde_json::to_string(&value)?)
    }

    fn decode(&self, frame: &str) -> Result<Inbound, MinerError> {
        let message: JsonRpcMessage = serde_json::from_str(frame.trim())
            .map_err(|e| MinerError::Protocol(format!("Malformed frame: {}", e)))?;

        match message {
            JsonRpcMessage::Request { method, params, .. } => match method.as_str() {
                "mining.notify" => Ok(Inbound::Notify(Self::parse_notify(&params)?)),
                "mining.set_difficulty" => {
                    Ok(Inbound::SetDifficulty(Self::parse_difficulty(&params)?))
                }
                "client.reconnect" => Ok(Inbound::Reconnect),
                _ => Ok(Inbound::Unknown(method)),
            },
            JsonRpcMessage::Response { id, result, error } => {
                let id = id
                    .as_u64()
                    .ok_or_else(|| MinerError::Protocol(format!("Unexpected response id {}", id)))?;
                Ok(Inbound::Response(RpcResponse {
                    id,
                    result: result.unwrap_or(Value::Null),
                    error,
                }))
            }
        }
    }

    fn parse_subscription(&self, response: &RpcResponse) -> Result<Subscription, MinerError> {
        if let Some(reason) = response_error(response) {
            return Err(MinerError::Protocol(format!("Subscribe failed: {}", reason)));
        }

        // [subscriptions, extranonce1, extranonce2_size]
        let result = response
            .result
            .as_array()
            .ok_or_else(|| MinerError::Protocol("Subscribe result not an array".into()))?;
        let extra_nonce = result
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| MinerError::Protocol("Subscribe result missing extranonce1".into()))?;
        let extra_nonce2_size = result
            .get(2)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                MinerError::Protocol("Subscribe result missing extranonce2 size".into())
            })?;

        Ok(Subscription {
            extra_nonce: hex::decode(extra_nonce)?,
            extra_nonce2_size: extra_nonce2_size as usize,
        })
    }

    fn parse_authorization(&self, response: &RpcResponse) -> Result<(), String> {
        if let Some(reason) = response_error(response) {
            return Err(reason);
        }
        match response.result {
            Value::Bool(true) => Ok(()),
            _ => Err("Authorization refused".to_string()),
        }
    }

    fn parse_submission(&self, response: &RpcResponse) -> SubmitOutcome {
        if let Some(reason) = response_error(response) {
            return SubmitOutcome::Rejected(reason);
        }
        match response.result {
            Value::Bool(true) => SubmitOutcome::Accepted,
            _ => SubmitOutcome::Rejected("Share refused".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> StratumCodec {
        StratumCodec::new(AlgorithmType::Sha256d)
    }

    #[test]
    fn decodes_notify_with_and_without_target() {
        let frame = r#"{"id":null,"method":"mining.notify","params":["j1","deadbeef",true]}"#;
        match codec().decode(frame).unwrap() {
            Inbound::Notify(job) => {
                assert_eq!(job.job_id, "j1");
                assert_eq!(job.header, vec![0xde, 0xad, 0xbe, 0xef]);
                assert!(job.clean_jobs);
                assert!(job.target.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        let frame = r#"{"method":"mining.notify","params":["j2","00",false,"00ff"]}"#;
        match codec().decode(frame).unwrap() {
            Inbound::Notify(job) => {
                assert!(!job.clean_jobs);
                assert_eq!(job.target.unwrap().0[31], 0xff);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(codec().decode("not json").is_err());
        assert!(
            codec()
                .decode(r#"{"method":"mining.notify","params":["j1","zz",true]}"#)
                .is_err()
        );
        assert!(
            codec()
                .decode(r#"{"method":"mining.set_difficulty","params":[-1]}"#)
                .is_err()
        );
    }

    #[test]
    fn decodes_control_messages() {
        assert_eq!(
            codec()
                .decode(r#"{"id":null,"method":"mining.set_difficulty","params":[0.5]}"#)
                .unwrap(),
            Inbound::SetDifficulty(0.5)
        );
        assert_eq!(
            codec()
                .decode(r#"{"id":null,"method":"client.reconnect","params":[]}"#)
                .unwrap(),
            Inbound::Reconnect
        );
        assert_eq!(
            codec()
                .decode(r#"{"method":"mining.set_extranonce","params":[]}"#)
                .unwrap(),
            Inbound::Unknown("mining.set_extranonce".into())
        );
    }

    #[test]
    fn subscription_result_layout() {
        let frame = r#"{"id":1,"result":[[["mining.notify","abc"]],"08000002",4],"error":null}"#;
        let Inbound::Response(response) = codec().decode(frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(response.id, 1);
        let sub = codec().parse_subscription(&response).unwrap();
        assert_eq!(sub.extra_nonce, vec![0x08, 0, 0, 0x02]);
        assert_eq!(sub.extra_nonce2_size, 4);

        let bad = RpcResponse {
            id: 1,
            result: json!(true),
            error: None,
        };
        assert!(codec().parse_subscription(&bad).is_err());
    }

    #[test]
    fn authorization_and_submission_results() {
        let ok = RpcResponse {
            id: 2,
            result: json!(true),
            error: None,
        };
        let refused = RpcResponse {
            id: 2,
            result: json!(false),
            error: None,
        };
        let error = RpcResponse {
            id: 3,
            result: Value::Null,
            error: Some(json!([23, "Low difficulty share", null])),
        };

        assert!(codec().parse_authorization(&ok).is_ok());
        assert!(codec().parse_authorization(&refused).is_err());
        assert_eq!(codec().parse_submission(&ok), SubmitOutcome::Accepted);
        assert_eq!(
            codec().parse_submission(&error),
            SubmitOutcome::Rejected("Low difficulty share (code 23)".into())
        );
    }

    #[test]
    fn submit_nonce_width_follows_algorithm() {
        let submit = Outbound::Submit {
            id: 7,
            user: "alice.rig".into(),
            job_id: "j1".into(),
            nonce: 0x1f,
            digest: [0xab; 32],
        };

        let sha: Value =
            serde_json::from_str(&StratumCodec::new(AlgorithmType::Sha256d).encode(&submit).unwrap())
                .unwrap();
        assert_eq!(sha["method"], "mining.submit");
        assert_eq!(sha["params"][2], "0000001f");
        assert_eq!(sha["params"][3], "ab".repeat(32));

        let keccak: Value = serde_json::from_str(
            &StratumCodec::new(AlgorithmType::Keccak256d)
                .encode(&submit)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(keccak["params"][2], "000000000000001f");
    }
}
