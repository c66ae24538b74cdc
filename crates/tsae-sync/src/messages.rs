//! TSAE protocol message types.
//!
//! Every message carries the number of the session it belongs to. Messages are
//! encoded as CBOR.

use serde::{Deserialize, Serialize};
use std::fmt;

use tsae_core::{ClockMatrix, ClockVector, Operation};

use crate::error::{Result, SyncError};

/// Message size limits.
pub mod limits {
    /// Max encoded size of a single message frame.
    pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
}

/// Discriminant of a message, for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    AeRequest,
    Operation,
    EndTsae,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MsgType::AeRequest => "AE_REQUEST",
            MsgType::Operation => "OPERATION",
            MsgType::EndTsae => "END_TSAE",
        })
    }
}

/// Payload of a TSAE message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// A side's frontier: its summary and its acknowledgement matrix.
    AeRequest {
        summary: ClockVector,
        ack: ClockMatrix,
    },

    /// One operation the receiver has not seen.
    Operation(Operation),

    /// End of the sender's part of the session.
    EndTsae,
}

/// A message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsaeMessage {
    /// Session this message belongs to.
    pub session_number: u64,
    /// The message payload.
    pub body: MessageBody,
}

impl TsaeMessage {
    /// Build an `AE_REQUEST`.
    pub fn ae_request(session_number: u64, summary: ClockVector, ack: ClockMatrix) -> Self {
        Self {
            session_number,
            body: MessageBody::AeRequest { summary, ack },
        }
    }

    /// Build an `OPERATION`.
    pub fn operation(session_number: u64, op: Operation) -> Self {
        Self {
            session_number,
            body: MessageBody::Operation(op),
        }
    }

    /// Build an `END_TSAE`.
    pub fn end_tsae(session_number: u64) -> Self {
        Self {
            session_number,
            body: MessageBody::EndTsae,
        }
    }

    /// The message's type.
    pub fn msg_type(&self) -> MsgType {
        match self.body {
            MessageBody::AeRequest { .. } => MsgType::AeRequest,
            MessageBody::Operation(_) => MsgType::Operation,
            MessageBody::EndTsae => MsgType::EndTsae,
        }
    }

    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Encode(e.to_string()))?;
        if buf.len() > limits::MAX_FRAME_LEN {
            return Err(SyncError::FrameTooLarge {
                len: buf.len(),
                max: limits::MAX_FRAME_LEN,
            });
        }
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

impl fmt::Display for TsaeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            MessageBody::AeRequest { summary, .. } => {
                write!(f, "AE_REQUEST[{}] summary: {}", self.session_number, summary)
            }
            MessageBody::Operation(op) => {
                write!(f, "OPERATION[{}] {}", self.session_number, op.timestamp)
            }
            MessageBody::EndTsae => write!(f, "END_TSAE[{}]", self.session_number),
        }
    }
}
