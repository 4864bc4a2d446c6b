//! Packets and requests crossing the session boundary.

use crate::language::ModuleLanguage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Describes the run a packet belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketMetadata {
    pub session_id: String,
    pub character_name: String,
    pub module_type: String,
    /// Indices of the request units (e.g. sentences) this packet covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_indices: Option<VecDeque<i32>>,
}

impl PacketMetadata {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn with_character(mut self, character_name: impl Into<String>) -> Self {
        self.character_name = character_name.into();
        self
    }

    pub fn with_module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = module_type.into();
        self
    }

    pub fn with_requested_indices(mut self, indices: impl IntoIterator<Item = i32>) -> Self {
        self.requested_indices = Some(indices.into_iter().collect());
        self
    }
}

/// Unit of output produced by a synthesis run.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket<T> {
    pub payload: Vec<T>,
    pub is_final: bool,
    pub metadata: PacketMetadata,
}

impl<T> DataPacket<T> {
    pub fn new(payload: Vec<T>, metadata: PacketMetadata) -> Self {
        Self {
            payload,
            is_final: false,
            metadata,
        }
    }

    /// Last packet of a run.
    pub fn final_packet(payload: Vec<T>, metadata: PacketMetadata) -> Self {
        Self {
            payload,
            is_final: true,
            metadata,
        }
    }

    /// Number of samples in the payload.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Per-request settings that replace the session defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOverride {
    /// Output buffer length in seconds.
    #[serde(default)]
    pub buffer_secs: Option<f32>,
    /// Requested language code. The session resolves it against its
    /// languages with `best_match` when the run starts.
    #[serde(default)]
    pub language: Option<String>,
    /// Region narrowing `language`, e.g. "GB".
    #[serde(default)]
    pub dialect: Option<String>,
}

/// A queued synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthRequest {
    pub input: String,
    pub session_id: String,
    pub config_override: Option<RequestOverride>,
    /// Language resolved from the override; set by the session on start.
    pub language: Option<ModuleLanguage>,
}

impl SynthRequest {
    /// Creates a request with a fresh session id.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            config_override: None,
            language: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_override(mut self, config_override: RequestOverride) -> Self {
        self.config_override = Some(config_override);
        self
    }
}
