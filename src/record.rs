//! Record and channel model shared by both container strategies.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One timestamped record read from a trace.
///
/// The payload is opaque to the reader; use a
/// [`DecoderFactory`](crate::decode::DecoderFactory) to turn it into a typed
/// value. Records from flat traces carry no channel or timestamp in the frame
/// itself and report `channel_id == 0`, `log_time == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Channel the record belongs to
    pub channel_id: u16,
    /// Logical timestamp in nanoseconds
    pub log_time: u64,
    /// Serialized payload bytes
    pub data: Bytes,
}

/// Schema attached to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Schema name, e.g. `vehicle.Pose`
    pub name: String,
    /// Schema encoding, e.g. `protobuf`, `jsonschema`
    pub encoding: String,
}

/// Channel descriptor from the container summary.
///
/// Channels are discovered from the container, never declared by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Numeric channel id used in record frames
    pub id: u16,
    /// Topic name of the channel
    pub topic: String,
    /// Encoding of the records on this channel, e.g. `protobuf`
    pub message_encoding: String,
    /// Schema of the channel payloads, if declared
    #[serde(default)]
    pub schema: Option<SchemaInfo>,
    /// Arbitrary key/value metadata attached to the channel
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ChannelInfo {
    /// Whether the channel's declared schema name matches `name`.
    ///
    /// A `None` filter matches every channel.
    pub fn schema_matches(&self, name: Option<&str>) -> bool {
        match name {
            None => true,
            Some(name) => self
                .schema
                .as_ref()
                .is_some_and(|schema| schema.name == name),
        }
    }
}
