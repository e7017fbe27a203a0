//! Pluggable payload decoding.
//!
//! The reader never understands record payloads itself. Callers register one
//! or more [`DecoderFactory`] implementations; the first factory that offers
//! a decoder for a channel's `(message_encoding, schema)` pair wins, and the
//! resulting [`DecodeFn`] is memoized for the life of the reader. Decoded
//! values are not cached; every call decodes the supplied bytes.

use std::any::Any;
use std::collections::HashMap;

use crate::error::TraceError;
use crate::record::{ChannelInfo, SchemaInfo};

/// A decoded record payload, downcast by the caller
pub type DecodedValue = Box<dyn Any>;

/// Decoder for one channel's payloads
pub type DecodeFn = Box<dyn Fn(&[u8]) -> Result<DecodedValue, TraceError>>;

/// Supplies decoders for encoding/schema pairs encountered in a trace.
pub trait DecoderFactory {
    /// Return a decoder for the pair, or `None` if this factory does not
    /// handle it.
    fn decoder_for(&self, message_encoding: &str, schema: Option<&SchemaInfo>)
        -> Option<DecodeFn>;
}

/// Per-channel decoder resolution with memoization.
#[derive(Default)]
pub struct DecoderCache {
    factories: Vec<Box<dyn DecoderFactory>>,
    decoders: HashMap<u16, DecodeFn>,
}

impl DecoderCache {
    /// Create an empty cache with no factories registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder factory. Factories are probed in registration order.
    pub fn add_factory(&mut self, factory: Box<dyn DecoderFactory>) {
        self.factories.push(factory);
    }

    /// Decode `data` as a payload of `channel`.
    ///
    /// Resolution happens once per channel id; later calls reuse the cached
    /// decoder. Fails with [`TraceError::DecoderNotFound`] when no factory
    /// handles the channel's encoding/schema pair.
    pub fn decode(&mut self, channel: &ChannelInfo, data: &[u8]) -> Result<DecodedValue, TraceError> {
        if let Some(decoder) = self.decoders.get(&channel.id) {
            return decoder(data);
        }
        for factory in &self.factories {
            if let Some(decoder) =
                factory.decoder_for(&channel.message_encoding, channel.schema.as_ref())
            {
                let value = decoder(data);
                self.decoders.insert(channel.id, decoder);
                return value;
            }
        }
        Err(TraceError::DecoderNotFound {
            encoding: channel.message_encoding.clone(),
            schema: channel
                .schema
                .as_ref()
                .map(|schema| schema.name.clone())
                .unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for DecoderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderCache")
            .field("factories", &self.factories.len())
            .field("resolved_channels", &self.decoders.len())
            .finish()
    }
}
