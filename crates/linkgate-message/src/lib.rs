// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The immutable message value exchanged between gateway modules.
//!
//! A [`Message`] carries an opaque content byte buffer plus a set of
//! string properties. Once built, a message never changes: publishing
//! it to the broker and handing it to N receivers never requires more
//! than a cheap clone of the content bytes, so callers are free to
//! build a message once and publish it many times.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned while building or decoding a [`Message`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("duplicate property key: {0}")]
    DuplicateProperty(String),

    #[error("truncated message buffer: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("message buffer has bad magic header")]
    BadMagic,

    #[error("message buffer has unsupported version {0}")]
    UnsupportedVersion(u8),

    #[error("property key is not valid UTF-8")]
    InvalidKeyUtf8,

    #[error("property value is not valid UTF-8")]
    InvalidValueUtf8,
}

const MAGIC: [u8; 4] = *b"LGM1";
const VERSION: u8 = 1;

/// An immutable unit of data passed between modules.
///
/// `content` is opaque to the broker: it is never interpreted, only
/// copied. `properties` is a string-to-string map with unique keys,
/// used by modules to attach routing or metadata hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content: Vec<u8>,
    properties: BTreeMap<String, String>,
}

impl Message {
    /// Builds a message from raw content with no properties.
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builds a message from content and a property map, rejecting
    /// duplicate keys the way [`MessageBuilder`] does.
    pub fn with_properties<I, K, V>(content: impl Into<Vec<u8>>, properties: I) -> Result<Self, MessageError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut builder = MessageBuilder::new(content);
        for (k, v) in properties {
            builder = builder.with_property(k, v)?;
        }
        Ok(builder.build())
    }

    /// Borrows the opaque content bytes.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Looks up a single property by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Iterates properties in key order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of properties attached to this message.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Encodes the message into a self-describing byte buffer.
    ///
    /// Layout: `MAGIC(4) | version(1) | content_len(u32 LE) | content |
    /// property_count(u32 LE) | (key_len(u32 LE) | key | value_len(u32 LE) | value)*`
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            MAGIC.len() + 1 + 4 + self.content.len() + 4 + self.properties.len() * 8,
        );
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&(self.content.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.content);
        out.extend_from_slice(&(self.properties.len() as u32).to_le_bytes());
        for (k, v) in &self.properties {
            out.extend_from_slice(&(k.len() as u32).to_le_bytes());
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        out
    }

    /// Decodes a message previously produced by [`Message::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        let mut cursor = Cursor::new(buf);
        let magic = cursor.take(4)?;
        if magic != MAGIC {
            return Err(MessageError::BadMagic);
        }
        let version = cursor.take(1)?[0];
        if version != VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }
        let content_len = cursor.take_u32()? as usize;
        let content = cursor.take(content_len)?.to_vec();
        let property_count = cursor.take_u32()?;
        let mut properties = BTreeMap::new();
        for _ in 0..property_count {
            let key_len = cursor.take_u32()? as usize;
            let key = String::from_utf8(cursor.take(key_len)?.to_vec())
                .map_err(|_| MessageError::InvalidKeyUtf8)?;
            let value_len = cursor.take_u32()? as usize;
            let value = String::from_utf8(cursor.take(value_len)?.to_vec())
                .map_err(|_| MessageError::InvalidValueUtf8)?;
            if properties.insert(key.clone(), value).is_some() {
                return Err(MessageError::DuplicateProperty(key));
            }
        }
        Ok(Self { content, properties })
    }
}

/// Incrementally builds a [`Message`], rejecting duplicate property keys
/// as they are added rather than silently overwriting them.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    content: Vec<u8>,
    properties: BTreeMap<String, String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MessageError> {
        let key = key.into();
        if self.properties.contains_key(&key) {
            return Err(MessageError::DuplicateProperty(key));
        }
        self.properties.insert(key, value.into());
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> Message {
        Message {
            content: self.content,
            properties: self.properties,
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MessageError> {
        if self.pos + n > self.buf.len() {
            return Err(MessageError::Truncated {
                expected: self.pos + n,
                found: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, MessageError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_message_has_no_properties() -> Result<(), String> {
        let msg = Message::new(b"hello".to_vec());
        if msg.property_count() != 0 {
            return Err("fresh message should have no properties".to_string());
        }
        if msg.content() != b"hello" {
            return Err("content mismatch".to_string());
        }
        Ok(())
    }

    #[test]
    fn builder_rejects_duplicate_keys() -> Result<(), String> {
        let result = MessageBuilder::new(b"x".to_vec())
            .with_property("k", "v1")
            .and_then(|b| b.with_property("k", "v2"));
        match result {
            Err(MessageError::DuplicateProperty(k)) if k == "k" => Ok(()),
            other => Err(format!("expected DuplicateProperty, got {other:?}")),
        }
    }

    #[test]
    fn with_properties_rejects_duplicate_keys() -> Result<(), String> {
        let result = Message::with_properties(b"x".to_vec(), vec![("a", "1"), ("a", "2")]);
        match result {
            Err(MessageError::DuplicateProperty(k)) if k == "a" => Ok(()),
            other => Err(format!("expected DuplicateProperty, got {other:?}")),
        }
    }

    #[test]
    fn encode_decode_round_trip_with_properties() -> Result<(), String> {
        let msg = Message::with_properties(
            b"payload-bytes".to_vec(),
            vec![("content-type", "application/json"), ("source", "filter")],
        )
        .map_err(|e| e.to_string())?;
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).map_err(|e| e.to_string())?;
        if decoded != msg {
            return Err("round trip did not reproduce original message".to_string());
        }
        Ok(())
    }

    #[test]
    fn encode_decode_round_trip_empty_content() -> Result<(), String> {
        let msg = Message::new(Vec::new());
        let encoded = msg.encode();
        let decoded = Message::decode(&encoded).map_err(|e| e.to_string())?;
        if decoded != msg {
            return Err("round trip did not reproduce empty message".to_string());
        }
        Ok(())
    }

    #[test]
    fn decode_rejects_bad_magic() -> Result<(), String> {
        match Message::decode(b"NOPE") {
            Err(MessageError::BadMagic) => Ok(()),
            other => Err(format!("expected BadMagic, got {other:?}")),
        }
    }

    #[test]
    fn decode_rejects_truncated_buffer() -> Result<(), String> {
        let msg = Message::new(b"abc".to_vec());
        let mut encoded = msg.encode();
        encoded.truncate(encoded.len() - 2);
        match Message::decode(&encoded) {
            Err(MessageError::Truncated { .. }) => Ok(()),
            other => Err(format!("expected Truncated, got {other:?}")),
        }
    }

    #[test]
    fn decode_rejects_unsupported_version() -> Result<(), String> {
        let msg = Message::new(b"abc".to_vec());
        let mut encoded = msg.encode();
        encoded[4] = 0xFF;
        match Message::decode(&encoded) {
            Err(MessageError::UnsupportedVersion(0xFF)) => Ok(()),
            other => Err(format!("expected UnsupportedVersion, got {other:?}")),
        }
    }

    proptest! {
        #[test]
        fn round_trip_is_lossless(
            content in proptest::collection::vec(any::<u8>(), 0..256),
            keys in proptest::collection::hash_set("[a-z]{1,8}", 0..6),
        ) {
            let mut builder = MessageBuilder::new(content);
            for (i, key) in keys.into_iter().enumerate() {
                builder = builder.with_property(key, format!("v{i}")).unwrap();
            }
            let msg = builder.build();
            let decoded = Message::decode(&msg.encode()).unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
