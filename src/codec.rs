// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Encodings
//!
//! A [`Codec`] turns a typed value into message bytes and back. The codec is
//! chosen statically per subscription and per publish call. The content type
//! it reports is stamped on every published message.
//!
//! Publishing only needs the [`Encoder`] half, so values that borrow their
//! data can be published without being decodable.
//!
//! Decode failures are always [`AmqpError::DecodeError`], so the consume loop
//! can tell a malformed payload apart from a handler's own verdict.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};

/// Content type of [`JsonCodec`] payloads
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of [`BinaryCodec`] payloads
pub const BINARY_CONTENT_TYPE: &str = "application/x-bitcode";

/// Encoding half of a codec, all a publisher needs.
pub trait Encoder<T: ?Sized>: Clone + Send + Sync + 'static {
    /// MIME type written to the message's `content-type` property.
    fn content_type(&self) -> &'static str;

    /// Serializes `value` into a message body.
    ///
    /// # Returns
    /// The payload bytes, or [`AmqpError::EncodeError`]
    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError>;
}

/// Stateless encode/decode pair for payloads of type `T`.
pub trait Codec<T>: Encoder<T> {
    /// Deserializes a message body.
    ///
    /// # Returns
    /// The decoded value, or [`AmqpError::DecodeError`] for a malformed body
    fn decode(&self, bytes: &[u8]) -> Result<T, AmqpError>;
}

/// Human-readable JSON encoding backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Encoder<T> for JsonCodec
where
    T: Serialize + ?Sized,
{
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }
}

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn decode(&self, bytes: &[u8]) -> Result<T, AmqpError> {
        serde_json::from_slice(bytes).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

/// Compact binary encoding backed by `bitcode`'s serde support.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl<T> Encoder<T> for BinaryCodec
where
    T: Serialize + ?Sized,
{
    fn content_type(&self) -> &'static str {
        BINARY_CONTENT_TYPE
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        bitcode::serialize(value).map_err(|err| AmqpError::EncodeError(err.to_string()))
    }
}

impl<T> Codec<T> for BinaryCodec
where
    T: Serialize + DeserializeOwned,
{
    fn decode(&self, bytes: &[u8]) -> Result<T, AmqpError> {
        bitcode::deserialize(bytes).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}
