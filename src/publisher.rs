// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Encodes typed values and sends them to an exchange under a routing key.
//! A publish is a single send with no retry and no publisher confirm, so
//! delivery is at-most-once from the publisher's side. Failures are returned
//! to the caller, who decides whether to retry, drop or escalate.

use crate::{
    channel::new_amqp_channel,
    codec::{BinaryCodec, Encoder, JsonCodec},
    errors::AmqpError,
    otel,
};
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel, Connection,
};
use opentelemetry::Context;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};
use uuid::Uuid;

/// Publishes over one dedicated channel.
#[derive(Clone)]
pub struct Publisher {
    channel: Arc<Channel>,
}

impl Publisher {
    /// Wraps an already opened channel. It should not be shared with a
    /// subscription.
    pub fn new(channel: Arc<Channel>) -> Publisher {
        Publisher { channel }
    }

    /// Opens a channel on `conn` reserved for this publisher.
    pub async fn open(conn: &Connection) -> Result<Publisher, AmqpError> {
        Ok(Publisher::new(Arc::new(new_amqp_channel(conn).await?)))
    }

    /// Encodes `value` with `codec` and sends it to `exchange` under `key`.
    ///
    /// The trace context in `ctx` travels in the message headers.
    ///
    /// # Parameters
    /// * `ctx` - Trace context to propagate
    /// * `exchange` - Target exchange
    /// * `key` - Routing key
    /// * `value` - The message to send
    /// * `codec` - Encoding, also sets the `content-type` property
    ///
    /// # Returns
    /// Ok(()) once the message is handed to the channel, [`AmqpError::EncodeError`]
    /// or [`AmqpError::PublishingError`] otherwise
    pub async fn publish<T, C>(
        &self,
        ctx: &Context,
        exchange: &str,
        key: &str,
        value: &T,
        codec: &C,
    ) -> Result<(), AmqpError>
    where
        T: ?Sized,
        C: Encoder<T>,
    {
        let payload = codec.encode(value).map_err(|err| {
            error!(error = err.to_string(), exchange, key, "error encoding message");
            err
        })?;

        let properties = message_properties(codec.content_type(), otel::inject_context(ctx));

        match self
            .channel
            .basic_publish(
                exchange,
                key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), exchange, key, "error publishing message");
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => {
                debug!(exchange, key, "message published");
                Ok(())
            }
        }
    }

    /// [`Publisher::publish`] with [`JsonCodec`].
    pub async fn publish_json<T>(
        &self,
        ctx: &Context,
        exchange: &str,
        key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + ?Sized,
    {
        self.publish(ctx, exchange, key, value, &JsonCodec).await
    }

    /// [`Publisher::publish`] with [`BinaryCodec`].
    pub async fn publish_binary<T>(
        &self,
        ctx: &Context,
        exchange: &str,
        key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + ?Sized,
    {
        self.publish(ctx, exchange, key, value, &BinaryCodec).await
    }
}

fn message_properties(
    content_type: &str,
    headers: BTreeMap<ShortString, AMQPValue>,
) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(content_type))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};
    use lapin::types::LongString;

    #[test]
    fn properties_carry_content_type_and_headers() {
        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-def-01")),
        );

        let props = message_properties(JSON_CONTENT_TYPE, headers);

        assert_eq!(
            props.content_type().as_ref().map(|ct| ct.as_str()),
            Some(JSON_CONTENT_TYPE)
        );
        assert!(props
            .headers()
            .as_ref()
            .unwrap()
            .inner()
            .contains_key("traceparent"));
    }

    #[test]
    fn every_message_gets_its_own_id() {
        let first = message_properties(BINARY_CONTENT_TYPE, BTreeMap::new());
        let second = message_properties(BINARY_CONTENT_TYPE, BTreeMap::new());

        let id = |props: &BasicProperties| props.message_id().as_ref().map(|id| id.to_string());
        assert!(id(&first).is_some());
        assert_ne!(id(&first), id(&second));
    }
}
