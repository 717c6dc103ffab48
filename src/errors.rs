// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Pub/Sub Layer
//!
//! `AmqpError` is the single error type returned by every fallible operation in
//! this crate. Transport and topology failures are returned to the caller that
//! initiated the operation, while decode and disposition failures are handled
//! inside the consume loop and only surface through logs.

use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use thiserror::Error;

/// Represents errors that can occur while declaring topology, publishing or
/// consuming messages.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The broker is unreachable or the connection is no longer usable
    #[error("failure to connect")]
    ConnectionError,

    /// A channel could not be opened on the connection
    #[error("failure to create a channel")]
    ChannelError,

    /// The queue already exists with incompatible parameters
    #[error("queue `{0}` already exists with different parameters")]
    TopologyConflict(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error starting a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    ConsumerDeclarationError(String),

    /// The delivery stream produced an error
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A value could not be encoded into a payload
    #[error("failure to encode payload `{0}`")]
    EncodeError(String),

    /// A payload could not be decoded into the expected type
    #[error("failure to decode payload `{0}`")]
    DecodeError(String),

    /// Transport failure while sending a message
    #[error("failure to publish `{0}`")]
    PublishingError(String),

    /// The ack or nack call for a delivery failed
    #[error("failure to settle message `{0}`")]
    DispositionError(String),

    /// Configuration could not be loaded
    #[error("invalid configuration `{0}`")]
    ConfigurationError(String),
}

impl AmqpError {
    /// Maps a lapin error to [`AmqpError::ConnectionError`] when the
    /// connection or channel is no longer usable, and to `fallback` otherwise.
    ///
    /// # Parameters
    /// * `err` - The error returned by lapin
    /// * `fallback` - The operation-specific error to report otherwise
    pub(crate) fn classify(err: &lapin::Error, fallback: AmqpError) -> AmqpError {
        if is_connection_failure(err) {
            AmqpError::ConnectionError
        } else {
            fallback
        }
    }

    /// Maps a lapin error raised while declaring `queue`.
    ///
    /// PRECONDITION_FAILED means the queue exists with other parameters; a
    /// broken connection or channel is reported as a connection error.
    pub(crate) fn from_queue_declare(err: &lapin::Error, queue: &str) -> AmqpError {
        match err {
            lapin::Error::ProtocolError(amqp)
                if matches!(
                    amqp.kind(),
                    AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
                ) =>
            {
                AmqpError::TopologyConflict(queue.to_owned())
            }
            _ => AmqpError::classify(err, AmqpError::DeclareQueueError(queue.to_owned())),
        }
    }
}

fn is_connection_failure(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::IOError(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::InvalidChannelState(_)
            | lapin::Error::MissingHeartbeatError
    )
}
