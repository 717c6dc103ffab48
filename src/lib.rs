// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Typed publish/subscribe on top of RabbitMQ.
//!
//! Applications declare subscriptions (exchange, queue, routing key, codec,
//! handler) and publish typed values; this crate owns queue topology,
//! dead-lettering, payload encoding and the mapping from a handler's
//! [`ack::AckDecision`] to the broker-level acknowledgment.

mod consumer;
mod otel;

pub mod ack;
pub mod channel;
pub mod codec;
pub mod configs;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod subscriber;
pub mod topology;
