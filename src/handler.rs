// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! A handler receives a decoded message and returns an [`AckDecision`]. It
//! must not panic: failures are expressed as `NackRequeue` (retry later) or
//! `NackDiscard` (dead-letter). The consume loop waits for the handler before
//! taking the next delivery of the same subscription.

use crate::ack::AckDecision;
use async_trait::async_trait;
use opentelemetry::Context;
use std::future::Future;

#[async_trait]
pub trait Handler<T>: Send + Sync {
    /// Handles one message. `ctx` carries the trace context extracted from
    /// the message headers, for handlers that publish follow-up messages.
    async fn handle(&self, ctx: &Context, msg: T) -> AckDecision;
}

/// Any `Fn(T) -> impl Future<Output = AckDecision>` is a handler.
///
/// ```
/// use rabbitmq_pubsub::{ack::AckDecision, handler::Handler};
///
/// fn assert_handler<T, H: Handler<T>>(_: &H) {}
///
/// let handler = |paused: bool| async move {
///     if paused { AckDecision::Ack } else { AckDecision::NackDiscard }
/// };
/// assert_handler::<bool, _>(&handler);
/// ```
#[async_trait]
impl<T, F, Fut> Handler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    async fn handle(&self, _ctx: &Context, msg: T) -> AckDecision {
        (self)(msg).await
    }
}
