// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledgment Policy
//!
//! Handlers classify the outcome of processing with an [`AckDecision`]. The
//! consume loop turns it into a broker [`Disposition`] and applies it through
//! [`Settle`]:
//!
//! | decision      | disposition     | broker operation           |
//! |---------------|-----------------|----------------------------|
//! | `Ack`         | `Acknowledge`   | `basic.ack`                |
//! | `NackRequeue` | `RejectRequeue` | `basic.nack requeue=true`  |
//! | `NackDiscard` | `RejectDiscard` | `basic.nack requeue=false` |
//!
//! A discarded message is routed to the queue's dead-letter exchange.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions},
};
#[cfg(test)]
use mockall::automock;

/// Outcome of handling one message, as classified by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckDecision {
    /// Processed; remove the message for good.
    Ack,
    /// Transient failure; put the message back on the queue.
    NackRequeue,
    /// Permanent failure; dead-letter the message.
    NackDiscard,
}

/// Terminal broker-side disposition of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Acknowledge,
    RejectRequeue,
    RejectDiscard,
}

impl Disposition {
    /// Whether the broker should redeliver the message.
    pub fn requeue(self) -> bool {
        self == Disposition::RejectRequeue
    }
}

impl From<AckDecision> for Disposition {
    fn from(decision: AckDecision) -> Disposition {
        match decision {
            AckDecision::Ack => Disposition::Acknowledge,
            AckDecision::NackRequeue => Disposition::RejectRequeue,
            AckDecision::NackDiscard => Disposition::RejectDiscard,
        }
    }
}

/// Applies a disposition to one specific delivery.
///
/// Implemented for lapin's [`Acker`]; the consume loop only ever talks to the
/// broker through this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Settle: Send + Sync {
    /// Sends the ack or nack for the delivery. Never affects other deliveries.
    ///
    /// # Returns
    /// Ok(()) once the frame is written, or [`AmqpError::DispositionError`]
    async fn settle(&self, disposition: Disposition) -> Result<(), AmqpError>;
}

#[async_trait]
impl Settle for Acker {
    async fn settle(&self, disposition: Disposition) -> Result<(), AmqpError> {
        let result = match disposition {
            Disposition::Acknowledge => self.ack(BasicAckOptions { multiple: false }).await,
            Disposition::RejectRequeue | Disposition::RejectDiscard => {
                self.nack(BasicNackOptions {
                    multiple: false,
                    requeue: disposition.requeue(),
                })
                .await
            }
        };

        result.map_err(|err| AmqpError::DispositionError(err.to_string()))
    }
}
