// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! A queue is either durable (survives restarts, shared by consumers) or
//! transient (auto-deleted and exclusive to one connection). Every queue this
//! crate declares dead-letters its rejected messages to a dead-letter
//! exchange, `peril_dlx` unless configured otherwise.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use std::collections::BTreeMap;

/// Dead-letter exchange attached to every queue unless overridden.
pub const DEFAULT_DEAD_LETTER_EXCHANGE: &str = "peril_dlx";

/// Queue argument naming the dead-letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Lifetime policy of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueKind {
    /// Durable, not auto-deleted, not exclusive.
    #[default]
    Durable,
    /// Non-durable, auto-deleted, exclusive.
    Transient,
}

/// Definition of a queue: its name, lifetime policy and dead-letter target.
///
/// An empty name asks the broker to generate one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) kind: QueueKind,
    pub(crate) dead_letter_exchange: Option<String>,
}

impl QueueDefinition {
    /// A durable queue dead-lettering to [`DEFAULT_DEAD_LETTER_EXCHANGE`].
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            kind: QueueKind::Durable,
            dead_letter_exchange: Some(DEFAULT_DEAD_LETTER_EXCHANGE.to_owned()),
        }
    }

    /// Sets the lifetime class, which fixes the declare flags.
    pub fn kind(mut self, kind: QueueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Survives broker restarts and outlives its consumers.
    pub fn durable(self) -> Self {
        self.kind(QueueKind::Durable)
    }

    /// Exclusive to the declaring connection and deleted with it.
    pub fn transient(self) -> Self {
        self.kind(QueueKind::Transient)
    }

    /// Dead-letter rejected messages to `exchange` instead of the default.
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    /// Declare without a dead-letter exchange. Meant for the dead-letter
    /// queue itself.
    pub fn without_dead_letter(mut self) -> Self {
        self.dead_letter_exchange = None;
        self
    }

    /// Requested name. Empty for broker-named queues.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_kind(&self) -> QueueKind {
        self.kind
    }

    /// Declare flags derived from the queue kind.
    pub(crate) fn options(&self) -> QueueDeclareOptions {
        let durable = self.kind == QueueKind::Durable;

        QueueDeclareOptions {
            passive: false,
            durable,
            exclusive: !durable,
            auto_delete: !durable,
            nowait: false,
        }
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();

        if let Some(exchange) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(exchange.as_str())),
            );
        }

        FieldTable::from(args)
    }
}

/// Binds one queue to one exchange under one routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// A binding for `queue` with an empty exchange and routing key.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Source exchange of the binding.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}
