// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Exchanges route published messages to the queues bound to them. Topic
//! exchanges match routing keys against wildcard patterns (`*` one segment,
//! `#` zero or more), direct exchanges require an exact key match and fanout
//! exchanges ignore the key entirely.

use lapin::options::ExchangeDeclareOptions;

/// The exchange types this crate declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        }
    }
}

/// Definition of an exchange, built with chained setters.
///
/// ```
/// use rabbitmq_pubsub::exchange::{ExchangeDefinition, ExchangeKind};
///
/// let def = ExchangeDefinition::new("peril_topic").topic().durable();
/// assert_eq!(def.kind, ExchangeKind::Topic);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
    pub delete: bool,
    pub internal: bool,
}

impl ExchangeDefinition {
    /// A non-durable direct exchange named `name`.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
            delete: false,
            internal: false,
        }
    }

    /// Sets the routing strategy.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Routes on an exact routing key match.
    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    /// Routes every message to all bound queues, ignoring the routing key.
    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    /// Routes on dotted routing key patterns (`*` and `#`).
    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Survive broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Delete the exchange once its last binding is removed.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Only reachable through exchange-to-exchange bindings.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub(crate) fn options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            passive: false,
            durable: self.durable,
            auto_delete: self.delete,
            internal: self.internal,
            nowait: false,
        }
    }
}
