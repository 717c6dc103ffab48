// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Declares exchanges, queues and the bindings between them.
//!
//! - [`declare_and_bind`]: opens a channel, declares one queue and binds it to
//!   an exchange. Every subscription goes through it.
//! - [`Topology`] / [`AmqpTopology`]: collects definitions and installs them in
//!   one go, typically once at startup for exchanges and the dead-letter setup.
//!
//! Declarations are idempotent on the broker side. Nothing here retries; the
//! caller decides what to do with a failure.

use crate::{
    channel::new_amqp_channel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{options::QueueBindOptions, types::FieldTable, Channel, Connection};
use tracing::{debug, error};

/// A queue as the broker reports it after declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    /// Resolved name, broker-generated when the definition's name was empty.
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Opens a channel on `conn`, declares `def` and binds it to `exchange`
/// under `routing_key`.
///
/// Returns the channel so the caller can consume or publish on it, together
/// with the declared queue.
pub async fn declare_and_bind(
    conn: &Connection,
    def: &QueueDefinition,
    exchange: &str,
    routing_key: &str,
) -> Result<(Channel, DeclaredQueue), AmqpError> {
    let channel = new_amqp_channel(conn).await?;
    let queue = declare_queue(&channel, def).await?;

    bind_queue(
        &channel,
        &QueueBinding::new(&queue.name)
            .exchange(exchange)
            .routing_key(routing_key),
    )
    .await?;

    Ok((channel, queue))
}

/// Declares `def` on `channel`.
///
/// Fails with [`AmqpError::TopologyConflict`] when the queue already exists
/// with other parameters. The broker closes the channel in that case.
pub async fn declare_queue(
    channel: &Channel,
    def: &QueueDefinition,
) -> Result<DeclaredQueue, AmqpError> {
    debug!(queue = def.name.as_str(), kind = ?def.kind, "declaring queue");

    match channel
        .queue_declare(&def.name, def.options(), def.arguments())
        .await
    {
        Ok(queue) => {
            debug!(queue = queue.name().as_str(), "queue declared");
            Ok(DeclaredQueue {
                name: queue.name().to_string(),
                message_count: queue.message_count(),
                consumer_count: queue.consumer_count(),
            })
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                queue = def.name.as_str(),
                "error to declare the queue"
            );
            Err(AmqpError::from_queue_declare(&err, &def.name))
        }
    }
}

/// Binds a queue to an exchange. Identical bindings are no-ops.
pub async fn bind_queue(channel: &Channel, binding: &QueueBinding) -> Result<(), AmqpError> {
    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        binding.queue_name, binding.exchange_name, binding.routing_key
    );

    channel
        .queue_bind(
            &binding.queue_name,
            &binding.exchange_name,
            &binding.routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error to bind queue to exchange");
            AmqpError::classify(
                &err,
                AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ),
            )
        })
}

/// Declares `def` on `channel`. Redeclaring with the same parameters is a
/// no-op.
pub async fn declare_exchange(
    channel: &Channel,
    def: &ExchangeDefinition,
) -> Result<(), AmqpError> {
    debug!("creating exchange: {}", def.name);

    channel
        .exchange_declare(
            &def.name,
            def.kind.into(),
            def.options(),
            FieldTable::default(),
        )
        .await
        .map_err(|err| {
            error!(
                error = err.to_string(),
                name = def.name.as_str(),
                "error to declare the exchange"
            );
            AmqpError::classify(&err, AmqpError::DeclareExchangeError(def.name.clone()))
        })?;

    debug!("exchange: {} was created", def.name);
    Ok(())
}

/// A set of exchanges, queues and bindings to install together.
#[async_trait]
pub trait Topology {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: QueueBinding) -> Self;

    /// Declares exchanges, then queues, then bindings.
    async fn install(&self, channel: &Channel) -> Result<(), AmqpError>;
}

/// [`Topology`] collected in memory and installed in one pass.
#[derive(Debug, Clone, Default)]
pub struct AmqpTopology {
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
}

impl AmqpTopology {
    pub fn new() -> AmqpTopology {
        AmqpTopology::default()
    }

    /// Registers the dead-letter setup: a durable fanout `exchange` and a
    /// durable `queue` bound to it. The queue itself has no dead-letter target.
    pub fn dead_letter(self, exchange: &str, queue: &str) -> Self {
        self.exchange(ExchangeDefinition::new(exchange).fanout().durable())
            .queue(QueueDefinition::new(queue).durable().without_dead_letter())
            .queue_binding(QueueBinding::new(queue).exchange(exchange))
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    async fn install(&self, channel: &Channel) -> Result<(), AmqpError> {
        for exchange in &self.exchanges {
            declare_exchange(channel, exchange).await?;
        }

        for queue in &self.queues {
            declare_queue(channel, queue).await?;
        }

        for binding in &self.queues_binding {
            bind_queue(channel, binding).await?;
        }

        debug!("topology installed");
        Ok(())
    }
}
