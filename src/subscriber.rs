// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Subscriptions
//!
//! A subscription binds an exchange, a queue, a routing key, a codec and a
//! typed handler to one background consume loop. Each subscription gets its
//! own channel and its own tokio task. Subscriptions run independently of
//! each other and of any publishing the application does.
//!
//! ```no_run
//! # async fn run() -> Result<(), rabbitmq_pubsub::errors::AmqpError> {
//! use rabbitmq_pubsub::{
//!     ack::AckDecision,
//!     channel::new_amqp_connection,
//!     configs::Configs,
//!     queue::QueueDefinition,
//!     subscriber::{Subscriber, SubscriptionDefinition},
//! };
//!
//! let conn = new_amqp_connection(&Configs::from_env()?).await?;
//! let subscriber = Subscriber::new(conn);
//!
//! let def = SubscriptionDefinition::new(QueueDefinition::new("pause.alice").transient())
//!     .exchange("peril_direct")
//!     .routing_key("pause");
//!
//! let handle = subscriber
//!     .subscribe_json(&def, |paused: bool| async move {
//!         println!("paused: {paused}");
//!         AckDecision::Ack
//!     })
//!     .await?;
//! # handle.cancel().await
//! # }
//! ```

use crate::{
    codec::{BinaryCodec, Codec, JsonCodec},
    consumer::{consume_loop, InboundDelivery},
    errors::AmqpError,
    handler::Handler,
    queue::QueueDefinition,
    topology::declare_and_bind,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Connection,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, error};

/// Everything needed to declare and consume one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDefinition {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) queue: QueueDefinition,
    pub(crate) prefetch: Option<u16>,
}

impl SubscriptionDefinition {
    /// A subscription on `queue` bound to the default exchange with an empty
    /// routing key and no prefetch limit.
    pub fn new(queue: QueueDefinition) -> SubscriptionDefinition {
        SubscriptionDefinition {
            exchange: String::new(),
            routing_key: String::new(),
            queue,
            prefetch: None,
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_owned();
        self
    }

    /// Routing key or, on topic exchanges, a pattern such as `army_moves.*`.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Limits how many unacknowledged deliveries the broker pushes to this
    /// subscription's channel.
    pub fn prefetch(mut self, count: u16) -> Self {
        self.prefetch = Some(count);
        self
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle detaches the subscription, which keeps running until
/// its delivery stream closes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    queue: String,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Name of the consumed queue, as resolved by the broker.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether the consume loop has already ended, for instance because the
    /// channel was closed by the broker.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop after the delivery in progress, if any, is settled, and
    /// waits for the consumer to shut down.
    pub async fn cancel(self) -> Result<(), AmqpError> {
        self.stop.notify_one();
        self.join().await
    }

    /// Waits until the delivery stream closes.
    pub async fn join(self) -> Result<(), AmqpError> {
        self.task.await.map_err(|err| {
            error!(error = err.to_string(), "subscription task failed");
            AmqpError::InternalError
        })
    }

    /// Aborts the task immediately. A delivery being handled is left
    /// unsettled and will be redelivered by the broker.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Starts subscriptions on a shared connection.
#[derive(Clone)]
pub struct Subscriber {
    conn: Arc<Connection>,
}

impl Subscriber {
    pub fn new(conn: Arc<Connection>) -> Subscriber {
        Subscriber { conn }
    }

    /// Declares the subscription's topology on a fresh channel and spawns
    /// its consume loop.
    ///
    /// Topology and consumer errors are returned here. Errors on individual
    /// messages are only logged.
    ///
    /// # Parameters
    /// * `def` - Exchange, routing key, queue and prefetch of the subscription
    /// * `codec` - Decodes every delivery body into `T`
    /// * `handler` - Called once per decoded message, in arrival order
    ///
    /// # Returns
    /// A [`SubscriptionHandle`] for the running loop, or the declare error
    pub async fn subscribe<T, C, H>(
        &self,
        def: &SubscriptionDefinition,
        codec: C,
        handler: H,
    ) -> Result<SubscriptionHandle, AmqpError>
    where
        T: Send + 'static,
        C: Codec<T>,
        H: Handler<T> + 'static,
    {
        let (channel, queue) =
            declare_and_bind(&self.conn, &def.queue, &def.exchange, &def.routing_key).await?;

        if let Some(count) = def.prefetch {
            channel
                .basic_qos(count, BasicQosOptions { global: false })
                .await
                .map_err(|err| {
                    error!(error = err.to_string(), "failure to configure qos");
                    AmqpError::classify(&err, AmqpError::QoSDeclarationError(err.to_string()))
                })?;
        }

        let consumer = channel
            .basic_consume(
                &queue.name,
                "",
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to create the consumer");
                AmqpError::classify(&err, AmqpError::ConsumerDeclarationError(queue.name.clone()))
            })?;

        let consumer_tag = consumer.tag().to_string();
        debug!(
            queue = queue.name.as_str(),
            consumer = consumer_tag.as_str(),
            "consumer started"
        );

        let deliveries = consumer.map(|result| {
            result
                .map(InboundDelivery::from)
                .map_err(|err| AmqpError::ConsumerError(err.to_string()))
        });

        let stop = Arc::new(Notify::new());
        let task = tokio::spawn({
            let queue = queue.name.clone();
            let stop = stop.clone();
            let handler = Arc::new(handler);

            async move {
                consume_loop::<_, T, _, _>(queue.clone(), deliveries, codec, handler, stop).await;

                if let Err(err) = channel
                    .basic_cancel(&consumer_tag, BasicCancelOptions { nowait: false })
                    .await
                {
                    debug!(error = err.to_string(), queue = queue.as_str(), "consumer already gone");
                }
                if let Err(err) = channel.close(200, "subscription closed").await {
                    debug!(error = err.to_string(), queue = queue.as_str(), "channel already closed");
                }
            }
        });

        Ok(SubscriptionHandle {
            queue: queue.name,
            stop,
            task,
        })
    }

    /// [`Subscriber::subscribe`] with [`JsonCodec`].
    pub async fn subscribe_json<T, H>(
        &self,
        def: &SubscriptionDefinition,
        handler: H,
    ) -> Result<SubscriptionHandle, AmqpError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        H: Handler<T> + 'static,
    {
        self.subscribe(def, JsonCodec, handler).await
    }

    /// [`Subscriber::subscribe`] with [`BinaryCodec`].
    pub async fn subscribe_binary<T, H>(
        &self,
        def: &SubscriptionDefinition,
        handler: H,
    ) -> Result<SubscriptionHandle, AmqpError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        H: Handler<T> + 'static,
    {
        self.subscribe(def, BinaryCodec, handler).await
    }
}

/// Waits for every subscription to end, returning the first task failure.
pub async fn join_all(handles: Vec<SubscriptionHandle>) -> Result<(), AmqpError> {
    let results = futures_util::future::join_all(handles.into_iter().map(|h| h.join())).await;
    results.into_iter().collect()
}
