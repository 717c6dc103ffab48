// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! The application owns one long-lived [`Connection`] for its whole lifetime.
//! Every subscription and every publishing path derives its own [`Channel`]
//! from it, so a channel is never shared between concurrent tasks.

use crate::{configs::Configs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Opens the broker connection described by `cfg`.
///
/// # Example
/// ```no_run
/// # async fn run() -> Result<(), rabbitmq_pubsub::errors::AmqpError> {
/// use rabbitmq_pubsub::{channel::new_amqp_connection, configs::Configs};
///
/// let conn = new_amqp_connection(&Configs::from_env()?).await?;
/// # Ok(())
/// # }
/// ```
pub async fn new_amqp_connection(cfg: &Configs) -> Result<Arc<Connection>, AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    match Connection::connect_uri(cfg.amqp_uri(), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(Arc::new(conn))
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }
}

/// Opens a new channel on `conn`.
pub async fn new_amqp_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(channel) => {
            debug!(channel = channel.id(), "channel created");
            Ok(channel)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::classify(&err, AmqpError::ChannelError))
        }
    }
}
