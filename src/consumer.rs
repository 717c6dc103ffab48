// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consume Loop
//!
//! Drives every delivery of one subscription to a terminal disposition:
//!
//! 1. Decode the payload with the subscription's codec. A payload that does
//!    not decode is rejected without requeue (dead-lettered) and the handler
//!    is never called, since it would fail the same way on every redelivery.
//! 2. Call the handler and map its [`AckDecision`] to a [`Disposition`].
//! 3. Apply the disposition. A failed ack/nack is logged and the loop moves
//!    on; the broker redelivers unsettled messages once the channel goes away.
//!
//! Deliveries of one subscription are handled strictly one at a time, in
//! arrival order.

use crate::{
    ack::{AckDecision, Disposition, Settle},
    codec::Codec,
    errors::AmqpError,
    handler::Handler,
    otel,
};
use futures_util::{Stream, StreamExt};
use lapin::{message::Delivery, protocol::basic::AMQPProperties};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Status, TraceContextExt},
};
use std::{pin::pin, sync::Arc};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// One inbound message together with the means to settle it.
pub(crate) struct InboundDelivery {
    pub(crate) delivery_tag: u64,
    pub(crate) redelivered: bool,
    pub(crate) properties: AMQPProperties,
    pub(crate) data: Vec<u8>,
    settler: Box<dyn Settle>,
}

impl InboundDelivery {
    pub(crate) fn new(delivery_tag: u64, data: Vec<u8>, settler: impl Settle + 'static) -> Self {
        InboundDelivery {
            delivery_tag,
            redelivered: false,
            properties: AMQPProperties::default(),
            data,
            settler: Box::new(settler),
        }
    }

    pub(crate) async fn settle(&self, disposition: Disposition) -> Result<(), AmqpError> {
        self.settler.settle(disposition).await
    }
}

impl From<Delivery> for InboundDelivery {
    fn from(delivery: Delivery) -> Self {
        let mut inbound = InboundDelivery::new(delivery.delivery_tag, delivery.data, delivery.acker);
        inbound.redelivered = delivery.redelivered;
        inbound.properties = delivery.properties;
        inbound
    }
}

/// Processes a single delivery and returns the disposition applied to it.
pub(crate) async fn process<T, C, H>(
    tracer: &BoxedTracer,
    queue: &str,
    delivery: &InboundDelivery,
    codec: &C,
    handler: &H,
) -> Disposition
where
    T: Send,
    C: Codec<T>,
    H: Handler<T> + ?Sized,
{
    let ctx = otel::new_span(&delivery.properties, tracer, queue);

    let disposition = match codec.decode(&delivery.data) {
        Ok(msg) => {
            let decision = handler.handle(&ctx, msg).await;
            debug!(
                queue,
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                ?decision,
                "message handled"
            );
            if decision != AckDecision::Ack {
                ctx.span().set_status(Status::error(format!("{decision:?}")));
            }
            Disposition::from(decision)
        }
        Err(err) => {
            warn!(
                error = err.to_string(),
                queue,
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                "discarding message that failed to decode"
            );
            ctx.span().record_error(&err);
            ctx.span().set_status(Status::error("decode failure"));
            Disposition::RejectDiscard
        }
    };

    if let Err(err) = delivery.settle(disposition).await {
        error!(
            error = err.to_string(),
            queue,
            delivery_tag = delivery.delivery_tag,
            ?disposition,
            "error to settle msg"
        );
        ctx.span().record_error(&err);
    }

    ctx.span().end();
    disposition
}

/// Pulls deliveries from `deliveries` until the stream ends or `stop` is
/// notified. The stop signal is only observed between deliveries.
pub(crate) async fn consume_loop<S, T, C, H>(
    queue: String,
    deliveries: S,
    codec: C,
    handler: Arc<H>,
    stop: Arc<Notify>,
) where
    S: Stream<Item = Result<InboundDelivery, AmqpError>>,
    T: Send,
    C: Codec<T>,
    H: Handler<T> + ?Sized,
{
    let tracer = global::tracer("amqp consumer");
    let mut deliveries = pin!(deliveries);

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.notified() => {
                debug!(queue = queue.as_str(), "subscription cancelled");
                break;
            }
            next = deliveries.next() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                process(&tracer, &queue, &delivery, &codec, handler.as_ref()).await;
            }
            Some(Err(err)) => {
                error!(error = err.to_string(), queue = queue.as_str(), "errors consume msg")
            }
            None => {
                debug!(queue = queue.as_str(), "delivery stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ack::MockSettle,
        codec::{BinaryCodec, Encoder, JsonCodec, JSON_CONTENT_TYPE},
    };
    use async_trait::async_trait;
    use futures_util::stream;
    use lapin::{acker::Acker, types::ShortString};
    use mockall::predicate::eq;
    use serde::{Deserialize, Serialize};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PlayingState {
        is_paused: bool,
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every disposition into a shared log.
    struct Recorder {
        tag: u64,
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl Settle for Recorder {
        async fn settle(&self, disposition: Disposition) -> Result<(), AmqpError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("settle:{}:{:?}", self.tag, disposition));
            if self.fail {
                return Err(AmqpError::DispositionError("channel closed".to_owned()));
            }
            Ok(())
        }
    }

    fn expecting(disposition: Disposition) -> MockSettle {
        let mut settler = MockSettle::new();
        settler
            .expect_settle()
            .with(eq(disposition))
            .times(1)
            .returning(|_| Ok(()));
        settler
    }

    fn json(state: &PlayingState) -> Vec<u8> {
        serde_json::to_vec(state).unwrap()
    }

    async fn run_once(decision: AckDecision) -> Disposition {
        let expected = Disposition::from(decision);
        let delivery = InboundDelivery::new(
            1,
            json(&PlayingState { is_paused: true }),
            expecting(expected),
        );
        let handler = move |_: PlayingState| async move { decision };

        process(
            &global::tracer("test"),
            "pause.test",
            &delivery,
            &JsonCodec,
            &handler,
        )
        .await
    }

    #[test]
    fn lapin_deliveries_keep_their_metadata() {
        let delivery = Delivery {
            delivery_tag: 9,
            exchange: ShortString::from("peril_direct"),
            routing_key: ShortString::from("pause"),
            redelivered: true,
            properties: AMQPProperties::default()
                .with_content_type(ShortString::from(JSON_CONTENT_TYPE)),
            data: b"{\"is_paused\":true}".to_vec(),
            acker: Acker::default(),
        };

        let inbound = InboundDelivery::from(delivery);
        assert_eq!(inbound.delivery_tag, 9);
        assert!(inbound.redelivered);
        assert_eq!(
            inbound.properties.content_type().as_ref().map(|ct| ct.as_str()),
            Some(JSON_CONTENT_TYPE)
        );
        assert_eq!(inbound.data, b"{\"is_paused\":true}".to_vec());
    }

    #[tokio::test]
    async fn ack_decision_acknowledges() {
        assert_eq!(run_once(AckDecision::Ack).await, Disposition::Acknowledge);
    }

    #[tokio::test]
    async fn nack_requeue_rejects_with_requeue() {
        assert_eq!(
            run_once(AckDecision::NackRequeue).await,
            Disposition::RejectRequeue
        );
    }

    #[tokio::test]
    async fn nack_discard_rejects_without_requeue() {
        assert_eq!(
            run_once(AckDecision::NackDiscard).await,
            Disposition::RejectDiscard
        );
    }

    #[tokio::test]
    async fn handler_receives_decoded_value() {
        let seen = Arc::new(Mutex::new(None));
        let handler = {
            let seen = seen.clone();
            move |state: PlayingState| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(state);
                    AckDecision::Ack
                }
            }
        };

        let payload = BinaryCodec.encode(&PlayingState { is_paused: true }).unwrap();
        let delivery = InboundDelivery::new(7, payload, expecting(Disposition::Acknowledge));

        process(
            &global::tracer("test"),
            "pause.test",
            &delivery,
            &BinaryCodec,
            &handler,
        )
        .await;

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(PlayingState { is_paused: true })
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded_without_calling_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = calls.clone();
            move |_: PlayingState| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { AckDecision::Ack }
            }
        };

        // the same bad payload twice gives the same outcome
        for tag in 1..=2 {
            let delivery = InboundDelivery::new(
                tag,
                b"{\"is_paused\":".to_vec(),
                expecting(Disposition::RejectDiscard),
            );
            let disposition = process(
                &global::tracer("test"),
                "pause.test",
                &delivery,
                &JsonCodec,
                &handler,
            )
            .await;
            assert_eq!(disposition, Disposition::RejectDiscard);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deliveries_are_settled_before_the_next_is_handled() {
        let log: Log = Arc::default();
        let deliveries: Vec<Result<InboundDelivery, AmqpError>> = (1..=3)
            .map(|tag| {
                Ok(InboundDelivery::new(
                    tag,
                    tag.to_string().into_bytes(),
                    Recorder {
                        tag,
                        log: log.clone(),
                        fail: false,
                    },
                ))
            })
            .collect();

        let handler = {
            let log = log.clone();
            move |tag: u64| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("handle:{tag}"));
                    tokio::task::yield_now().await;
                    AckDecision::Ack
                }
            }
        };

        consume_loop(
            "ordered".to_owned(),
            stream::iter(deliveries),
            JsonCodec,
            Arc::new(handler),
            Arc::new(Notify::new()),
        )
        .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "handle:1",
                "settle:1:Acknowledge",
                "handle:2",
                "settle:2:Acknowledge",
                "handle:3",
                "settle:3:Acknowledge",
            ]
        );
    }

    #[tokio::test]
    async fn settle_and_stream_failures_do_not_stop_the_loop() {
        let log: Log = Arc::default();
        let deliveries = vec![
            Ok(InboundDelivery::new(
                1,
                b"true".to_vec(),
                Recorder {
                    tag: 1,
                    log: log.clone(),
                    fail: true,
                },
            )),
            Err(AmqpError::ConsumerError("frame error".to_owned())),
            Ok(InboundDelivery::new(
                2,
                b"false".to_vec(),
                Recorder {
                    tag: 2,
                    log: log.clone(),
                    fail: false,
                },
            )),
        ];

        let handler = |paused: bool| async move {
            if paused {
                AckDecision::Ack
            } else {
                AckDecision::NackRequeue
            }
        };

        consume_loop(
            "resilient".to_owned(),
            stream::iter(deliveries),
            JsonCodec,
            Arc::new(handler),
            Arc::new(Notify::new()),
        )
        .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["settle:1:Acknowledge", "settle:2:RejectRequeue"]
        );
    }

    #[tokio::test]
    async fn stop_signal_ends_an_idle_loop() {
        let stop = Arc::new(Notify::new());
        let handler = |_: bool| async { AckDecision::Ack };

        let task = tokio::spawn(consume_loop(
            "idle".to_owned(),
            stream::pending::<Result<InboundDelivery, AmqpError>>(),
            JsonCodec,
            Arc::new(handler),
            stop.clone(),
        ));

        stop.notify_one();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
