// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Trace Context Propagation
//!
//! Carries OpenTelemetry context across the broker through message headers.
//! The publisher injects the caller's context and the consume loop extracts
//! it to parent the span of each processed delivery.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global::{self, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, TraceContextExt, Tracer},
    Context,
};
use std::collections::BTreeMap;
use tracing::error;

/// Writes propagation fields into an AMQP header table.
pub(crate) struct HeaderInjector<'a>(pub(crate) &'a mut BTreeMap<ShortString, AMQPValue>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Reads propagation fields from an AMQP header table. Only long-string
/// values are considered.
pub(crate) struct HeaderExtractor<'a>(pub(crate) &'a BTreeMap<ShortString, AMQPValue>);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AMQPValue::LongString(value)) => std::str::from_utf8(value.as_bytes())
                .map_err(|e| error!("Error decoding header value {:?}", e))
                .ok(),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|header| header.as_str()).collect()
    }
}

/// Header table carrying `ctx` for an outgoing message.
pub(crate) fn inject_context(ctx: &Context) -> BTreeMap<ShortString, AMQPValue> {
    let mut headers = BTreeMap::new();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeaderInjector(&mut headers))
    });

    headers
}

/// Starts a consumer span named `name`, parented on the context found in
/// `props`, and returns a context holding it.
pub(crate) fn new_span(props: &AMQPProperties, tracer: &BoxedTracer, name: &str) -> Context {
    let headers = props
        .headers()
        .as_ref()
        .map(|table| table.inner().clone())
        .unwrap_or_default();

    let parent = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(&headers))
    });

    let span = tracer
        .span_builder(name.to_owned())
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &parent);

    parent.with_span(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    #[test]
    fn injected_fields_can_be_extracted() {
        let mut headers = BTreeMap::new();
        HeaderInjector(&mut headers).set("TraceParent", "00-abc-def-01".to_owned());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }

    #[test]
    fn non_string_headers_are_ignored() {
        let mut headers = BTreeMap::new();
        headers.insert(ShortString::from("count"), AMQPValue::LongInt(3));
        headers.insert(
            ShortString::from("kind"),
            AMQPValue::LongString(LongString::from("pause")),
        );

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("count"), None);
        assert_eq!(extractor.get("kind"), Some("pause"));
        assert_eq!(extractor.get("missing"), None);
    }

    #[test]
    fn span_can_be_started_without_headers() {
        let tracer = global::tracer("amqp consumer");
        let ctx = new_span(&AMQPProperties::default(), &tracer, "pause.alice");
        ctx.span().end();
    }
}
