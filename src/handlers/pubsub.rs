//! `publish`/`pub`, `subscribe`/`sub`, `unsubscribe`/`unsub`, `pool`.

use async_trait::async_trait;

use crate::command::ParsedCommand;
use crate::topic;
use crate::transport::QoS;

use super::{Handler, HandlerContext, HandlerResult};

fn parse_qos(cmd: &ParsedCommand) -> QoS {
    cmd.options
        .get("qos")
        .and_then(|v| v.as_deref())
        .and_then(|v| v.parse::<u8>().ok())
        .map(|v| match v {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        })
        .unwrap_or_default()
}

pub struct PublishHandler;

#[async_trait]
impl Handler for PublishHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["publish"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let (Some(topic_name), Some(payload)) = (cmd.args.first(), cmd.args.get(1)) else {
            return HandlerResult::failure("usage: publish <topic> <payload> [--qos=N]");
        };

        let qos = parse_qos(cmd);
        let retain = cmd.options.contains_key("retain");

        match ctx
            .transport
            .lock()
            .await
            .publish(topic_name, payload.as_bytes(), qos, retain)
            .await
        {
            Ok(()) => HandlerResult::ok(format!("published to '{topic_name}'")),
            Err(e) => HandlerResult::failure(format!("publish failed: {e}")),
        }
    }

    fn description(&self) -> &'static str {
        "Publishes a payload to a topic via the transport"
    }

    fn usage(&self) -> &'static str {
        "publish <topic> <payload> [--qos=N]"
    }
}

pub struct SubscribeHandler;

#[async_trait]
impl Handler for SubscribeHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["subscribe"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let Some(filter) = cmd.first_arg() else {
            return HandlerResult::failure("usage: subscribe <filter> [--qos=N]");
        };
        let stripped = topic::strip_shared_prefix(filter);
        let qos = parse_qos(cmd);

        match ctx.transport.lock().await.subscribe(stripped, qos).await {
            Ok(()) => HandlerResult::ok(format!("subscribed to '{filter}'")),
            Err(e) => HandlerResult::failure(format!("subscribe failed: {e}")),
        }
    }

    fn description(&self) -> &'static str {
        "Subscribes to an MQTT topic filter"
    }

    fn usage(&self) -> &'static str {
        "subscribe <filter> [--qos=N]"
    }
}

pub struct UnsubscribeHandler;

#[async_trait]
impl Handler for UnsubscribeHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["unsubscribe"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let Some(filter) = cmd.first_arg() else {
            return HandlerResult::failure("usage: unsubscribe <filter>");
        };
        let stripped = topic::strip_shared_prefix(filter);

        match ctx.transport.lock().await.unsubscribe(stripped).await {
            Ok(()) => HandlerResult::ok(format!("unsubscribed from '{filter}'")),
            Err(e) => HandlerResult::failure(format!("unsubscribe failed: {e}")),
        }
    }

    fn description(&self) -> &'static str {
        "Unsubscribes from an MQTT topic filter"
    }

    fn usage(&self) -> &'static str {
        "unsubscribe <filter>"
    }
}

/// The core's `Transport` contract has no connection-pool concept (§1: pool
/// management is explicitly out of scope — "connection pooling" is named as
/// an external-collaborator concern). This handler reports what the shell
/// itself can see: whether a transport is attached at all.
pub struct PoolHandler;

#[async_trait]
impl Handler for PoolHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["pool"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, _ctx: &HandlerContext) -> HandlerResult {
        HandlerResult::ok("pool: connection pooling is managed by the transport, not the shell core")
    }

    fn description(&self) -> &'static str {
        "Info about the transport connection pool, if exposed"
    }

    fn usage(&self) -> &'static str {
        "pool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_option_maps_to_the_right_variant() {
        let cmd = ParsedCommand {
            command: "publish".into(),
            args: vec!["a".into(), "b".into()],
            options: std::collections::HashMap::from([("qos".to_string(), Some("2".to_string()))]),
            raw: "publish a b --qos=2".into(),
        };
        assert_eq!(parse_qos(&cmd), QoS::ExactlyOnce);
    }

    #[test]
    fn missing_qos_option_defaults_to_at_most_once() {
        let cmd = ParsedCommand::default();
        assert_eq!(parse_qos(&cmd), QoS::AtMostOnce);
    }
}
