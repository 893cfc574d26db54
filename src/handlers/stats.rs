use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct StatsHandler;

#[async_trait]
impl Handler for StatsHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["stats"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let snapshot = ctx.stats.lock().await.snapshot();

        ctx.write_line(format!("total messages:  {}", snapshot.total_messages)).await;
        ctx.write_line(format!("dropped (overflow): {}", snapshot.dropped_overflow)).await;
        ctx.write_line(format!("rate:             {:.2} msg/s", snapshot.rate_per_second)).await;
        ctx.write_line("top topics:").await;
        for (topic, count) in &snapshot.top_topics {
            ctx.write_line(format!("  {topic:<40} {count}")).await;
        }

        HandlerResult::ok_silent()
    }

    fn description(&self) -> &'static str {
        "Prints current counters, rate, and top-N topics"
    }

    fn usage(&self) -> &'static str {
        "stats"
    }
}

pub struct LatencyHandler;

#[async_trait]
impl Handler for LatencyHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["latency"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let snapshot = ctx.stats.lock().await.snapshot();
        let latency = snapshot.latency;

        if latency.count == 0 {
            return HandlerResult::ok("latency: no samples yet");
        }

        ctx.write_line(format!("samples: {}", latency.count)).await;
        ctx.write_line(format!("min:     {:?}", latency.min.unwrap_or_default())).await;
        ctx.write_line(format!("max:     {:?}", latency.max.unwrap_or_default())).await;
        ctx.write_line(format!("avg:     {:?}", latency.avg.unwrap_or_default())).await;
        ctx.write_line(format!("p95:     {:?}", latency.p95.unwrap_or_default())).await;
        ctx.write_line(format!("p99:     {:?}", latency.p99.unwrap_or_default())).await;

        HandlerResult::ok_silent()
    }

    fn description(&self) -> &'static str {
        "Prints the latency distribution (min/max/avg/p95/p99)"
    }

    fn usage(&self) -> &'static str {
        "latency"
    }
}
