//! Handler contract (§4.8) and the concrete command handlers (§4.9 CLI
//! surface table).
//!
//! Every command a `ParsedCommand` can name maps, through the
//! [`registry`], to a [`Handler`] impl. Handlers never share mutable state
//! except through [`HandlerContext`]; every decision they make is returned
//! as a [`HandlerResult`] for the shell core to apply atomically.

mod display;
mod exit;
mod filter;
mod help;
mod history;
mod log;
mod pubsub;
mod rule;
mod stats;
mod step;
mod visualize;

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::config::ShellConfig;
use crate::filter::FilterExpression;
use crate::format::MessageFormatter;
use crate::history::MessageHistory;
use crate::logger::LogSink;
use crate::rules::RuleEngine;
use crate::stats::StatisticsCollector;
use crate::step::{StepChange, StepState};
use crate::transport::SharedTransport;
use crate::command::ParsedCommand;

/// Everything a handler needs to act: references to the shared pipeline
/// state, never a global.
pub struct HandlerContext {
    pub output: Arc<Mutex<dyn Write + Send>>,
    pub transport: SharedTransport,
    pub filter: Arc<RwLock<FilterExpression>>,
    pub rules: Arc<RwLock<RuleEngine>>,
    pub formatter: Arc<Mutex<MessageFormatter>>,
    pub history: Arc<Mutex<MessageHistory>>,
    pub stats: Arc<Mutex<StatisticsCollector>>,
    pub logger: Arc<Mutex<Option<LogSink>>>,
    pub step: Arc<StepState>,
    pub config: Arc<ShellConfig>,
    pub paused: Arc<AtomicBool>,
}

impl HandlerContext {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub async fn write_line(&self, line: impl AsRef<str>) {
        let mut output = self.output.lock().await;
        let _ = writeln!(output, "{}", line.as_ref());
    }
}

/// At most one state change per result, per the handler contract.
#[derive(Clone, Debug, Default)]
pub struct HandlerResult {
    pub should_exit: bool,
    pub pause_state: Option<bool>,
    pub step_change: StepChange,
    pub success: bool,
    pub message: Option<String>,
}

impl HandlerResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn ok_silent() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn exit(summary: impl Into<String>) -> Self {
        Self {
            should_exit: true,
            success: true,
            message: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn pause(paused: bool) -> Self {
        Self {
            pause_state: Some(paused),
            success: true,
            ..Default::default()
        }
    }

    pub fn step(change: StepChange) -> Self {
        Self {
            step_change: change,
            success: true,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// The command words this handler claims, canonical name first. Alias
    /// expansion (`command::AliasTable`) already rewrites short forms
    /// before dispatch, but synonyms baked into the CLI surface itself
    /// (`exit`/`quit`) are listed here directly.
    fn commands(&self) -> &'static [&'static str];

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult;

    fn description(&self) -> &'static str;

    fn usage(&self) -> &'static str;
}

/// Builds the command-word → handler table. A table-driven dispatch by
/// string key, not per-command `match` arms — the same "lookup table of
/// behaviors keyed by a string" shape as the rule action registry.
pub fn registry() -> HashMap<&'static str, Arc<dyn Handler>> {
    let handlers: Vec<Arc<dyn Handler>> = vec![
        Arc::new(help::HelpHandler),
        Arc::new(exit::ExitHandler),
        Arc::new(display::PauseHandler),
        Arc::new(display::ResumeHandler),
        Arc::new(display::FormatHandler),
        Arc::new(display::HexHandler),
        Arc::new(filter::FilterHandler),
        Arc::new(stats::StatsHandler),
        Arc::new(stats::LatencyHandler),
        Arc::new(history::HistoryHandler),
        Arc::new(history::LastHandler),
        Arc::new(history::BookmarkHandler),
        Arc::new(history::ExportHandler),
        Arc::new(history::FieldsHandler),
        Arc::new(pubsub::PublishHandler),
        Arc::new(pubsub::SubscribeHandler),
        Arc::new(pubsub::UnsubscribeHandler),
        Arc::new(pubsub::PoolHandler),
        Arc::new(log::LogHandler),
        Arc::new(step::StepHandler),
        Arc::new(visualize::VisualizeHandler),
        Arc::new(rule::RuleHandler),
    ];

    let mut map = HashMap::new();
    for handler in handlers {
        for &name in handler.commands() {
            map.insert(name, handler.clone());
        }
    }
    map
}

/// Help text for every registered command, sorted for stable display.
pub fn help_entries() -> Vec<(&'static str, &'static str, &'static str)> {
    let handlers: Vec<Arc<dyn Handler>> = registry().into_values().collect();
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for handler in handlers {
        let primary = handler.commands()[0];
        if seen.insert(primary) {
            entries.push((primary, handler.description(), handler.usage()));
        }
    }
    entries.sort_by_key(|e| e.0);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_full_cli_surface() {
        let reg = registry();
        for name in [
            "help", "exit", "quit", "pause", "resume", "filter", "stats", "history", "last",
            "bookmark", "export", "publish", "subscribe", "unsubscribe", "format", "hex", "log",
            "latency", "next", "step", "visualize", "rule", "pool", "fields",
        ] {
            assert!(reg.contains_key(name), "missing handler for '{name}'");
        }
    }
}
