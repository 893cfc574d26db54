//! The pipeline driver: wires the transport reader, the rule/filter/display
//! pipeline, and the interactive command loop together (§5).
//!
//! Two run modes share the same dispatcher pass ([`dispatch_once`], which
//! gates on the step-through state before releasing a message into
//! [`dispatch_message`]): `run_concurrent` spawns a reader task and a
//! dispatcher task, connected by a bounded drop-oldest [`IngestQueue`];
//! `run_single_threaded` interleaves the same three steps — poll, dispatch,
//! read a line — on one task, for environments where spawning extra tasks
//! isn't available or wanted.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::command::{self, AliasTable};
use crate::config::ShellConfig;
use crate::filter::FilterExpression;
use crate::format::MessageFormatter;
use crate::handlers::{self, Handler, HandlerContext};
use crate::history::MessageHistory;
use crate::logger::LogSink;
use crate::message::Message;
use crate::rules::RuleEngine;
use crate::stats::StatisticsCollector;
use crate::step::StepState;
use crate::transport::{QoS, SharedTransport, TransportError};

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("could not connect to broker")]
    Connect(#[source] TransportError),
    #[error("input stream error")]
    Io(#[from] io::Error),
}

/// Bounded queue between the reader and the dispatcher. Full queue drops
/// the oldest entry rather than blocking the reader — the reader's job is
/// to keep draining the transport, never to apply backpressure upstream to
/// the broker. Popped only by [`dispatch_once`], which gates on the
/// step-through state *before* ever touching this queue (§4.11, S6) — held
/// messages simply accumulate here, and overflow, while the gate is closed.
struct IngestQueue {
    inner: StdMutex<VecDeque<Message>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl IngestQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: StdMutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, msg: Message) {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() == self.capacity {
            guard.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(msg);
    }

    fn try_pop(&self) -> Option<Message> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Drains and returns the overflow-drop count accumulated since the last
    /// call, for the dispatcher to fold into [`StatisticsCollector`].
    fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Shared pipeline state, cloned cheaply (every field is an `Arc`) so the
/// dispatcher can own a copy independent of [`Shell`] itself.
#[derive(Clone)]
struct PipelineState {
    transport: SharedTransport,
    filter: Arc<RwLock<FilterExpression>>,
    rules: Arc<RwLock<RuleEngine>>,
    formatter: Arc<Mutex<MessageFormatter>>,
    history: Arc<Mutex<MessageHistory>>,
    stats: Arc<Mutex<StatisticsCollector>>,
    logger: Arc<Mutex<Option<LogSink>>>,
    step: Arc<StepState>,
    paused: Arc<AtomicBool>,
    output: Arc<Mutex<dyn io::Write + Send>>,
    last_arrival: Arc<StdMutex<Option<DateTime<Utc>>>>,
}

/// One message through match → project → tag → retain → filter → render.
///
/// Rules run, and the message is appended to history, unconditionally —
/// history and the rule engine see every ingested message regardless of the
/// live filter. The filter only gates the display/log half of the pipeline
/// (S3, S5). Stats are recorded before any of that, so pausing or filtering
/// never shrinks the counters (S7).
///
/// The step-through gate is *not* consulted here: by the time a message
/// reaches this function it has already been released from the ingest
/// queue by [`dispatch_once`], so it always runs the full pipeline. Only
/// `paused` is checked at the display step — pause and step are
/// orthogonal, and pause must never hold a message back from stats,
/// history, or the log (S7).
async fn dispatch_message(state: &PipelineState, mut msg: Message) {
    let arrived_at = *msg.timestamp();

    {
        let mut stats = state.stats.lock().await;
        stats.record(msg.topic().unwrap_or("-"), arrived_at);

        let mut last = state.last_arrival.lock().unwrap();
        if let Some(previous) = *last {
            if let Ok(latency) = (arrived_at - previous).to_std() {
                stats.record_latency(latency);
            }
        }
        *last = Some(arrived_at);
    }

    state
        .rules
        .read()
        .await
        .process(&mut msg, state.transport.clone())
        .await;

    state.history.lock().await.append(msg.clone());

    if !state.filter.read().await.matches(&msg) {
        return;
    }

    let rendered = state.formatter.lock().await.format(&msg);

    {
        let mut logger = state.logger.lock().await;
        if let Some(sink) = logger.as_mut() {
            if let Err(e) = sink.write_line(&rendered) {
                warn!(error = %e, "failed to write to log file");
            }
        }
    }

    if state.paused.load(Ordering::Acquire) {
        return;
    }

    let mut output = state.output.lock().await;
    let _ = writeln!(output, "{rendered}");
}

/// Drains the transport into the ingest queue until cancelled. Backs off
/// briefly on a transport error instead of spinning.
///
/// Each poll is itself short-timeout-wrapped (not just select!'d against
/// cancellation): `poll` holds the transport lock for as long as it runs,
/// and the broker can go quiet for whole seconds between events, so an
/// un-timed-out poll would starve command handlers and rule actions that
/// need the same lock to publish. Releasing and re-acquiring the lock every
/// 200ms keeps it available to the rest of the shell between broker events.
async fn reader_task(transport: SharedTransport, queue: Arc<IngestQueue>, cancel: CancellationToken) {
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => return,
            polled = tokio::time::timeout(Duration::from_millis(200), async {
                transport.lock().await.poll().await
            }) => polled,
        };

        match polled {
            Ok(Ok(Some(incoming))) => queue.push(Message::from_incoming(incoming, "broker")),
            Ok(Ok(None)) | Err(_) => {}
            Ok(Err(e)) => {
                error!(error = %e, "transport poll failed, backing off");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }
}

/// One dispatcher pass: folds any overflow-drop count into stats, then —
/// unless the step-through gate currently disallows it (§4.11: stepping
/// enabled, no advance pending) — pops and runs the next queued message
/// through the full pipeline. Returns whether a message was dispatched.
///
/// The gate is checked *before* the queue is ever touched, not at the
/// display step: while it is closed, fed messages simply accumulate (and
/// drop-oldest-overflow) in [`IngestQueue`] exactly as §5/§4.11 require
/// (S6) — the dispatcher never drains ahead of the gate, records their
/// stats early, or appends them to history before they are released.
async fn dispatch_once(state: &PipelineState, queue: &IngestQueue) -> bool {
    let dropped = queue.take_dropped();
    if dropped > 0 {
        let mut stats = state.stats.lock().await;
        for _ in 0..dropped {
            stats.record_overflow_drop();
        }
    }

    if !state.step.may_render() {
        return false;
    }

    match queue.try_pop() {
        Some(msg) => {
            dispatch_message(state, msg).await;
            true
        }
        None => false,
    }
}

/// Drives [`dispatch_once`] until cancelled. Backs off briefly whenever a
/// pass dispatches nothing — either the queue is empty or the step gate is
/// closed — so a closed gate doesn't spin the task.
async fn dispatch_task(state: PipelineState, queue: Arc<IngestQueue>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        if dispatch_once(&state, &queue).await {
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}

/// Owns every piece of shared state and drives the shell's main loop.
pub struct Shell {
    transport: SharedTransport,
    filter: Arc<RwLock<FilterExpression>>,
    rules: Arc<RwLock<RuleEngine>>,
    formatter: Arc<Mutex<MessageFormatter>>,
    history: Arc<Mutex<MessageHistory>>,
    stats: Arc<Mutex<StatisticsCollector>>,
    logger: Arc<Mutex<Option<LogSink>>>,
    step: Arc<StepState>,
    paused: Arc<AtomicBool>,
    output: Arc<Mutex<dyn io::Write + Send>>,
    aliases: AliasTable,
    config: Arc<ShellConfig>,
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
    last_arrival: Arc<StdMutex<Option<DateTime<Utc>>>>,
}

impl Shell {
    pub fn new(config: ShellConfig, transport: SharedTransport, output: Arc<Mutex<dyn io::Write + Send>>) -> Self {
        let aliases = AliasTable::new(config.aliases().clone());
        let history = MessageHistory::new(*config.message_history_limit());
        let stats = StatisticsCollector::new(
            *config.rate_window_seconds(),
            *config.latency_window_size(),
            *config.topic_truncation_threshold(),
            *config.top_topics_limit(),
        );

        Self {
            transport,
            filter: Arc::new(RwLock::new(FilterExpression::default())),
            rules: Arc::new(RwLock::new(RuleEngine::new())),
            formatter: Arc::new(Mutex::new(MessageFormatter::default())),
            history: Arc::new(Mutex::new(history)),
            stats: Arc::new(Mutex::new(stats)),
            logger: Arc::new(Mutex::new(None)),
            step: Arc::new(StepState::default()),
            paused: Arc::new(AtomicBool::new(false)),
            output,
            aliases,
            config: Arc::new(config),
            handlers: handlers::registry(),
            last_arrival: Arc::new(StdMutex::new(None)),
        }
    }

    /// Connects, subscribes to the configured topics, runs the pipeline and
    /// the command loop to completion, then disconnects. Returns the
    /// process exit code.
    pub async fn run<R>(&mut self, input: R) -> Result<i32, ShellError>
    where
        R: AsyncBufRead + Unpin,
    {
        {
            let mut transport = self.transport.lock().await;
            transport.connect().await.map_err(ShellError::Connect)?;
            transport.start_streaming().await.map_err(ShellError::Connect)?;
            for topic in self.config.initial_subscriptions().clone() {
                transport
                    .subscribe(&topic, QoS::AtMostOnce)
                    .await
                    .map_err(ShellError::Connect)?;
            }
        }

        let mut lines = input.lines();
        let exit_code = if *self.config.single_threaded() {
            self.run_single_threaded(&mut lines).await?
        } else {
            self.run_concurrent(&mut lines).await?
        };

        {
            let mut transport = self.transport.lock().await;
            let _ = transport.stop_streaming().await;
            let _ = transport.disconnect().await;
        }

        let snapshot = self.stats.lock().await.snapshot();
        self.print_line(format!(
            "shutting down: {} messages processed, {} dropped for backpressure",
            snapshot.total_messages, snapshot.dropped_overflow
        ))
        .await;

        Ok(exit_code)
    }

    async fn run_concurrent<R>(&mut self, lines: &mut Lines<R>) -> Result<i32, ShellError>
    where
        R: AsyncBufRead + Unpin,
    {
        let cancel = CancellationToken::new();
        let queue = Arc::new(IngestQueue::new(*self.config.channel_buffer_size()));
        let state = self.pipeline_state();

        let reader = tokio::spawn(reader_task(self.transport.clone(), queue.clone(), cancel.clone()));
        let dispatcher = tokio::spawn(dispatch_task(state, queue, cancel.clone()));

        let exit_code = self.input_loop(lines).await;

        cancel.cancel();
        let _ = reader.await;
        let _ = dispatcher.await;

        exit_code
    }

    /// Fallback mode: one task interleaves a short-timeout transport poll,
    /// draining whatever landed in the ingest queue, and a short-timeout
    /// line read. No backpressure is even possible here since nothing ever
    /// queues up faster than this loop drains it, but the same queue is
    /// still used so the pipeline code path is identical to the concurrent
    /// mode.
    async fn run_single_threaded<R>(&mut self, lines: &mut Lines<R>) -> Result<i32, ShellError>
    where
        R: AsyncBufRead + Unpin,
    {
        let queue = IngestQueue::new(*self.config.channel_buffer_size());
        let state = self.pipeline_state();
        let mut prompt_shown = false;

        loop {
            let polled = tokio::time::timeout(Duration::from_millis(20), async {
                self.transport.lock().await.poll().await
            })
            .await;

            match polled {
                Ok(Ok(Some(incoming))) => queue.push(Message::from_incoming(incoming, "broker")),
                Ok(Ok(None)) | Err(_) => {}
                Ok(Err(e)) => error!(error = %e, "transport poll failed"),
            }

            while dispatch_once(&state, &queue).await {}

            if !prompt_shown {
                self.print_prompt().await;
                prompt_shown = true;
            }

            match tokio::time::timeout(Duration::from_millis(20), lines.next_line()).await {
                Ok(Ok(None)) => return Ok(0),
                Ok(Ok(Some(line))) => {
                    prompt_shown = false;
                    if let Some(code) = self.handle_input_line(&line).await {
                        return Ok(code);
                    }
                }
                Ok(Err(e)) => return Err(ShellError::Io(e)),
                Err(_) => {}
            }
        }
    }

    async fn input_loop<R>(&mut self, lines: &mut Lines<R>) -> Result<i32, ShellError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.print_prompt().await;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(0),
                line = lines.next_line() => match line? {
                    None => return Ok(0),
                    Some(line) => {
                        if let Some(code) = self.handle_input_line(&line).await {
                            return Ok(code);
                        }
                    }
                },
            }
        }
    }

    async fn print_prompt(&self) {
        let mut output = self.output.lock().await;
        let _ = write!(output, "{}", self.config.prompt());
        let _ = output.flush();
    }

    /// Applies one parsed command, returning `Some(exit_code)` if the shell
    /// should stop. At most one state change per [`crate::handlers::HandlerResult`]
    /// is applied, per the handler contract.
    async fn handle_input_line(&mut self, line: &str) -> Option<i32> {
        let parsed = command::parse_line(line, &self.aliases)?;

        let Some(handler) = self.handlers.get(parsed.command.as_str()).cloned() else {
            self.print_line(format!("error: unknown command '{}'", parsed.command)).await;
            return None;
        };

        let ctx = self.handler_context();
        let result = handler.handle(&parsed, &ctx).await;

        if let Some(paused) = result.pause_state {
            self.paused.store(paused, Ordering::Release);
        }
        self.step.apply(result.step_change);

        if let Some(message) = &result.message {
            let prefix = if result.success { "" } else { "error: " };
            self.print_line(format!("{prefix}{message}")).await;
        }

        result.should_exit.then_some(0)
    }

    fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            output: self.output.clone(),
            transport: self.transport.clone(),
            filter: self.filter.clone(),
            rules: self.rules.clone(),
            formatter: self.formatter.clone(),
            history: self.history.clone(),
            stats: self.stats.clone(),
            logger: self.logger.clone(),
            step: self.step.clone(),
            config: self.config.clone(),
            paused: self.paused.clone(),
        }
    }

    fn pipeline_state(&self) -> PipelineState {
        PipelineState {
            transport: self.transport.clone(),
            filter: self.filter.clone(),
            rules: self.rules.clone(),
            formatter: self.formatter.clone(),
            history: self.history.clone(),
            stats: self.stats.clone(),
            logger: self.logger.clone(),
            step: self.step.clone(),
            paused: self.paused.clone(),
            output: self.output.clone(),
            last_arrival: self.last_arrival.clone(),
        }
    }

    async fn print_line(&self, line: impl AsRef<str>) {
        let mut output = self.output.lock().await;
        let _ = writeln!(output, "{}", line.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::message::MessageType;
    use crate::transport::demo::DemoTransport;

    fn msg(topic: &str) -> Message {
        Message::new(MessageType::Data, json!({"topic": topic}), "broker")
    }

    #[test]
    fn ingest_queue_drops_the_oldest_entry_past_capacity() {
        let queue = IngestQueue::new(4);
        for i in 0..10 {
            queue.push(msg(&format!("t/{i}")));
        }

        let mut remaining = Vec::new();
        while let Some(m) = queue.try_pop() {
            remaining.push(m.topic().unwrap().to_string());
        }

        assert_eq!(remaining, vec!["t/6", "t/7", "t/8", "t/9"]);
        assert_eq!(queue.take_dropped(), 6);
    }

    struct CapturingSink(Arc<StdMutex<Vec<u8>>>);

    impl io::Write for CapturingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_state() -> (PipelineState, Arc<StdMutex<Vec<u8>>>) {
        let (transport, _injector) = DemoTransport::new();
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let output: Arc<Mutex<dyn io::Write + Send>> =
            Arc::new(Mutex::new(CapturingSink(captured.clone())));

        let state = PipelineState {
            transport: Arc::new(Mutex::new(transport)),
            filter: Arc::new(RwLock::new(FilterExpression::default())),
            rules: Arc::new(RwLock::new(RuleEngine::new())),
            formatter: Arc::new(Mutex::new(MessageFormatter::default())),
            history: Arc::new(Mutex::new(MessageHistory::new(1000))),
            stats: Arc::new(Mutex::new(StatisticsCollector::new(10, 100, 128, 10))),
            logger: Arc::new(Mutex::new(None)),
            step: Arc::new(StepState::default()),
            paused: Arc::new(AtomicBool::new(false)),
            output,
            last_arrival: Arc::new(StdMutex::new(None)),
        };
        (state, captured)
    }

    #[tokio::test]
    async fn pause_does_not_lose_stats_but_does_suppress_display() {
        // S7: pausing stops the live display, never the counters.
        let (state, captured) = test_state();
        state.paused.store(true, Ordering::Release);

        for i in 0..100 {
            dispatch_message(&state, msg(&format!("sensors/{i}"))).await;
        }

        assert_eq!(state.stats.lock().await.snapshot().total_messages, 100);
        assert!(captured.lock().unwrap().is_empty());

        state.paused.store(false, Ordering::Release);
        dispatch_message(&state, msg("sensors/resumed")).await;

        assert_eq!(state.stats.lock().await.snapshot().total_messages, 101);
        let rendered = String::from_utf8(captured.lock().unwrap().clone()).unwrap();
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("sensors/resumed"));
    }

    #[tokio::test]
    async fn a_filtered_out_message_still_updates_history_and_stats() {
        let (state, captured) = test_state();
        state.filter.write().await.set("topic = 'other/#'").unwrap();

        dispatch_message(&state, msg("sensors/a")).await;

        assert_eq!(state.stats.lock().await.snapshot().total_messages, 1);
        assert_eq!(state.history.lock().await.len(), 1);
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn s6_step_gate_blocks_dequeue_and_preserves_drop_oldest_overflow() {
        // S6: with stepping enabled and no advance pending, the dispatcher
        // must suspend before it ever touches the queue — messages stay
        // buffered in IngestQueue (and overflow per drop-oldest) rather than
        // being dequeued and processed ahead of the gate.
        let (state, captured) = test_state();
        let queue = IngestQueue::new(4);
        state.step.enable();

        for i in 0..10 {
            queue.push(msg(&format!("sensors/{i}")));
        }

        for _ in 0..3 {
            assert!(!dispatch_once(&state, &queue).await);
        }

        assert_eq!(state.stats.lock().await.snapshot().dropped_overflow, 6);
        assert_eq!(state.history.lock().await.len(), 0);
        assert!(captured.lock().unwrap().is_empty());

        for _ in 0..4 {
            state.step.advance();
            assert!(dispatch_once(&state, &queue).await);
        }

        assert_eq!(state.history.lock().await.len(), 4);
        let rendered = String::from_utf8(captured.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("sensors/6"));
        assert!(lines[1].contains("sensors/7"));
        assert!(lines[2].contains("sensors/8"));
        assert!(lines[3].contains("sensors/9"));
    }

    fn test_shell() -> (Shell, Arc<StdMutex<Vec<u8>>>, mpsc::UnboundedSender<crate::transport::IncomingPublish>) {
        let (transport, injector) = DemoTransport::new();
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let output: Arc<Mutex<dyn io::Write + Send>> =
            Arc::new(Mutex::new(CapturingSink(captured.clone())));
        let config = ShellConfig::default().with_single_threaded(true);
        let shell = Shell::new(config, Arc::new(Mutex::new(transport)), output);
        (shell, captured, injector)
    }

    #[tokio::test]
    async fn single_threaded_run_exits_on_the_exit_command() {
        let (mut shell, _captured, _injector) = test_shell();
        let input = tokio::io::BufReader::new("exit\n".as_bytes());

        let code = shell.run(input).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn concurrent_run_exits_on_the_exit_command() {
        let (transport, _injector) = DemoTransport::new();
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let output: Arc<Mutex<dyn io::Write + Send>> =
            Arc::new(Mutex::new(CapturingSink(captured)));
        let mut shell = Shell::new(ShellConfig::default(), Arc::new(Mutex::new(transport)), output);
        let input = tokio::io::BufReader::new("exit\n".as_bytes());

        let code = shell.run(input).await.unwrap();
        assert_eq!(code, 0);
    }
}
