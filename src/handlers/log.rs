use async_trait::async_trait;

use crate::command::ParsedCommand;
use crate::logger::LogSink;

use super::{Handler, HandlerContext, HandlerResult};

pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["log"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        match cmd.first_arg() {
            Some("start") => {
                let Some(path) = cmd.args.get(1) else {
                    return HandlerResult::failure("usage: log start <path>");
                };
                match LogSink::open(path) {
                    Ok(sink) => {
                        *ctx.logger.lock().await = Some(sink);
                        HandlerResult::ok(format!("logging to '{path}'"))
                    }
                    Err(e) => HandlerResult::failure(format!("could not start logging: {e}")),
                }
            }
            Some("stop") => {
                let mut logger = ctx.logger.lock().await;
                if logger.take().is_some() {
                    HandlerResult::ok("logging stopped")
                } else {
                    HandlerResult::ok("logging was not running")
                }
            }
            _ => HandlerResult::failure("usage: log start <path> | log stop"),
        }
    }

    fn description(&self) -> &'static str {
        "Controls file logging, independent of the display pause state"
    }

    fn usage(&self) -> &'static str {
        "log start <path> | log stop"
    }
}
