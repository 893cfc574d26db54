use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct ExitHandler;

#[async_trait]
impl Handler for ExitHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["exit", "quit"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let total = ctx.stats.lock().await.total_messages();
        HandlerResult::exit(format!("shutting down — {total} messages seen"))
    }

    fn description(&self) -> &'static str {
        "Clean shutdown; prints a summary with total messages"
    }

    fn usage(&self) -> &'static str {
        "exit | quit"
    }
}
