use async_trait::async_trait;

use crate::command::ParsedCommand;
use crate::step::StepChange;

use super::{Handler, HandlerContext, HandlerResult};

/// Handles both `next`/`n` (advance one message) and `step` (`on`/`off`).
pub struct StepHandler;

#[async_trait]
impl Handler for StepHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["next", "step"]
    }

    async fn handle(&self, cmd: &ParsedCommand, _ctx: &HandlerContext) -> HandlerResult {
        match cmd.command.as_str() {
            "next" => HandlerResult::step(StepChange::Advance),
            "step" => match cmd.first_arg() {
                Some("on") | None => HandlerResult::step(StepChange::Enable),
                Some("off") => HandlerResult::step(StepChange::Disable),
                Some(other) => HandlerResult::failure(format!("usage: step [on|off], got '{other}'")),
            },
            other => HandlerResult::failure(format!("unexpected command '{other}' for step handler")),
        }
    }

    fn description(&self) -> &'static str {
        "Step-through controls: advance one message, or toggle the gate"
    }

    fn usage(&self) -> &'static str {
        "next | step [on|off]"
    }
}
