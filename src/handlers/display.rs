//! `pause`/`resume` (display gate) and `format`/`hex` (formatter mode).

use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct PauseHandler;

#[async_trait]
impl Handler for PauseHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["pause"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, _ctx: &HandlerContext) -> HandlerResult {
        HandlerResult::pause(true)
    }

    fn description(&self) -> &'static str {
        "Suspends the interactive display; ingestion keeps flowing"
    }

    fn usage(&self) -> &'static str {
        "pause"
    }
}

pub struct ResumeHandler;

#[async_trait]
impl Handler for ResumeHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["resume"]
    }

    async fn handle(&self, _cmd: &ParsedCommand, _ctx: &HandlerContext) -> HandlerResult {
        HandlerResult::pause(false)
    }

    fn description(&self) -> &'static str {
        "Resumes a paused display"
    }

    fn usage(&self) -> &'static str {
        "resume"
    }
}

pub struct FormatHandler;

#[async_trait]
impl Handler for FormatHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["format"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        match cmd.first_arg() {
            Some("vertical") => {
                ctx.formatter.lock().await.set_vertical(true);
                HandlerResult::ok("switched to vertical output")
            }
            Some("horizontal") => {
                ctx.formatter.lock().await.set_vertical(false);
                HandlerResult::ok("switched to horizontal output")
            }
            _ => HandlerResult::failure("usage: format horizontal | vertical"),
        }
    }

    fn description(&self) -> &'static str {
        "Switches output mode"
    }

    fn usage(&self) -> &'static str {
        "format horizontal | vertical"
    }
}

pub struct HexHandler;

#[async_trait]
impl Handler for HexHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["hex"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        match cmd.first_arg() {
            Some("on") => {
                ctx.formatter.lock().await.set_hex(true);
                HandlerResult::ok("hex rendering on")
            }
            Some("off") => {
                ctx.formatter.lock().await.set_hex(false);
                HandlerResult::ok("hex rendering off")
            }
            _ => HandlerResult::failure("usage: hex on | off"),
        }
    }

    fn description(&self) -> &'static str {
        "Toggles hex payload rendering"
    }

    fn usage(&self) -> &'static str {
        "hex on | off"
    }
}
