use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct FilterHandler;

#[async_trait]
impl Handler for FilterHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["filter"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let rest = cmd.rest();

        if rest.trim().eq_ignore_ascii_case("clear") {
            ctx.filter.write().await.clear();
            return HandlerResult::ok("filter cleared");
        }

        if let Some(needle) = rest.trim().strip_prefix("grep ") {
            let expr = format!("grep '{needle}'");
            return self.set(ctx, &expr).await;
        }

        if rest.trim().is_empty() {
            let filter = ctx.filter.read().await;
            return if filter.is_empty() {
                HandlerResult::ok("filter: (none)")
            } else {
                HandlerResult::ok(format!("filter: {}", filter.source()))
            };
        }

        self.set(ctx, rest).await
    }

    fn description(&self) -> &'static str {
        "Sets or clears the live filter predicate"
    }

    fn usage(&self) -> &'static str {
        "filter <expr> | clear | grep <str>"
    }
}

impl FilterHandler {
    async fn set(&self, ctx: &HandlerContext, expr: &str) -> HandlerResult {
        match ctx.filter.write().await.set(expr) {
            Ok(()) => HandlerResult::ok(format!("filter set: {expr}")),
            Err(e) => HandlerResult::failure(format!("error: {e}")),
        }
    }
}
