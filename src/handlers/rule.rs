//! `rule add <SQL> | list | enable/disable <name> | remove <name>`.

use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct RuleHandler;

#[async_trait]
impl Handler for RuleHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["rule"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        match cmd.first_arg() {
            Some("add") => self.add(cmd, ctx).await,
            Some("list") => self.list(ctx).await,
            Some("enable") => self.toggle(cmd, ctx, true).await,
            Some("disable") => self.toggle(cmd, ctx, false).await,
            Some("remove") => self.remove(cmd, ctx).await,
            _ => HandlerResult::failure(
                "usage: rule add <SQL> | list | enable <name> | disable <name> | remove <name>",
            ),
        }
    }

    fn description(&self) -> &'static str {
        "Manages rule-engine rules: add, list, enable/disable, remove"
    }

    fn usage(&self) -> &'static str {
        "rule add <SQL> | list | enable <name> | disable <name> | remove <name>"
    }
}

impl RuleHandler {
    async fn add(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        // `rule add my_rule SELECT * FROM 'a/b'` — first token after `add`
        // is the rule name, the remainder is the SQL text.
        let rest = cmd.rest();
        let Some(after_add) = rest.strip_prefix("add").map(str::trim_start) else {
            return HandlerResult::failure("usage: rule add <name> <SQL>");
        };
        let Some((name, sql)) = after_add.split_once(char::is_whitespace) else {
            return HandlerResult::failure("usage: rule add <name> <SQL>");
        };

        match ctx.rules.write().await.add(name, sql.trim()) {
            Ok(()) => HandlerResult::ok(format!("rule '{name}' added")),
            Err(e) => HandlerResult::failure(format!("error: {e}")),
        }
    }

    async fn list(&self, ctx: &HandlerContext) -> HandlerResult {
        let rules = ctx.rules.read().await;
        if rules.list().is_empty() {
            return HandlerResult::ok("no rules registered");
        }
        for rule in rules.list() {
            let state = if rule.enabled { "enabled" } else { "disabled" };
            ctx.write_line(format!("{:<20} [{state}] {}", rule.name, rule.sql))
                .await;
        }
        HandlerResult::ok_silent()
    }

    async fn toggle(&self, cmd: &ParsedCommand, ctx: &HandlerContext, enable: bool) -> HandlerResult {
        let Some(name) = cmd.args.get(1) else {
            return HandlerResult::failure("usage: rule enable|disable <name>");
        };
        let mut rules = ctx.rules.write().await;
        let result = if enable { rules.enable(name) } else { rules.disable(name) };
        match result {
            Ok(()) => HandlerResult::ok(format!(
                "rule '{name}' {}",
                if enable { "enabled" } else { "disabled" }
            )),
            Err(e) => HandlerResult::failure(format!("error: {e}")),
        }
    }

    async fn remove(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let Some(name) = cmd.args.get(1) else {
            return HandlerResult::failure("usage: rule remove <name>");
        };
        match ctx.rules.write().await.remove(name) {
            Ok(()) => HandlerResult::ok(format!("rule '{name}' removed")),
            Err(e) => HandlerResult::failure(format!("error: {e}")),
        }
    }
}
