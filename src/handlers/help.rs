use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{help_entries, registry, Handler, HandlerContext, HandlerResult};

pub struct HelpHandler;

#[async_trait]
impl Handler for HelpHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["help"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        match cmd.first_arg() {
            Some(topic) => {
                let reg = registry();
                match reg.get(topic) {
                    Some(handler) => {
                        ctx.write_line(format!("{topic}: {}", handler.description())).await;
                        ctx.write_line(format!("usage: {}", handler.usage())).await;
                        HandlerResult::ok_silent()
                    }
                    None => HandlerResult::failure(format!(
                        "unknown command '{topic}' — run 'help' for a list"
                    )),
                }
            }
            None => {
                for (name, description, _) in help_entries() {
                    ctx.write_line(format!("{name:<12} {description}")).await;
                }
                HandlerResult::ok_silent()
            }
        }
    }

    fn description(&self) -> &'static str {
        "Lists available commands or prints one's usage"
    }

    fn usage(&self) -> &'static str {
        "help [command]"
    }
}
