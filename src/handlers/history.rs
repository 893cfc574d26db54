//! `history`, `last`, `bookmark`/`expand`, `export`, and `fields`/`jsonpath`.

use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

pub struct HistoryHandler;

#[async_trait]
impl Handler for HistoryHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["history"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let limit = cmd
            .options
            .get("limit")
            .and_then(|v| v.as_deref())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(20);

        let formatter = ctx.formatter.lock().await.clone();
        let history = ctx.history.lock().await;
        let tail = history.last(limit);

        if tail.is_empty() {
            return HandlerResult::ok("history: empty");
        }

        for msg in tail.into_iter().rev() {
            ctx.write_line(formatter.format(msg)).await;
        }
        HandlerResult::ok_silent()
    }

    fn description(&self) -> &'static str {
        "Prints the history tail"
    }

    fn usage(&self) -> &'static str {
        "history [--limit=N]"
    }
}

pub struct LastHandler;

#[async_trait]
impl Handler for LastHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["last"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let n: usize = cmd
            .first_arg()
            .and_then(|a| a.parse().ok())
            .unwrap_or(10);

        let formatter = ctx.formatter.lock().await.clone();
        let history = ctx.history.lock().await;
        for msg in history.last(n) {
            ctx.write_line(formatter.format(msg)).await;
        }
        HandlerResult::ok_silent()
    }

    fn description(&self) -> &'static str {
        "Prints the last N messages"
    }

    fn usage(&self) -> &'static str {
        "last [N]"
    }
}

pub struct BookmarkHandler;

#[async_trait]
impl Handler for BookmarkHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["bookmark", "expand"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let Some(name) = cmd.first_arg() else {
            return HandlerResult::failure("usage: bookmark <name> [index]");
        };

        let mut history = ctx.history.lock().await;

        if let Some(index_arg) = cmd.args.get(1) {
            let Ok(index) = index_arg.parse::<u64>() else {
                return HandlerResult::failure(format!("invalid index '{index_arg}'"));
            };
            history.bookmark(name, index);
            return HandlerResult::ok(format!("bookmark '{name}' -> {index}"));
        }

        // No explicit index: name the current head (next_index - 1).
        let current = history.next_index().saturating_sub(1);
        history.bookmark(name, current);
        HandlerResult::ok(format!("bookmark '{name}' -> {current}"))
    }

    fn description(&self) -> &'static str {
        "Names an absolute index into history"
    }

    fn usage(&self) -> &'static str {
        "bookmark <name> [index]"
    }
}

pub struct ExportHandler;

#[async_trait]
impl Handler for ExportHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["export"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let (Some(format), Some(path)) = (cmd.args.first(), cmd.args.get(1)) else {
            return HandlerResult::failure("usage: export <format> <path>");
        };

        let history = ctx.history.lock().await;
        let formatter = ctx.formatter.lock().await;

        let rendered = match format.to_ascii_lowercase().as_str() {
            "json" => export_json(&history),
            "csv" => export_csv(&history),
            "text" => export_text(&history, &formatter),
            other => return HandlerResult::failure(format!("unknown export format '{other}'")),
        };

        match std::fs::write(path, rendered) {
            Ok(()) => HandlerResult::ok(format!("exported {} messages to {path}", history.len())),
            Err(e) => HandlerResult::failure(format!("could not write '{path}': {e}")),
        }
    }

    fn description(&self) -> &'static str {
        "Writes history to a file (JSON/CSV/text)"
    }

    fn usage(&self) -> &'static str {
        "export <json|csv|text> <path>"
    }
}

fn export_json(history: &crate::history::MessageHistory) -> String {
    let values: Vec<serde_json::Value> = history
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id(),
                "timestamp": m.timestamp().to_rfc3339(),
                "type": m.message_type().to_string(),
                "topic": m.topic(),
                "qos": m.qos(),
                "payload": m.body(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&values).unwrap_or_default()
}

fn export_csv(history: &crate::history::MessageHistory) -> String {
    let mut out = String::from("id,timestamp,type,topic,qos,payload\n");
    for msg in history.iter() {
        let body = msg.body().map(|v| v.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},\"{}\"\n",
            msg.id(),
            msg.timestamp().to_rfc3339(),
            msg.message_type(),
            msg.topic().unwrap_or(""),
            msg.qos().map(|q| q.to_string()).unwrap_or_default(),
            body.replace('"', "\"\"")
        ));
    }
    out
}

fn export_text(
    history: &crate::history::MessageHistory,
    formatter: &crate::format::MessageFormatter,
) -> String {
    history
        .iter()
        .map(|m| formatter.format_line(m))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct FieldsHandler;

#[async_trait]
impl Handler for FieldsHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["fields", "jsonpath"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        if cmd.args.is_empty() {
            ctx.formatter.lock().await.set_project_fields(Vec::new());
            return HandlerResult::ok("field projection cleared");
        }

        let fields: Vec<String> = cmd.args.iter().map(|s| s.trim_matches(',').to_string()).collect();
        ctx.formatter.lock().await.set_project_fields(fields.clone());
        HandlerResult::ok(format!("projecting fields: {}", fields.join(", ")))
    }

    fn description(&self) -> &'static str {
        "Projects specific payload fields on display"
    }

    fn usage(&self) -> &'static str {
        "fields <dotted.path> [dotted.path ...]"
    }
}
