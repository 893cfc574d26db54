//! `visualize`/`viz tree|flow` — renders a topic tree or a flow timeline of
//! retained (history) messages. Read-only: never mutates history or stats.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::command::ParsedCommand;

use super::{Handler, HandlerContext, HandlerResult};

#[derive(Default)]
struct TopicTreeNode {
    count: u64,
    children: BTreeMap<String, TopicTreeNode>,
}

fn insert_topic(root: &mut TopicTreeNode, topic: &str) {
    let mut node = root;
    node.count += 1;
    for segment in topic.split('/') {
        node = node.children.entry(segment.to_string()).or_default();
        node.count += 1;
    }
}

fn render_tree(node: &TopicTreeNode, name: &str, depth: usize, out: &mut String) {
    if depth > 0 {
        out.push_str(&"  ".repeat(depth - 1));
        out.push_str(&format!("└─ {name} ({})\n", node.count));
    }
    for (child_name, child) in &node.children {
        render_tree(child, child_name, depth + 1, out);
    }
}

pub struct VisualizeHandler;

#[async_trait]
impl Handler for VisualizeHandler {
    fn commands(&self) -> &'static [&'static str] {
        &["visualize"]
    }

    async fn handle(&self, cmd: &ParsedCommand, ctx: &HandlerContext) -> HandlerResult {
        let history = ctx.history.lock().await;

        match cmd.first_arg() {
            Some("tree") | None => {
                let mut root = TopicTreeNode::default();
                for msg in history.iter() {
                    if let Some(topic) = msg.topic() {
                        insert_topic(&mut root, topic);
                    }
                }
                let mut out = String::new();
                render_tree(&root, "", 0, &mut out);
                if out.is_empty() {
                    HandlerResult::ok("visualize tree: no retained messages")
                } else {
                    ctx.write_line(out.trim_end()).await;
                    HandlerResult::ok_silent()
                }
            }
            Some("flow") => {
                if history.is_empty() {
                    return HandlerResult::ok("visualize flow: no retained messages");
                }
                for msg in history.iter() {
                    ctx.write_line(format!(
                        "{} {} -> {}",
                        msg.timestamp().format("%H:%M:%S%.3f"),
                        msg.source(),
                        msg.topic().unwrap_or("-")
                    ))
                    .await;
                }
                HandlerResult::ok_silent()
            }
            Some(other) => HandlerResult::failure(format!("unknown visualize mode '{other}'")),
        }
    }

    fn description(&self) -> &'static str {
        "Renders a topic tree or a flow timeline of retained messages"
    }

    fn usage(&self) -> &'static str {
        "visualize tree | flow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_tree_counts_shared_prefixes() {
        let mut root = TopicTreeNode::default();
        insert_topic(&mut root, "sensors/a/temp");
        insert_topic(&mut root, "sensors/b/temp");

        let sensors = &root.children["sensors"];
        assert_eq!(sensors.count, 2);
        assert_eq!(sensors.children.len(), 2);
    }
}
