//! Splits an input line into a command word, positional args, and a
//! `--key=value`/`--flag` options map; expands aliases before dispatch
//! (§4.9).

use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedCommand {
    pub command: String,
    pub args: Vec<String>,
    pub options: HashMap<String, Option<String>>,
    /// The raw line, after alias expansion — handlers that want the whole
    /// remainder verbatim (`filter`, `rule add`) use this instead of
    /// re-joining `args`.
    pub raw: String,
}

impl ParsedCommand {
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Everything after the command word, as originally typed (alias
    /// expansion only ever rewrites the command word, so this is the same
    /// slice of `raw` regardless of expansion).
    pub fn rest(&self) -> &str {
        self.raw
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim_start())
            .unwrap_or("")
    }
}

/// Tokenizes a trimmed, non-empty line into a command word and the
/// remaining whitespace-delimited tokens, recognizing `--key=value` and
/// `--flag` tokens as options.
fn tokenize(line: &str) -> ParsedCommand {
    let mut tokens = line.split_whitespace();
    let command = tokens.next().unwrap_or("").to_string();

    let mut args = Vec::new();
    let mut options = HashMap::new();

    for token in tokens {
        if let Some(flag) = token.strip_prefix("--") {
            match flag.split_once('=') {
                Some((key, value)) => {
                    options.insert(key.to_string(), Some(value.to_string()));
                }
                None => {
                    options.insert(flag.to_string(), None);
                }
            }
        } else {
            args.push(token.to_string());
        }
    }

    ParsedCommand {
        command,
        args,
        options,
        raw: line.to_string(),
    }
}

/// Default aliases plus any the operator configured, consulted before
/// dispatch so handlers never see an alias — only the expanded command.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Replaces the first token with its alias expansion, if any, and
    /// appends the rest of the line unchanged.
    pub fn expand(&self, line: &str) -> String {
        let Some((first, rest)) = line.split_once(char::is_whitespace) else {
            return self
                .aliases
                .get(line)
                .cloned()
                .unwrap_or_else(|| line.to_string());
        };

        match self.aliases.get(first) {
            Some(expansion) => format!("{expansion} {}", rest.trim_start()),
            None => line.to_string(),
        }
    }
}

/// Trims `line`; returns `None` for empty input. Alias expansion happens
/// before tokenizing so a multi-word alias (`"filter clear"`, `"filter grep "`)
/// becomes the new command + leading args.
pub fn parse_line(line: &str, aliases: &AliasTable) -> Option<ParsedCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = aliases.expand(trimmed);
    Some(tokenize(&expanded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> AliasTable {
        AliasTable::new(HashMap::from([
            ("q".to_string(), "exit".to_string()),
            ("c".to_string(), "filter clear".to_string()),
            ("g".to_string(), "filter grep ".to_string()),
        ]))
    }

    #[test]
    fn empty_lines_are_ignored() {
        assert!(parse_line("", &aliases()).is_none());
        assert!(parse_line("   ", &aliases()).is_none());
    }

    #[test]
    fn options_and_positional_args_are_split() {
        let parsed = parse_line("history --limit=10 foo", &AliasTable::default()).unwrap();
        assert_eq!(parsed.command, "history");
        assert_eq!(parsed.args, vec!["foo".to_string()]);
        assert_eq!(parsed.options.get("limit"), Some(&Some("10".to_string())));
    }

    #[test]
    fn bare_flag_has_no_value() {
        let parsed = parse_line("export --pretty", &AliasTable::default()).unwrap();
        assert_eq!(parsed.options.get("pretty"), Some(&None));
    }

    #[test]
    fn single_word_alias_expands_to_its_target() {
        let parsed = parse_line("q", &aliases()).unwrap();
        assert_eq!(parsed.command, "exit");
    }

    #[test]
    fn multi_word_alias_expands_with_trailing_args_appended() {
        let parsed = parse_line("c", &aliases()).unwrap();
        assert_eq!(parsed.command, "filter");
        assert_eq!(parsed.args, vec!["clear".to_string()]);
    }

    #[test]
    fn alias_with_trailing_space_becomes_a_prefix_for_the_rest_of_the_line() {
        let parsed = parse_line("g boom", &aliases()).unwrap();
        assert_eq!(parsed.command, "filter");
        assert_eq!(parsed.args, vec!["grep".to_string(), "boom".to_string()]);
    }

    #[test]
    fn unknown_command_still_parses_it_is_the_dispatcher_that_rejects_it() {
        let parsed = parse_line("bogus", &AliasTable::default()).unwrap();
        assert_eq!(parsed.command, "bogus");
    }
}
