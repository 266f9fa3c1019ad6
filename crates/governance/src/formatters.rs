//! Human-readable rendering of gated tool calls.
//!
//! Each gated tool gets a description (shown in audit logs) and a command
//! string (handed to the risk assessor). Rendering never fails: missing
//! arguments render as empty strings and the assessor judges the result.

use serde_json::Value;

/// Tools whose calls must pass the command filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedTool {
    Shell,
    Grep,
    View,
    SearchDocumentsFor,
    GetUrlContent,
    StrReplaceBasedEditTool,
}

/// Rendered form of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedCommand {
    pub description: String,
    pub command: String,
}

impl GatedTool {
    pub const ALL: [GatedTool; 6] = [
        Self::Shell,
        Self::Grep,
        Self::View,
        Self::SearchDocumentsFor,
        Self::GetUrlContent,
        Self::StrReplaceBasedEditTool,
    ];

    /// Look up a gated tool by its tool-call name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Grep => "grep",
            Self::View => "view",
            Self::SearchDocumentsFor => "search_documents_for",
            Self::GetUrlContent => "get_url_content",
            Self::StrReplaceBasedEditTool => "str_replace_based_edit_tool",
        }
    }

    /// Render a call's arguments.
    pub fn format(&self, args: &Value) -> FormattedCommand {
        match self {
            Self::Shell => format_shell(args),
            Self::Grep => format_grep(args),
            Self::View => format_view(args),
            Self::SearchDocumentsFor => {
                let url = str_arg(args, "url");
                let query = str_arg(args, "query");
                FormattedCommand {
                    description: format!("Search \"{}\" for \"{}\"", url, query),
                    command: shell_words::join(["search_documents_for", query, url]),
                }
            }
            Self::GetUrlContent => {
                let url = str_arg(args, "url");
                FormattedCommand {
                    description: format!("Fetch content of {}", url),
                    command: shell_words::join(["curl", url]),
                }
            }
            Self::StrReplaceBasedEditTool => format_edit(args),
        }
    }
}

/// Shell tokens of a `shell` call. `command` may be a token array or a
/// single string; an unparseable string falls back to whitespace splitting.
pub fn shell_tokens(args: &Value) -> Vec<String> {
    match args.get("command") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(command)) => shell_words::split(command)
            .unwrap_or_else(|_| command.split_whitespace().map(String::from).collect()),
        _ => Vec::new(),
    }
}

fn format_shell(args: &Value) -> FormattedCommand {
    let workdir = args
        .get("workdir")
        .and_then(Value::as_str)
        .unwrap_or("the repository root");
    FormattedCommand {
        description: format!("Execute shell command in {}", workdir),
        command: shell_words::join(shell_tokens(args)),
    }
}

fn format_grep(args: &Value) -> FormattedCommand {
    let query = str_arg(args, "query");
    let mut argv: Vec<String> = vec!["rg".into()];

    if !bool_arg(args, "case_sensitive") {
        argv.push("-i".into());
    }
    if bool_arg(args, "match_string") {
        argv.push("--fixed-strings".into());
    }
    if let Some(lines) = args.get("context_lines").and_then(Value::as_u64) {
        argv.push("-C".into());
        argv.push(lines.to_string());
    }
    for glob in list_arg(args, "include_files") {
        argv.push("--glob".into());
        argv.push(glob);
    }
    for glob in list_arg(args, "exclude_files") {
        argv.push("--glob".into());
        argv.push(format!("!{}", glob));
    }
    if let Some(max) = args.get("max_results").and_then(Value::as_u64) {
        argv.push("--max-count".into());
        argv.push(max.to_string());
    }
    argv.push("--".into());
    argv.push(query.to_string());
    argv.push(
        args.get("path")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .to_string(),
    );

    FormattedCommand {
        description: format!("Search for pattern \"{}\"", query),
        command: shell_words::join(argv),
    }
}

fn format_view(args: &Value) -> FormattedCommand {
    let path = str_arg(args, "path");
    let range = args
        .get("view_range")
        .and_then(Value::as_array)
        .and_then(|r| Some((r.first()?.as_i64()?, r.get(1)?.as_i64()?)));

    let description = match range {
        Some((start, end)) => format!("View file {} (lines {}-{})", path, start, end),
        None => format!("View file {}", path),
    };
    FormattedCommand {
        description,
        command: shell_words::join(["cat", path]),
    }
}

fn format_edit(args: &Value) -> FormattedCommand {
    let path = str_arg(args, "path");
    let action = str_arg(args, "command");
    let description = format!("{} {}", action, path);

    let command = match action {
        "view" => shell_words::join(["cat", path]),
        "str_replace" => format!(
            "{} (replace {:?} with {:?})",
            shell_words::join(["str_replace", path]),
            str_arg(args, "old_str"),
            str_arg(args, "new_str"),
        ),
        "insert" => format!(
            "{} (after line {})",
            shell_words::join(["insert", path]),
            args.get("insert_line").and_then(Value::as_i64).unwrap_or(0),
        ),
        _ => shell_words::join([action, path]),
    };
    FormattedCommand {
        description,
        command,
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn bool_arg(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// A string or list of strings.
fn list_arg(args: &Value, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
