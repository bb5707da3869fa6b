use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, DOWNLOAD_COMMAND, INDEX_ARG_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    /// 1-based index argument, if one was given and parsed.
    pub fn index(&self) -> Option<usize> {
        self.command_args
            .get("index")
            .and_then(Value::as_u64)
            .map(|value| value as usize)
    }

    pub fn text_arg(&self, key: &str) -> Option<&str> {
        self.command_args.get(key).and_then(Value::as_str)
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_index(arg: &str) -> Value {
    match arg.trim().parse::<u64>() {
        Ok(value) if value > 0 => Value::Number(value.into()),
        _ => Value::Null,
    }
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

/// `/download [n] [dir]`: a leading positive integer is the index, everything
/// after it is the directory.
fn parse_download_args(arg: &str) -> (Value, Value) {
    let mut parts = split_args(arg);
    if parts.is_empty() {
        return (Value::Null, Value::Null);
    }
    let index = match parse_index(&parts[0]) {
        Value::Null => Value::Null,
        value => {
            parts.remove(0);
            value
        }
    };
    let dir = if parts.is_empty() {
        Value::Null
    } else {
        Value::String(parts.join(" "))
    };
    (index, dir)
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = remainder.trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("key".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, INDEX_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("index".to_string(), parse_index(arg));
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == DOWNLOAD_COMMAND.command {
                let (index, dir) = parse_download_args(arg);
                let mut intent = Intent::new(DOWNLOAD_COMMAND.action, text);
                intent.command_args.insert("index".to_string(), index);
                intent.command_args.insert("dir".to_string(), dir);
                return intent;
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}
