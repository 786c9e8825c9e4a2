#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Mode,
    Model,
    Connect,
    Clear,
    Save,
    Help,
    Exit,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedSlashCommand<'a> {
    pub command: SlashCommand,
    pub args: &'a str,
}

#[derive(Debug, Clone, Copy)]
struct SlashCommandDoc {
    command: SlashCommand,
    usage: &'static str,
    description: &'static str,
}

const SLASH_COMMAND_DOCS: [SlashCommandDoc; 8] = [
    SlashCommandDoc {
        command: SlashCommand::Mode,
        usage: "/mode [chat|contract|travel]",
        description: "show or switch conversation mode",
    },
    SlashCommandDoc {
        command: SlashCommand::Model,
        usage: "/model [name]",
        description: "show current model or switch model",
    },
    SlashCommandDoc {
        command: SlashCommand::Connect,
        usage: "/connect",
        description: "check connectivity to remote services",
    },
    SlashCommandDoc {
        command: SlashCommand::Clear,
        usage: "/clear",
        description: "clear conversation and keep session id",
    },
    SlashCommandDoc {
        command: SlashCommand::Save,
        usage: "/save",
        description: "save current transcript to disk",
    },
    SlashCommandDoc {
        command: SlashCommand::Help,
        usage: "/help",
        description: "show slash command help",
    },
    SlashCommandDoc {
        command: SlashCommand::Exit,
        usage: "/exit",
        description: "exit the program",
    },
    SlashCommandDoc {
        command: SlashCommand::Quit,
        usage: "/quit",
        description: "exit the program",
    },
];

fn command_keyword(command: SlashCommand) -> &'static str {
    match command {
        SlashCommand::Mode => "mode",
        SlashCommand::Model => "model",
        SlashCommand::Connect => "connect",
        SlashCommand::Clear => "clear",
        SlashCommand::Save => "save",
        SlashCommand::Help => "help",
        SlashCommand::Exit => "exit",
        SlashCommand::Quit => "quit",
    }
}

pub fn parse(line: &str) -> Option<ParsedSlashCommand<'_>> {
    let trimmed = line.trim();
    let body = trimmed.strip_prefix('/')?;
    let (keyword, args) = match body.split_once(char::is_whitespace) {
        Some((keyword, args)) => (keyword, args.trim()),
        None => (body, ""),
    };
    let keyword = keyword.to_ascii_lowercase();
    let doc = SLASH_COMMAND_DOCS
        .iter()
        .find(|doc| command_keyword(doc.command) == keyword)?;
    Some(ParsedSlashCommand {
        command: doc.command,
        args,
    })
}

pub fn help_lines() -> Vec<String> {
    SLASH_COMMAND_DOCS
        .iter()
        .map(|doc| format!("{:<32} {}", doc.usage, doc.description))
        .collect()
}

/// 输入 `/` 前缀时的候选提示，最多 `limit` 行。
pub fn popup_lines(prefix: &str, limit: usize) -> Vec<String> {
    let prefix = prefix.to_ascii_lowercase();
    SLASH_COMMAND_DOCS
        .iter()
        .filter(|doc| command_keyword(doc.command).starts_with(&prefix))
        .take(limit)
        .map(|doc| format!("{:<32} {}", doc.usage, doc.description))
        .collect()
}

pub fn first_command_completion(prefix: &str) -> Option<&'static str> {
    let prefix = prefix.to_ascii_lowercase();
    SLASH_COMMAND_DOCS
        .iter()
        .map(|doc| command_keyword(doc.command))
        .find(|keyword| keyword.starts_with(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_command_and_args() {
        let parsed = parse("/mode travel").expect("parsed");
        assert_eq!(parsed.command, SlashCommand::Mode);
        assert_eq!(parsed.args, "travel");
    }

    #[test]
    fn parse_rejects_unknown_and_plain_text() {
        assert!(parse("/unknown").is_none());
        assert!(parse("hello").is_none());
    }

    #[test]
    fn completion_matches_prefix() {
        assert_eq!(first_command_completion("mo"), Some("mode"));
        assert_eq!(first_command_completion("sa"), Some("save"));
        assert!(first_command_completion("zz").is_none());
    }

    #[test]
    fn popup_lists_all_for_empty_prefix() {
        assert_eq!(popup_lines("", 20).len(), SLASH_COMMAND_DOCS.len());
        assert_eq!(popup_lines("c", 20).len(), 2);
    }
}
