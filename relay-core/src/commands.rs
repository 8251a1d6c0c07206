// ABOUTME: Chat command parsing for relay: !cancel, !new, !status, !channels, !help, !continue.
// ABOUTME: Transport-agnostic; a leading "!!" escapes a literal "!" message.

/// A `!name args...` command as typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercased name without the `!`
    pub name: String,
    /// Arguments, with quoted strings kept together
    pub args: Vec<String>,
    /// Everything after the name, trimmed
    pub raw_args: String,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>, raw_args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Interpret as one of the commands the orchestrator understands
    pub fn as_chat_command(&self) -> ChatCommand {
        match self.name.as_str() {
            "cancel" | "stop" | "c" => ChatCommand::Cancel,
            "new" | "reset" => ChatCommand::NewSession,
            "status" | "s" => ChatCommand::Status,
            "channels" | "list" | "ls" => ChatCommand::Channels,
            "help" | "h" => ChatCommand::Help,
            "continue" | "cont" => {
                if self.raw_args.is_empty() {
                    ChatCommand::Unknown("continue needs a prompt".to_string())
                } else {
                    ChatCommand::Continue {
                        prompt: self.raw_args.clone(),
                    }
                }
            }
            other => ChatCommand::Unknown(other.to_string()),
        }
    }
}

/// Commands with orchestrator meaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Abort the running task and drop the queue
    Cancel,
    /// Forget the stored session and start fresh next time
    NewSession,
    /// Show this channel's state
    Status,
    /// List every known channel
    Channels,
    Help,
    /// Send a prompt that continues the directory's latest conversation
    Continue { prompt: String },
    Unknown(String),
}

impl ChatCommand {
    /// Stable name for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            ChatCommand::Cancel => "cancel",
            ChatCommand::NewSession => "new",
            ChatCommand::Status => "status",
            ChatCommand::Channels => "channels",
            ChatCommand::Help => "help",
            ChatCommand::Continue { .. } => "continue",
            ChatCommand::Unknown(_) => "unknown",
        }
    }
}

/// Result of parsing one line of chat input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    Command(Command),
    /// Plain prompt text for the assistant
    Message(String),
    /// Nothing to do (blank, or a bare escape)
    Ignore,
}

impl ParseResult {
    pub fn as_command(&self) -> Option<&Command> {
        match self {
            ParseResult::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&str> {
        match self {
            ParseResult::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Split on whitespace, keeping single- or double-quoted runs together
fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => {
                quote = None;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Classify one line of chat input.
///
/// `!name args` is a command when the name starts with a letter. A leading
/// `!!` sends the rest as an ordinary message; anything else is a message.
pub fn parse_message(body: &str) -> ParseResult {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return ParseResult::Ignore;
    }

    if let Some(escaped) = trimmed.strip_prefix("!!") {
        let escaped = escaped.trim();
        if escaped.is_empty() {
            return ParseResult::Ignore;
        }
        return ParseResult::Message(escaped.to_string());
    }

    if let Some(after_bang) = trimmed.strip_prefix('!') {
        if after_bang.chars().next().is_some_and(|c| c.is_alphabetic()) {
            let (name, rest) = after_bang
                .split_once(char::is_whitespace)
                .unwrap_or((after_bang, ""));
            let raw_args = rest.trim();
            return ParseResult::Command(Command::new(
                name.to_lowercase(),
                parse_args(raw_args),
                raw_args,
            ));
        }
    }

    ParseResult::Message(trimmed.to_string())
}

/// Help text shown for `!help` and unknown commands
pub fn help_text() -> &'static str {
    "Commands:\n\
     !cancel            abort the running task and drop queued messages\n\
     !new               forget this channel's session and start fresh\n\
     !status            show this channel's state\n\
     !channels          list every known channel\n\
     !continue <text>   continue the latest conversation in this channel's directory\n\
     !help              show this help\n\
     Start a message with !! to send a literal '!'"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(body: &str) -> Command {
        parse_message(body).as_command().cloned().unwrap()
    }

    #[test]
    fn test_plain_text_is_message() {
        assert_eq!(
            parse_message("  fix the build  ").as_message(),
            Some("fix the build")
        );
    }

    #[test]
    fn test_blank_is_ignored() {
        assert_eq!(parse_message("   "), ParseResult::Ignore);
        assert_eq!(parse_message("!!"), ParseResult::Ignore);
    }

    #[test]
    fn test_double_bang_escapes() {
        assert_eq!(
            parse_message("!!cancel is a word").as_message(),
            Some("cancel is a word")
        );
    }

    #[test]
    fn test_bang_without_letter_is_message() {
        assert_eq!(parse_message("!").as_message(), Some("!"));
        assert_eq!(parse_message("!42").as_message(), Some("!42"));
    }

    #[test]
    fn test_command_names_are_lowercased() {
        assert_eq!(command("!CANCEL").as_chat_command(), ChatCommand::Cancel);
        assert_eq!(command("!new").as_chat_command(), ChatCommand::NewSession);
        assert_eq!(command("!status").as_chat_command(), ChatCommand::Status);
        assert_eq!(command("!ls").as_chat_command(), ChatCommand::Channels);
        assert_eq!(command("!help").as_chat_command(), ChatCommand::Help);
    }

    #[test]
    fn test_continue_keeps_raw_prompt() {
        let cmd = command("!continue   add tests for \"the parser\"");
        assert_eq!(
            cmd.as_chat_command(),
            ChatCommand::Continue {
                prompt: "add tests for \"the parser\"".to_string()
            }
        );
        assert_eq!(cmd.args, vec!["add", "tests", "for", "the parser"]);
    }

    #[test]
    fn test_continue_without_prompt_is_unknown() {
        assert!(matches!(
            command("!continue").as_chat_command(),
            ChatCommand::Unknown(_)
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            command("!frobnicate now").as_chat_command(),
            ChatCommand::Unknown("frobnicate".to_string())
        );
    }

    #[test]
    fn test_parse_args_quotes() {
        assert_eq!(parse_args("a 'b c' \"d\""), vec!["a", "b c", "d"]);
        assert_eq!(parse_args("  "), Vec::<String>::new());
        assert_eq!(parse_args("x\"y z\""), vec!["xy z"]);
    }
}
