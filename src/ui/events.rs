//! Console input parsing

use super::messages::Inbound;

/// A line typed at the console prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Forwarded to the session as-is
    Message(Inbound),
    /// Print the current selection with counts
    ShowFiles,
    /// Print whether an API key is available
    KeyStatus,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse a console line; anything that is not a command is a question
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return ConsoleCommand::Empty;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => return ConsoleCommand::Exit,
            "help" => return ConsoleCommand::Help,
            _ => {}
        }

        let Some(command) = input.strip_prefix('/') else {
            return ConsoleCommand::Message(Inbound::Ask {
                question: input.to_string(),
            });
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "include" => ConsoleCommand::Message(Inbound::SetInclude { text: rest.to_string() }),
            "exclude" => ConsoleCommand::Message(Inbound::SetExclude { text: rest.to_string() }),
            "files" => ConsoleCommand::ShowFiles,
            "refresh" => ConsoleCommand::Message(Inbound::Refresh),
            "key" => match rest {
                "" | "status" => ConsoleCommand::KeyStatus,
                "clear" => ConsoleCommand::Message(Inbound::ClearApiKey),
                key => ConsoleCommand::Message(Inbound::SetApiKey { key: key.to_string() }),
            },
            "help" => ConsoleCommand::Help,
            "exit" | "quit" => ConsoleCommand::Exit,
            _ => ConsoleCommand::Unknown(input.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_commands() {
        assert_eq!(
            ConsoleCommand::parse("/include src, *.md"),
            ConsoleCommand::Message(Inbound::SetInclude {
                text: "src, *.md".to_string()
            })
        );
        assert_eq!(
            ConsoleCommand::parse("/exclude"),
            ConsoleCommand::Message(Inbound::SetExclude { text: String::new() })
        );
        assert_eq!(ConsoleCommand::parse("/files"), ConsoleCommand::ShowFiles);
        assert_eq!(ConsoleCommand::parse("/refresh"), ConsoleCommand::Message(Inbound::Refresh));
    }

    #[test]
    fn test_parse_key_commands() {
        assert_eq!(ConsoleCommand::parse("/key"), ConsoleCommand::KeyStatus);
        assert_eq!(ConsoleCommand::parse("/key clear"), ConsoleCommand::Message(Inbound::ClearApiKey));
        assert_eq!(
            ConsoleCommand::parse("/key sk-123"),
            ConsoleCommand::Message(Inbound::SetApiKey {
                key: "sk-123".to_string()
            })
        );
    }

    #[test]
    fn test_parse_questions_and_control() {
        assert_eq!(ConsoleCommand::parse("   "), ConsoleCommand::Empty);
        assert_eq!(ConsoleCommand::parse("EXIT"), ConsoleCommand::Exit);
        assert_eq!(ConsoleCommand::parse("help"), ConsoleCommand::Help);
        assert_eq!(
            ConsoleCommand::parse("what does main do?"),
            ConsoleCommand::Message(Inbound::Ask {
                question: "what does main do?".to_string()
            })
        );
        assert_eq!(
            ConsoleCommand::parse("/model gpt-4"),
            ConsoleCommand::Unknown("/model gpt-4".to_string())
        );
    }
}
