use regex::Regex;

const SLASH_COMMAND: &str = r"^/(?P<name>[A-Za-z][A-Za-z-]*)(?:\s+(?P<arg>.*\S))?\s*$";

/// A line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Quit,
    History,
    Attach(String),
    Detach,
    Diagnose(String),
    /// Send one of the numbered welcome suggestions
    Suggestion(usize),
    /// A known command used without its required argument
    MissingArgument(&'static str),
    Unknown(String),
    Prompt(String),
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let trimmed = input.trim();
        if !trimmed.starts_with('/') {
            return Command::Prompt(input.to_string());
        }

        let Some((name, arg)) = split_slash_command(trimmed) else {
            return Command::Unknown(trimmed.to_string());
        };

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("help", _) => Command::Help,
            ("clear", _) => Command::Clear,
            ("quit" | "exit", _) => Command::Quit,
            ("history", _) => Command::History,
            ("detach", _) => Command::Detach,
            ("attach", Some(path)) => Command::Attach(path),
            ("attach", None) => Command::MissingArgument("/attach <path>"),
            ("diagnose", Some(path)) => Command::Diagnose(path),
            ("diagnose", None) => Command::MissingArgument("/diagnose <path>"),
            ("try", Some(n)) => match n.parse() {
                Ok(n) => Command::Suggestion(n),
                Err(_) => Command::MissingArgument("/try <number>"),
            },
            ("try", None) => Command::MissingArgument("/try <number>"),
            _ => Command::Unknown(format!("/{name}")),
        }
    }
}

fn split_slash_command(input: &str) -> Option<(String, Option<String>)> {
    let re = Regex::new(SLASH_COMMAND).ok()?;
    let captures = re.captures(input)?;
    let name = captures.name("name")?.as_str().to_string();
    let arg = captures.name("arg").map(|m| m.as_str().to_string());
    Some((name, arg))
}
