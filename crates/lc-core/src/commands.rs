/// Bot commands, addressed with the configured prefix (`!organize`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Organize,
    Dedup,
    Consolidate,
    Test,
    Help,
    Unknown(String),
}

impl Command {
    /// Sweeps touch the whole server and are restricted to admin roles.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Command::Organize | Command::Dedup | Command::Consolidate)
    }
}

pub const HELP_TEXT: &str = "Commands:
organize - file every link posted outside the curated category
dedup - remove repeated links from every channel
consolidate - merge same-named channels across categories
test - check that the bot is running
help - show this message";

/// Parse `text` as a command. `None` when it does not start with `prefix`.
///
/// Mentions are tolerated: `!organize@LinkCurator now` is `Organize`.
pub fn parse_command(prefix: &str, text: &str) -> Option<(Command, String)> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let name = first.split('@').next().unwrap_or("").to_lowercase();
    if name.is_empty() {
        return None;
    }
    let cmd = match name.as_str() {
        "organize" | "organise" => Command::Organize,
        "dedup" => Command::Dedup,
        "consolidate" => Command::Consolidate,
        "test" => Command::Test,
        "help" => Command::Help,
        _ => Command::Unknown(name),
    };
    Some((cmd, rest))
}
