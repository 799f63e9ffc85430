//! Parsing of the line commands a registered client may send.

use std::fmt;

use crate::error::CommandError;

/// Commands that take exactly one option name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Vote,
    Add,
    Remove,
}

impl Verb {
    /// `/add` and `/remove` are reserved for admins.
    pub fn is_admin_only(self) -> bool {
        matches!(self, Verb::Add | Verb::Remove)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Verb::Vote => "/vote",
            Verb::Add => "/add",
            Verb::Remove => "/remove",
        };
        f.write_str(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Results,
    Vote(String),
    Add(String),
    Remove(String),
    Unknown,
}

impl Command {
    /// Parses one trimmed line. The first whitespace-delimited token picks the
    /// command; argument-taking commands need exactly one more token.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let verb = match tokens.next() {
            Some("/exit") => return Ok(Command::Exit),
            Some("/results") => return Ok(Command::Results),
            Some("/vote") => Verb::Vote,
            Some("/add") => Verb::Add,
            Some("/remove") => Verb::Remove,
            _ => return Ok(Command::Unknown),
        };

        let argument = match (tokens.next(), tokens.next()) {
            (Some(argument), None) => argument.to_string(),
            _ => return Err(CommandError::MalformedCommand { verb }),
        };

        Ok(match verb {
            Verb::Vote => Command::Vote(argument),
            Verb::Add => Command::Add(argument),
            Verb::Remove => Command::Remove(argument),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_argument_commands() {
        assert_eq!(Command::parse("/vote red"), Ok(Command::Vote("red".into())));
        assert_eq!(Command::parse("/add  pizza"), Ok(Command::Add("pizza".into())));
        assert_eq!(
            Command::parse("/remove pizza"),
            Ok(Command::Remove("pizza".into()))
        );
    }

    #[test]
    fn bare_commands_ignore_trailing_tokens() {
        assert_eq!(Command::parse("/exit"), Ok(Command::Exit));
        assert_eq!(Command::parse("/results now"), Ok(Command::Results));
    }

    #[test]
    fn missing_argument_is_malformed() {
        assert_eq!(
            Command::parse("/vote"),
            Err(CommandError::MalformedCommand { verb: Verb::Vote })
        );
        assert_eq!(
            Command::parse("/add"),
            Err(CommandError::MalformedCommand { verb: Verb::Add })
        );
    }

    #[test]
    fn argument_with_spaces_is_malformed() {
        assert_eq!(
            Command::parse("/vote ice cream"),
            Err(CommandError::MalformedCommand { verb: Verb::Vote })
        );
    }

    #[test]
    fn command_token_must_match_exactly() {
        assert_eq!(Command::parse("/voter red"), Ok(Command::Unknown));
        assert_eq!(Command::parse("hello"), Ok(Command::Unknown));
        assert_eq!(Command::parse(""), Ok(Command::Unknown));
    }

    #[test]
    fn malformed_error_names_the_verb() {
        let err = Command::parse("/remove").unwrap_err();
        assert_eq!(err.to_string(), "/remove expects exactly one argument");
    }
}
