use thiserror::Error;

use crate::command::Verb;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("username cannot be empty")]
    EmptyName,
    #[error("username '{0}' is already in use")]
    NameTaken(String),
    #[error("voting is over")]
    VotingClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("unknown option '{0}'")]
    InvalidOption(String),
    #[error("user '{0}' is not registered")]
    UnknownUser(String),
    #[error("voting is over")]
    VotingClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("user '{0}' may not change the option list")]
    Unauthorized(String),
    #[error("voting is over")]
    VotingClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{verb} expects exactly one argument")]
    MalformedCommand { verb: Verb },
}
