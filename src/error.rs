use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    DepthExceeded,
    Internal,
}

/// Fatal configuration or programming error. All ordinary "cannot quote
/// this sequence" outcomes are rejected `Quote`s, never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl QuoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }
}

impl fmt::Display for QuoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for QuoteError {}

/// The constrained cut search space is empty. Local to the decomposer;
/// stations convert it into a rejected quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoSolutionFound;

impl fmt::Display for NoSolutionFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no feasible decomposition found")
    }
}

impl Error for NoSolutionFound {}
