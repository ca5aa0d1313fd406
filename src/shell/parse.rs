//! Command line grammar: `stage ('|' stage)* [('>' | '>>') path]`.
//!
//! Words split on whitespace; a double-quoted run is one word, quotes
//! stripped. There are no escapes.

use alloc::vec::Vec;
use core::fmt;

use crate::constants::shell::{MAX_ARGS, MAX_STAGES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect<'a> {
    /// `>`: replace the file contents
    Truncate(&'a str),
    /// `>>`: append to the file
    Append(&'a str),
}

impl<'a> Redirect<'a> {
    pub fn path(&self) -> &'a str {
        match *self {
            Redirect::Truncate(path) | Redirect::Append(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline<'a> {
    /// Each stage is `argv`, command name first. Never empty.
    pub stages: Vec<Vec<&'a str>>,
    pub redirect: Option<Redirect<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    UnterminatedQuote,
    EmptyStage,
    MissingTarget,
    TrailingInput,
    TooManyArgs,
    TooManyStages,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::UnterminatedQuote => "unterminated quote",
            ParseError::EmptyStage => "empty command in pipeline",
            ParseError::MissingTarget => "missing redirection target",
            ParseError::TrailingInput => "unexpected input after redirection",
            ParseError::TooManyArgs => "too many arguments",
            ParseError::TooManyStages => "too many pipeline stages",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Pipe,
    Truncate,
    Append,
}

fn tokenize(line: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            b'>' if bytes.get(i + 1) == Some(&b'>') => {
                tokens.push(Token::Append);
                i += 2;
            }
            b'>' => {
                tokens.push(Token::Truncate);
                i += 1;
            }
            b'"' => {
                let start = i + 1;
                let len = bytes[start..]
                    .iter()
                    .position(|&b| b == b'"')
                    .ok_or(ParseError::UnterminatedQuote)?;
                tokens.push(Token::Word(&line[start..start + len]));
                i = start + len + 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() && !matches!(bytes[i], b' ' | b'\t' | b'|' | b'>' | b'"') {
                    i += 1;
                }
                tokens.push(Token::Word(&line[start..i]));
            }
        }
    }

    Ok(tokens)
}

/// `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Pipeline<'_>>, ParseError> {
    let tokens = tokenize(line)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut stages: Vec<Vec<&str>> = Vec::new();
    let mut stage: Vec<&str> = Vec::new();
    let mut redirect = None;
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => {
                if stage.len() == MAX_ARGS {
                    return Err(ParseError::TooManyArgs);
                }
                stage.push(word);
            }
            Token::Pipe => {
                if stage.is_empty() {
                    return Err(ParseError::EmptyStage);
                }
                stages.push(core::mem::take(&mut stage));
            }
            Token::Truncate | Token::Append => {
                let path = match iter.next() {
                    Some(Token::Word(path)) if !path.is_empty() => path,
                    _ => return Err(ParseError::MissingTarget),
                };
                if iter.next().is_some() {
                    return Err(ParseError::TrailingInput);
                }
                redirect = Some(if token == Token::Append {
                    Redirect::Append(path)
                } else {
                    Redirect::Truncate(path)
                });
            }
        }
    }

    if stage.is_empty() {
        return Err(ParseError::EmptyStage);
    }
    stages.push(stage);

    if stages.len() > MAX_STAGES {
        return Err(ParseError::TooManyStages);
    }

    Ok(Some(Pipeline { stages, redirect }))
}
