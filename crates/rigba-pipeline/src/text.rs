//! Line-oriented tokenizer shared by the dataset and solution readers.
//!
//! Blank lines and lines starting with `#` are skipped. Every record remembers
//! its 1-based line number for error reporting.

use std::str::FromStr;

use rigba_core::{Real, SixDof, Vec3};

use crate::ParseError;

#[derive(Debug)]
pub(crate) struct Record<'a> {
    pub line: usize,
    pub tokens: Vec<&'a str>,
}

impl<'a> Record<'a> {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Require one of the `allowed` token counts.
    pub fn expect_len(&self, what: &'static str, allowed: &[usize]) -> Result<(), ParseError> {
        if allowed.contains(&self.len()) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(ParseError::TokenCount {
            line: self.line,
            what,
            expected,
            found: self.len(),
        })
    }

    pub fn parse<T: FromStr>(&self, i: usize) -> Result<T, ParseError> {
        self.tokens[i]
            .parse()
            .map_err(|_| ParseError::InvalidNumber {
                line: self.line,
                token: self.tokens[i].to_string(),
            })
    }

    pub fn real(&self, i: usize) -> Result<Real, ParseError> {
        self.parse(i)
    }

    pub fn reals(&self, from: usize) -> Result<Vec<Real>, ParseError> {
        (from..self.len()).map(|i| self.real(i)).collect()
    }

    pub fn vec3(&self, from: usize) -> Result<Vec3, ParseError> {
        Ok(Vec3::new(
            self.real(from)?,
            self.real(from + 1)?,
            self.real(from + 2)?,
        ))
    }

    pub fn six_dof(&self, from: usize) -> Result<SixDof, ParseError> {
        Ok(SixDof::new(self.vec3(from)?, self.vec3(from + 3)?))
    }

    /// Parse a non-negative index and check it against `limit`.
    pub fn index(&self, i: usize, field: &'static str, limit: usize) -> Result<usize, ParseError> {
        let value: usize = self.parse(i)?;
        if value >= limit {
            return Err(ParseError::IndexOutOfRange {
                line: self.line,
                field,
                value,
                limit,
            });
        }
        Ok(value)
    }
}

pub(crate) struct Records<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    last_line: usize,
}

impl<'a> Records<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            last_line: 0,
        }
    }

    pub fn next_record(&mut self, expected: &'static str) -> Result<Record<'a>, ParseError> {
        for (i, raw) in self.lines.by_ref() {
            self.last_line = i + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Ok(Record {
                line: i + 1,
                tokens: trimmed.split_whitespace().collect(),
            });
        }
        Err(ParseError::UnexpectedEof {
            line: self.last_line,
            expected,
        })
    }

    /// Record with exactly `n` tokens.
    pub fn next_exact(&mut self, what: &'static str, n: usize) -> Result<Record<'a>, ParseError> {
        let record = self.next_record(what)?;
        record.expect_len(what, &[n])?;
        Ok(record)
    }

    /// Line number of the next non-comment record, if any remains.
    pub fn trailing(&mut self) -> Option<usize> {
        self.next_record("").ok().map(|r| r.line)
    }
}
