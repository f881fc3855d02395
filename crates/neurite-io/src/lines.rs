use neurite_core::{NeuriteError, NeuriteResult};
use std::path::Path;

/// Line cursor over a model file, producing located parse errors.
pub(crate) struct Lines<'a> {
    path: String,
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    pub fn new(path: &Path, text: &'a str) -> Self {
        Lines {
            path: path.display().to_string(),
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> NeuriteError {
        NeuriteError::Parse {
            path: self.path.clone(),
            line: self.pos,
            message: message.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.lines.len()
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    pub fn next(&mut self) -> NeuriteResult<&'a str> {
        let line = self
            .lines
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("unexpected end of file"))?;
        self.pos += 1;
        Ok(line)
    }

    pub fn expect(&mut self, header: &str) -> NeuriteResult<()> {
        let line = self.next()?;
        if line.trim_end() != header {
            return Err(self.error(format!("expected `{}`, found `{}`", header, line)));
        }
        Ok(())
    }

    pub fn number<T: std::str::FromStr>(&self, token: &str) -> NeuriteResult<T> {
        token
            .trim()
            .parse::<T>()
            .map_err(|_| self.error(format!("invalid number `{}`", token)))
    }

    /// Comma separated values, trailing comma allowed.
    pub fn list(&mut self) -> NeuriteResult<Vec<f64>> {
        let line = self.next()?;
        line.split(',')
            .filter(|t| !t.trim().is_empty())
            .map(|t| self.number(t))
            .collect()
    }

    pub fn strings(&mut self) -> NeuriteResult<Vec<String>> {
        let line = self.next()?;
        Ok(line
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `true` and consume the line when it is the lone `0` marking an absent section.
    pub fn absent(&mut self) -> bool {
        if self.peek().map(str::trim) == Some("0") {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

/// Join values with a trailing comma after each one.
pub(crate) fn join(values: &[f64]) -> String {
    values.iter().map(|v| format!("{},", v)).collect()
}
