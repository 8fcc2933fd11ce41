//! Whitespace token stream over scene text.
//!
//! The format is token-delimited: any run of non-whitespace is one token.
//! Line comments (`//`) and block comments (`/* */`) are stripped. The
//! tokenizer tracks line numbers for error reporting and does not
//! interpret tokens; the loader decides what each one means.

/// A stream of tokens over borrowed scene text.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    rest: &'a str,
    line: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { rest: text, line: 1 }
    }

    /// Line of the last token returned.
    pub fn line(&self) -> u32 {
        self.line
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            let mut newlines = 0u32;
            let trimmed = self.rest.trim_start_matches(|c: char| {
                if c == '\n' {
                    newlines += 1;
                }
                c.is_whitespace()
            });
            self.line += newlines;
            if let Some(stripped) = trimmed.strip_prefix("//") {
                self.rest = match stripped.find('\n') {
                    Some(nl) => &stripped[nl..],
                    None => "",
                };
            } else if let Some(stripped) = trimmed.strip_prefix("/*") {
                self.rest = match stripped.find("*/") {
                    Some(end) => {
                        self.line += stripped[..end].matches('\n').count() as u32;
                        &stripped[end + 2..]
                    }
                    None => "",
                };
            } else {
                self.rest = trimmed;
                return;
            }
        }
    }

    /// Next raw token, or `None` at end of text.
    pub fn next(&mut self) -> Option<&'a str> {
        self.skip_ws_and_comments();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }

    /// Peek the next token without consuming it.
    pub fn peek(&self) -> Option<&'a str> {
        self.clone().next()
    }
}
