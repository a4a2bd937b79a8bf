//! Comment and literal stripping for C-family sources
//!
//! The view keeps byte offsets and line structure identical to the submitted
//! text: every stripped character is replaced by as many spaces as its UTF-8
//! width, newlines are kept. Quotes around literals are kept so that rules can
//! still see that a literal was there.

use thiserror::Error;

/// Error while scanning a snippet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Unterminated block comment starting at line {line}")]
    UnterminatedComment { line: usize },

    #[error("Unterminated literal starting at line {line}")]
    UnterminatedLiteral { line: usize },

    #[error("Unexpected closing brace at line {line}")]
    UnexpectedBrace { line: usize },

    #[error("Unclosed brace opened at line {line}")]
    UnclosedBrace { line: usize },
}

/// Matched pair of braces (byte offsets into the view)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub open: usize,
    pub close: usize,
}

/// Stripped text plus brace structure
#[derive(Debug, Clone)]
pub struct CodeView {
    text: String,
    line_starts: Vec<usize>,
    blocks: Vec<Block>,
}

enum State {
    Code,
    LineComment,
    BlockComment { line: usize },
    Literal { quote: char, line: usize },
    TextBlock { line: usize },
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

impl CodeView {
    /// Scan source text into a view
    pub fn scan(source: &str) -> Result<Self, ScanError> {
        let mut text = String::with_capacity(source.len());
        let mut line_starts = vec![0];
        let mut blocks = Vec::new();
        let mut open_braces: Vec<(usize, usize)> = Vec::new();
        let mut state = State::Code;
        let mut line = 1;

        let mut chars = source.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            if c == '\n' {
                line_starts.push(offset + 1);
            }
            let next = chars.peek().map(|&(_, n)| n);

            state = match state {
                State::Code => match (c, next) {
                    ('/', Some('/')) => {
                        chars.next();
                        text.push_str("  ");
                        State::LineComment
                    }
                    ('/', Some('*')) => {
                        chars.next();
                        text.push_str("  ");
                        State::BlockComment { line }
                    }
                    ('"', Some('"')) if source[offset..].starts_with("\"\"\"") => {
                        chars.next();
                        chars.next();
                        text.push_str("\"\"\"");
                        State::TextBlock { line }
                    }
                    ('"', _) | ('\'', _) => {
                        text.push(c);
                        State::Literal { quote: c, line }
                    }
                    ('{', _) => {
                        open_braces.push((offset, line));
                        text.push(c);
                        State::Code
                    }
                    ('}', _) => {
                        let (open, _) = open_braces
                            .pop()
                            .ok_or(ScanError::UnexpectedBrace { line })?;
                        blocks.push(Block {
                            open,
                            close: offset,
                        });
                        text.push(c);
                        State::Code
                    }
                    _ => {
                        text.push(c);
                        State::Code
                    }
                },
                State::LineComment => {
                    blank(&mut text, c);
                    if c == '\n' {
                        State::Code
                    } else {
                        State::LineComment
                    }
                }
                State::BlockComment { line: start } => {
                    if c == '*' && next == Some('/') {
                        chars.next();
                        text.push_str("  ");
                        State::Code
                    } else {
                        blank(&mut text, c);
                        State::BlockComment { line: start }
                    }
                }
                State::Literal { quote, line: start } => match c {
                    '\n' => return Err(ScanError::UnterminatedLiteral { line: start }),
                    '\\' => {
                        blank(&mut text, c);
                        if let Some((escaped_offset, escaped)) = chars.next() {
                            if escaped == '\n' {
                                // Line continuation inside a C string
                                line_starts.push(escaped_offset + 1);
                                line += 1;
                            }
                            blank(&mut text, escaped);
                        }
                        State::Literal { quote, line: start }
                    }
                    c if c == quote => {
                        text.push(c);
                        State::Code
                    }
                    c => {
                        blank(&mut text, c);
                        State::Literal { quote, line: start }
                    }
                },
                State::TextBlock { line: start } => {
                    if source[offset..].starts_with("\"\"\"") {
                        chars.next();
                        chars.next();
                        text.push_str("\"\"\"");
                        State::Code
                    } else {
                        if c == '\\' {
                            blank(&mut text, c);
                            if let Some((escaped_offset, escaped)) = chars.next() {
                                if escaped == '\n' {
                                    line_starts.push(escaped_offset + 1);
                                    line += 1;
                                }
                                blank(&mut text, escaped);
                            }
                        } else {
                            blank(&mut text, c);
                        }
                        State::TextBlock { line: start }
                    }
                }
            };

            if c == '\n' {
                line += 1;
            }
        }

        match state {
            State::BlockComment { line } => return Err(ScanError::UnterminatedComment { line }),
            State::Literal { line, .. } | State::TextBlock { line } => {
                return Err(ScanError::UnterminatedLiteral { line })
            }
            State::Code | State::LineComment => {}
        }

        if let Some(&(_, line)) = open_braces.last() {
            return Err(ScanError::UnclosedBrace { line });
        }

        blocks.sort_by_key(|b| b.open);
        Ok(Self {
            text,
            line_starts,
            blocks,
        })
    }

    /// Stripped text (same byte layout as the source)
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based line containing the byte offset
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    /// Stripped lines with 1-based line numbers
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.text.lines().enumerate().map(|(i, l)| (i + 1, l))
    }

    /// All brace blocks, ordered by opening offset
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block whose opening brace is at the given offset
    pub fn block_at(&self, open: usize) -> Option<&Block> {
        self.blocks
            .binary_search_by_key(&open, |b| b.open)
            .ok()
            .map(|idx| &self.blocks[idx])
    }

    /// Text between the braces of a block
    pub fn block_body(&self, block: &Block) -> &str {
        &self.text[block.open + 1..block.close]
    }
}
