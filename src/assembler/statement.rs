//! [Statement]: the fully-parsed form of one non-empty source line

use super::Context;
use super::catalog::Entry;
use super::token::{self, Token};

/// A validated line: optional label, mnemonic, operand tokens and the
/// catalog entry they were checked against. Lines holding only a label
/// never become statements.
#[derive(Debug)]
pub struct Statement<'a> {
    pub line_no: usize,
    pub line: &'a str,
    pub label: Option<Token>,
    pub mnemonic: Token,
    pub args: [Token; 3],
    pub entry: &'static Entry,
}

impl<'a> Statement<'a> {
    /// Register code of operand `idx`, shifted into field position.
    /// Callers only use this on operands that type-checked as registers.
    pub fn register(&self, idx: usize, shl: u32) -> u16 {
        token::register_code(self.args[idx], self.line, shl)
    }

    /// Numeric value of operand `idx`; operands that type-checked as
    /// numbers always decode
    pub fn number(&self, idx: usize) -> i32 {
        token::parse_number(self.args[idx], self.line).unwrap_or(0)
    }

    /// The source span recorded as debug text for this statement's first
    /// emitted word: from the statement start (or the label/mnemonic when
    /// indentation is not kept) through the last operand. Empty when debug
    /// embedding is off.
    pub fn debug_span(&self, ctx: &Context) -> Token {
        if !ctx.store_debug {
            return Token::EMPTY;
        }

        let start = if ctx.store_indent {
            0
        } else {
            self.label.map_or(self.mnemonic.start, |label| label.start)
        };

        let last = if self.entry.argc > 0 {
            self.args[self.entry.argc - 1]
        } else {
            self.mnemonic
        };

        Token::new(start, last.end() - start)
    }
}
