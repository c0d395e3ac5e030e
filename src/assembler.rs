//! Converts LC-3 assembly source into relocatable object sections
//!
//! Each input file becomes a [Unit]: its line buffer, its object sections
//! and its symbol table. Units assemble independently (one worker thread
//! per unit); the [linker](crate::linker) later merges their symbol tables
//! and resolves PC-relative references.
//!
//! Comments start with a semicolon (`;`) and continue to the end of the
//! line. Labels are barewords in the first column position of a line; a
//! label may stand alone or precede an instruction:
//!
//! ```ignore
//! LOOP    ADD R1, R1, #-1   ; decrement
//!         BRp LOOP          ; loop while positive
//!         HALT
//! COUNT   .FILL #10
//! ```
//!
//! Numeric literals are written `#10` (decimal), `x1F` (hex), `b1010`
//! (binary) or bare decimal; a `-` may follow the base prefix. Instructions
//! and directives are case-insensitive, label lookup too.
//!
//! The assembler supports the full LC-3 instruction set: `ADD`, `AND`,
//! `BR(n|z|p)*`, `JMP`/`RET`, `JSR`/`JSRR`, `LD`, `LDI`, `LDR`, `LEA`,
//! `NOT`, `RTI`, `ST`, `STI`, `STR`, `TRAP` and the trap aliases `GETC`,
//! `OUT`, `PUTC`, `PUTS`, `IN`, `PUTSP`, `HALT`.
//!
//! The assembler supports the following directives:
//! - `.ORIG addr`: open an object section at the given origin
//! - `.END`: close the current section
//! - `.FILL n`: emit one word
//! - `.BLKW n`: reserve n zeroed words
//! - `.STRINGZ "text"`: emit one word per byte plus a terminating zero
//! - `.EXTERN label`: reserved; accepted but emits nothing

pub mod catalog;
pub mod directives;
pub mod instructions;
pub mod statement;
pub mod symbols;
pub mod token;

use crate::logging;
use catalog::Kind;
use statement::Statement;
use std::cell::Cell;
use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread;
use symbols::Symbol;
use token::{Token, TokenType};

/// Longest source line kept; anything longer is truncated and reported
const LINE_MAX: usize = 128;

/// Process-wide assembly state shared by every unit of one invocation
#[derive(Debug)]
pub struct Context {
    pub output: Option<PathBuf>,
    pub store_debug: bool,
    pub store_indent: bool,
    error: AtomicBool,
}

impl Context {
    pub fn new(output: Option<PathBuf>, store_debug: bool, store_indent: bool) -> Context {
        Context {
            output,
            store_debug,
            store_indent,
            error: AtomicBool::new(false),
        }
    }

    /// Mark the whole invocation as failed. Workers may race on this; the
    /// flag only ever goes from false to true and is read after the join.
    pub fn flag_error(&self) {
        self.error.store(true, AtomicOrdering::Relaxed);
    }

    pub fn has_error(&self) -> bool {
        self.error.load(AtomicOrdering::Relaxed)
    }
}

/// A token plus the line it came from, kept with emitted words so errors
/// and the linker can recover source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRef {
    pub line: usize,
    pub token: Token,
}

impl SourceRef {
    pub fn new(line: usize, token: Token) -> SourceRef {
        SourceRef { line, token }
    }

    pub fn empty(line: usize) -> SourceRef {
        SourceRef {
            line,
            token: Token::EMPTY,
        }
    }
}

/// One emitted word. While the label reference is non-empty the word still
/// needs a PC-offset from the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLine {
    pub word: u16,
    pub label: SourceRef,
    pub debug: SourceRef,
}

/// A contiguous run of emitted words, bounded by `.ORIG`/`.END`
#[derive(Debug, Clone, Default)]
pub struct ObjectSection {
    pub origin: u16,
    pub lines: Vec<ObjectLine>,
}

/// One input file on its way through the pipeline: source or object file,
/// parsed into lines, sections and symbols
#[derive(Debug)]
pub struct Unit {
    pub filename: PathBuf,
    pub lines: Vec<String>,
    pub sections: Vec<ObjectSection>,
    pub symbols: Vec<Symbol>,
    pub error: Cell<bool>,
}

impl Unit {
    pub fn new(filename: PathBuf) -> Unit {
        Unit {
            filename,
            lines: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
            error: Cell::new(false),
        }
    }

    fn name(&self) -> String {
        self.filename.display().to_string()
    }

    /// Report an error tied to a token of a source line
    pub fn token_error(&self, ctx: &Context, line_no: usize, tk: Token, msg: &str, show_token: bool) {
        self.error.set(true);
        ctx.flag_error();
        let line = self.lines.get(line_no).map(String::as_str).unwrap_or("");
        logging::token_error(&self.name(), line_no, line, tk, msg, show_token);
    }

    /// Report a link-stage error, quoting the token when one is given
    pub fn linker_error(&self, ctx: &Context, msg: &str, tk: Token, line_no: usize) {
        self.error.set(true);
        ctx.flag_error();
        let line = self.lines.get(line_no).map(String::as_str).unwrap_or("");
        logging::linker_error(&self.name(), msg, tk.slice(line));
    }

    /// Report an error that has no useful source position
    pub fn simple_error(&self, ctx: &Context, msg: &str) {
        self.error.set(true);
        ctx.flag_error();
        logging::simple_error(&self.name(), msg);
    }

    /// Append an emitted word to the currently open section
    pub(crate) fn emit(&mut self, obj: ObjectLine) {
        let section = self.sections.last_mut().expect("no open section");
        section.lines.push(obj);
    }

    fn add_symbol(&mut self, line: usize, token: Token, address: u16) {
        self.symbols.push(Symbol {
            address,
            line,
            token,
        });
    }

    /// Store one source line, truncating over-long lines with a marker
    fn push_line(&mut self, ctx: &Context, mut line: String) {
        if line.len() > LINE_MAX {
            let mut cut = LINE_MAX;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
            line.push_str(" ...");
            let tk = Token::new(0, line.len());
            self.lines.push(line);
            self.token_error(
                ctx,
                self.lines.len() - 1,
                tk,
                "line longer than maximum allowed length",
                false,
            );
            return;
        }
        self.lines.push(line);
    }

    /// Split source text into the unit's line buffer, dropping comments
    /// and trailing spaces
    pub fn scan_source(&mut self, ctx: &Context, text: &str) {
        for raw in text.split('\n') {
            let uncommented = match raw.find(';') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            self.push_line(ctx, uncommented.trim_end_matches(' ').to_string());
        }
        // A trailing newline is not an extra empty source line
        if self.lines.last().is_some_and(|line| line.is_empty()) {
            self.lines.pop();
        }
    }

    fn read_source(&mut self, ctx: &Context) {
        match fs::read_to_string(&self.filename) {
            Ok(text) => self.scan_source(ctx, &text),
            Err(_) => self.simple_error(ctx, "failed to open file"),
        }
    }

    /// Parse and encode every line, then sort the symbol table and report
    /// duplicate labels. Parsing stops after the first line that errored.
    pub fn objectify(&mut self, ctx: &Context) {
        let mut addr: Option<u16> = None;

        for line_no in 0..self.lines.len() {
            if self.error.get() {
                break;
            }
            self.process_line(ctx, line_no, &mut addr);
        }

        let Unit { lines, symbols, .. } = self;
        symbols::sort(symbols, lines);

        for i in 1..self.symbols.len() {
            let (prev, cur) = (self.symbols[i - 1], self.symbols[i]);
            if symbols::token_case_cmp(
                cur.token,
                &self.lines[cur.line],
                prev.token,
                &self.lines[prev.line],
            ) == Ordering::Equal
            {
                self.token_error(ctx, cur.line, cur.token, "redefinition of label", true);
            }
        }
    }

    fn process_line(&mut self, ctx: &Context, line_no: usize, addr: &mut Option<u16>) {
        let line = self.lines[line_no].clone();

        let first = token::next_token(0, &line);
        if !first.is_valid(&line) {
            return;
        }

        let (label, mnemonic, entry) = match catalog::lookup(first, &line) {
            Some(entry) => (None, first, entry),
            None => {
                // The leading token is a label; it defines a symbol even
                // when malformed, so one bad label yields one error
                self.add_symbol(line_no, first, addr.unwrap_or(0));

                match token::classify(first, &line) {
                    TokenType::Pseud => {
                        self.token_error(ctx, line_no, first, "invalid assembler directive", true)
                    }
                    TokenType::Num => {
                        self.token_error(ctx, line_no, first, "label can't be number", true)
                    }
                    TokenType::Reg => {
                        self.token_error(ctx, line_no, first, "label can't be register", true)
                    }
                    _ => {}
                }

                let next = token::next_token(first.end(), &line);
                if !next.is_valid(&line) {
                    // Pure label line, nothing to emit
                    return;
                }

                match catalog::lookup(next, &line) {
                    Some(entry) => (Some(first), next, entry),
                    None => {
                        self.token_error(ctx, line_no, next, "invalid instruction", true);
                        return;
                    }
                }
            }
        };

        let mut args = [Token::EMPTY; 3];
        let mut tk = mnemonic;
        let mut bad_operand = false;

        for idx in 0..entry.argc {
            tk = token::next_token(tk.end(), &line);
            if !tk.is_valid(&line) {
                self.token_error(ctx, line_no, tk, "unexpected end of line", false);
                bad_operand = true;
            } else if token::classify(tk, &line).bit() & entry.args[idx] == 0 {
                self.token_error(ctx, line_no, tk, "unexpected token", true);
                bad_operand = true;
            }
            args[idx] = tk;
        }

        let extra = token::next_token(tk.end(), &line);
        if extra.is_valid(&line) {
            self.token_error(ctx, line_no, extra, "unexpected extra argument", true);
        }

        if bad_operand {
            return;
        }

        let stmt = Statement {
            line_no,
            line: &line,
            label,
            mnemonic,
            args,
            entry,
        };
        interpret_statement(self, ctx, &stmt, addr);
    }
}

/// Apply one validated statement to its unit, keeping the location counter
/// up to date. Everything except `.ORIG` needs an open section.
pub fn interpret_statement(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    if stmt.entry.op != catalog::Op::Orig && addr.is_none() {
        unit.token_error(
            ctx,
            stmt.line_no,
            stmt.mnemonic,
            "unable to determine address for token",
            true,
        );
        return;
    }

    match stmt.entry.kind {
        Kind::Assembly => instructions::encode(unit, ctx, stmt, addr),
        Kind::Directive => directives::interpret(unit, ctx, stmt, addr),
    }
}

/// Run one unit through its front half of the pipeline: object files are
/// read back in, source files are scanned, parsed and encoded
pub fn assemble_unit(unit: &mut Unit, ctx: &Context) {
    if crate::objfile::is_object_file(&unit.filename) {
        crate::objfile::read_unit(unit, ctx);
    } else {
        unit.read_source(ctx);
        if !unit.error.get() && !ctx.has_error() {
            unit.objectify(ctx);
        }
    }
}

/// Assemble every unit on its own worker thread and join them all
pub fn assemble_units(units: &mut [Unit], ctx: &Context) {
    thread::scope(|scope| {
        for unit in units.iter_mut() {
            scope.spawn(move || assemble_unit(unit, ctx));
        }
    });
}
