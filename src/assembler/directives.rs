//! Interpretation of assembler directives

use super::catalog::Op;
use super::statement::Statement;
use super::token::{self, Token};
use super::{Context, ObjectLine, ObjectSection, SourceRef, Unit};

pub fn interpret(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    match stmt.entry.op {
        Op::Orig => orig(unit, ctx, stmt, addr),
        Op::Blkw => blkw(unit, ctx, stmt, addr),
        Op::Fill => fill(unit, ctx, stmt, addr),
        Op::Stringz => stringz(unit, ctx, stmt, addr),
        Op::End => *addr = None,
        // Reserved; accepted but never emits or links
        Op::Extern => {}
        _ => {}
    }
}

/// `.ORIG n` opens a new object section at origin n
fn orig(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    if addr.is_some() {
        unit.token_error(
            ctx,
            stmt.line_no,
            stmt.mnemonic,
            "origin already set, use .END to end previous section",
            false,
        );
        return;
    }

    let origin = stmt.number(0) as u16;
    unit.sections.push(ObjectSection {
        origin,
        lines: Vec::new(),
    });
    *addr = Some(origin);
}

/// `.BLKW n` reserves n zeroed words
fn blkw(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    let count = stmt.number(0);
    if !(0..=u16::MAX as i32).contains(&count) {
        unit.token_error(ctx, stmt.line_no, stmt.args[0], "invalid allocation size", false);
        return;
    }

    let mut debug = stmt.debug_span(ctx);
    for _ in 0..count {
        unit.emit(ObjectLine {
            word: 0,
            label: SourceRef::empty(stmt.line_no),
            debug: SourceRef::new(stmt.line_no, debug),
        });
        debug = Token::EMPTY;
    }

    *addr = addr.map(|a| a.wrapping_add(count as u16));
}

/// `.FILL n` emits one word holding n
fn fill(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    unit.emit(ObjectLine {
        word: stmt.number(0) as u16,
        label: SourceRef::empty(stmt.line_no),
        debug: SourceRef::new(stmt.line_no, stmt.debug_span(ctx)),
    });
    *addr = addr.map(|a| a.wrapping_add(1));
}

/// `.STRINGZ s` emits one word per byte of the literal plus a zero word
fn stringz(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    let literal = token::string_literal(stmt.args[0], stmt.line);

    let mut debug = stmt.debug_span(ctx);
    for word in literal.iter().map(|&b| b as u16).chain(std::iter::once(0)) {
        unit.emit(ObjectLine {
            word,
            label: SourceRef::empty(stmt.line_no),
            debug: SourceRef::new(stmt.line_no, debug),
        });
        debug = Token::EMPTY;
    }

    *addr = addr.map(|a| a.wrapping_add(literal.len() as u16).wrapping_add(1));
}
