//! Machine-code generation for assembly statements, plus the link-time
//! PC-offset patching that completes label-referencing words

use super::catalog::Op;
use super::statement::Statement;
use super::token::{self, TokenType};
use super::{Context, ObjectLine, SourceRef, Unit};

/// Encode one assembly statement into its 16-bit word and append it to the
/// open section. Words whose operand is a label keep a reference for the
/// linker instead of a finished offset.
pub fn encode(unit: &mut Unit, ctx: &Context, stmt: &Statement, addr: &mut Option<u16>) {
    let mut obj = ObjectLine {
        word: 0,
        label: SourceRef::empty(stmt.line_no),
        debug: SourceRef::new(stmt.line_no, stmt.debug_span(ctx)),
    };

    match stmt.entry.op {
        Op::Add => {
            obj.word =
                0x1000 | stmt.register(0, 9) | stmt.register(1, 6) | second_source(unit, ctx, stmt);
        }
        Op::And => {
            obj.word =
                0x5000 | stmt.register(0, 9) | stmt.register(1, 6) | second_source(unit, ctx, stmt);
        }
        Op::Br => {
            obj.word = token::condition_codes(stmt.entry.name);
            obj.label.token = stmt.args[0];
        }
        Op::Jmp => {
            // RET is JMP through R7
            let base = if stmt.entry.argc == 0 {
                7 << 6
            } else {
                stmt.register(0, 6)
            };
            obj.word = 0xC000 | base;
        }
        Op::Jsr => {
            if stmt.entry.name == "JSR" {
                obj.word = 0x4800;
                obj.label.token = stmt.args[0];
            } else {
                obj.word = 0x4000 | stmt.register(0, 6);
            }
        }
        Op::Ld | Op::Ldi | Op::Lea | Op::St | Op::Sti => {
            let opcode = match stmt.entry.op {
                Op::Ld => 0x2000,
                Op::Ldi => 0xA000,
                Op::Lea => 0xE000,
                Op::St => 0x3000,
                _ => 0xB000,
            };
            obj.word = opcode | stmt.register(0, 9);
            obj.label.token = stmt.args[1];
        }
        Op::Ldr | Op::Str => {
            let opcode = if stmt.entry.op == Op::Ldr { 0x6000 } else { 0x7000 };
            let offset = stmt.number(2);
            if !(-32..=31).contains(&offset) {
                unit.token_error(
                    ctx,
                    stmt.line_no,
                    stmt.args[2],
                    "can't convert to 6-bit signed integer",
                    true,
                );
            }
            obj.word =
                opcode | stmt.register(0, 9) | stmt.register(1, 6) | ((offset as u16) & 0x003F);
        }
        Op::Not => {
            obj.word = 0x903F | stmt.register(0, 9) | stmt.register(1, 6);
        }
        Op::Rti => {
            obj.word = 0x8000;
        }
        Op::Trap => {
            obj.word = trap_vector(stmt);
        }
        // Directives never reach the instruction encoder
        _ => return,
    }

    unit.emit(obj);
    *addr = addr.map(|a| a.wrapping_add(1));
}

/// ADD/AND second source: a register, or a 5-bit signed immediate
fn second_source(unit: &Unit, ctx: &Context, stmt: &Statement) -> u16 {
    if token::classify(stmt.args[2], stmt.line) == TokenType::Reg {
        return stmt.register(2, 0);
    }

    let imm = stmt.number(2);
    if !(-16..=15).contains(&imm) {
        unit.token_error(
            ctx,
            stmt.line_no,
            stmt.args[2],
            "can't convert to 5-bit signed integer",
            true,
        );
    }
    0x0020 | ((imm as u16) & 0x001F)
}

fn trap_vector(stmt: &Statement) -> u16 {
    if stmt.entry.argc > 0 {
        return 0xF000 | ((stmt.number(0) as u16) & 0x00FF);
    }
    match stmt.entry.name {
        "GETC" => 0xF020,
        "OUT" | "PUTC" => 0xF021,
        "PUTS" => 0xF022,
        "IN" => 0xF023,
        "PUTSP" => 0xF024,
        _ => 0xF025, // HALT
    }
}

/// Combine a resolved label address into a PC-relative word. `pc` is the
/// address of the instruction itself; the offset is relative to the
/// incremented PC and must fit the family's field width.
pub fn patch_offset(unit: &Unit, ctx: &Context, obj: &mut ObjectLine, pc: u16, target: u16) {
    let offset = target as i32 - pc as i32 - 1;

    match obj.word >> 12 {
        // JSR
        0x4 => {
            if !(-1024..=1023).contains(&offset) {
                unit.linker_error(
                    ctx,
                    "offset larger than allowed [-1024, 1023] for label",
                    obj.label.token,
                    obj.label.line,
                );
            }
            obj.word |= (offset as u16) & 0x07FF;
        }
        // BR, LD, LDI, LEA, ST, STI
        0x0 | 0x2 | 0xA | 0xE | 0x3 | 0xB => {
            if !(-256..=255).contains(&offset) {
                unit.linker_error(
                    ctx,
                    "offset larger than allowed [-256, 255] for label",
                    obj.label.token,
                    obj.label.line,
                );
            }
            obj.word |= (offset as u16) & 0x01FF;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::token::Token;
    use std::path::PathBuf;

    fn line_with(word: u16) -> ObjectLine {
        ObjectLine {
            word,
            label: SourceRef {
                line: 0,
                token: Token::new(0, 3),
            },
            debug: SourceRef::empty(0),
        }
    }

    fn fixture() -> (Unit, Context) {
        let mut unit = Unit::new(PathBuf::from("test.asm"));
        unit.lines.push("FOO".to_string());
        (unit, Context::new(None, false, false))
    }

    #[test]
    fn patches_backward_offset9() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0x0E00);
        patch_offset(&unit, &ctx, &mut obj, 0x3000, 0x3000);
        assert_eq!(obj.word, 0x0FFF); // offset −1
        assert!(!unit.error.get());
    }

    #[test]
    fn patches_forward_offset11() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0x4800);
        patch_offset(&unit, &ctx, &mut obj, 0x3000, 0x3005);
        assert_eq!(obj.word, 0x4804);
        assert!(!unit.error.get());
    }

    #[test]
    fn rejects_offset9_out_of_range() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0xE000); // LEA
        patch_offset(&unit, &ctx, &mut obj, 0x3000, 0x3101);
        assert!(unit.error.get());
        assert!(ctx.has_error());
    }

    #[test]
    fn rejects_offset11_out_of_range() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0x4800);
        patch_offset(&unit, &ctx, &mut obj, 0x3400, 0x2F00);
        assert!(unit.error.get());
    }

    #[test]
    fn offset_boundaries_are_inclusive() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0x2000); // LD
        patch_offset(&unit, &ctx, &mut obj, 0x3100, 0x3001); // offset −256
        assert_eq!(obj.word, 0x2100);
        assert!(!unit.error.get());

        let mut obj = line_with(0x2000);
        patch_offset(&unit, &ctx, &mut obj, 0x3000, 0x3100); // offset 255
        assert_eq!(obj.word, 0x20FF);
        assert!(!unit.error.get());
    }

    #[test]
    fn non_relative_words_are_untouched() {
        let (unit, ctx) = fixture();
        let mut obj = line_with(0x903F);
        patch_offset(&unit, &ctx, &mut obj, 0x3000, 0x9000);
        assert_eq!(obj.word, 0x903F);
    }
}
