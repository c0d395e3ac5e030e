//! Links assembled units into one executable image: merges symbol tables,
//! resolves PC-relative label references and verifies that no two object
//! sections claim the same addresses
//!
//! Linking runs single-threaded after every per-unit worker has joined,
//! and only when no unit reported an error.

use crate::assembler::symbols::{self, GlobalSymbol};
use crate::assembler::token::Token;
use crate::assembler::{Context, ObjectSection, Unit, instructions};
use std::cmp::Ordering;
use std::mem;

/// The address span of one linked section, kept for overlap checking
#[derive(Debug, Clone, Copy)]
struct Interval {
    start: u16,
    end: u32,
    unit: usize,
}

/// Resolve every label reference in every unit and check the combined
/// address layout
pub fn link_units(units: &mut [Unit], ctx: &Context) {
    let mut combined: Vec<GlobalSymbol> = units
        .iter()
        .enumerate()
        .flat_map(|(idx, unit)| {
            unit.symbols
                .iter()
                .map(move |&symbol| GlobalSymbol { unit: idx, symbol })
        })
        .collect();

    symbols::sort_global(&mut combined, units);

    // After sorting, cross-unit redefinitions sit next to each other
    for i in 1..combined.len() {
        let (prev, cur) = (combined[i - 1], combined[i]);
        let equal = symbols::token_case_cmp(
            cur.symbol.token,
            &units[cur.unit].lines[cur.symbol.line],
            prev.symbol.token,
            &units[prev.unit].lines[prev.symbol.line],
        ) == Ordering::Equal;

        if equal {
            units[cur.unit].linker_error(ctx, "redefinition of label", cur.symbol.token, cur.symbol.line);
            units[prev.unit].linker_error(ctx, "first defined here", prev.symbol.token, prev.symbol.line);
        }
    }

    let mut intervals = Vec::new();
    for idx in 0..units.len() {
        let mut sections = mem::take(&mut units[idx].sections);
        resolve_unit(units, idx, &mut sections, &combined, ctx, &mut intervals);
        units[idx].sections = sections;
    }

    intervals.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    for i in 1..intervals.len() {
        let (prev, cur) = (intervals[i - 1], intervals[i]);
        if cur.start as u32 <= prev.end {
            let msg = format!(
                "code overlap with \"{}\" at address x{:04X}",
                units[prev.unit].filename.display(),
                cur.start
            );
            units[cur.unit].simple_error(ctx, &msg);
        }
    }
}

fn resolve_unit(
    units: &[Unit],
    idx: usize,
    sections: &mut [ObjectSection],
    combined: &[GlobalSymbol],
    ctx: &Context,
    intervals: &mut Vec<Interval>,
) {
    let unit = &units[idx];

    for section in sections.iter_mut() {
        let mut pc = section.origin;
        let mut count = 0u32;

        for obj in section.lines.iter_mut() {
            if unit.error.get() {
                break;
            }

            if obj.label.token.len != 0 {
                let line = unit.lines.get(obj.label.line).map(String::as_str).unwrap_or("");
                match symbols::find(combined, units, obj.label.token, line) {
                    None => unit.linker_error(
                        ctx,
                        "unable to determine address for label",
                        obj.label.token,
                        obj.label.line,
                    ),
                    Some(target) => {
                        instructions::patch_offset(unit, ctx, obj, pc, target);
                        obj.label.token = Token::EMPTY;
                    }
                }
            }

            pc = pc.wrapping_add(1);
            count += 1;
        }

        if count > 0 {
            intervals.push(Interval {
                start: section.origin,
                end: section.origin as u32 + count,
                unit: idx,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit_from(name: &str, source: &str, ctx: &Context) -> Unit {
        let mut unit = Unit::new(PathBuf::from(name));
        unit.scan_source(ctx, source);
        unit.objectify(ctx);
        assert!(!unit.error.get(), "assembly of {name} failed");
        unit
    }

    fn link(sources: &[&str]) -> (Vec<Unit>, Context) {
        let ctx = Context::new(None, false, false);
        let mut units: Vec<Unit> = sources
            .iter()
            .enumerate()
            .map(|(i, src)| unit_from(&format!("unit{i}.asm"), src, &ctx))
            .collect();
        link_units(&mut units, &ctx);
        (units, ctx)
    }

    fn words(unit: &Unit) -> Vec<u16> {
        unit.sections[0].lines.iter().map(|l| l.word).collect()
    }

    #[test]
    fn resolves_backward_branch() {
        let (units, ctx) = link(&[".ORIG x3000\nLOOP BRnzp LOOP\n.END"]);
        assert!(!ctx.has_error());
        assert_eq!(words(&units[0]), vec![0x0FFF]);
        assert_eq!(units[0].symbols[0].address, 0x3000);
        // The reference is cleared once resolved
        assert_eq!(units[0].sections[0].lines[0].label.token.len, 0);
    }

    #[test]
    fn resolves_lea_over_halt_into_string() {
        let (units, ctx) =
            link(&[".ORIG x3000\nLEA R0, MSG\nHALT\nMSG .STRINGZ \"HI\"\n.END"]);
        assert!(!ctx.has_error());
        assert_eq!(
            words(&units[0]),
            vec![0xE001, 0xF025, b'H' as u16, b'I' as u16, 0]
        );
    }

    #[test]
    fn resolves_labels_across_units() {
        let (units, ctx) = link(&[
            ".ORIG x3000\nLD R1, SHARED\n.END",
            ".ORIG x3100\nSHARED .FILL x1234\n.END",
        ]);
        assert!(!ctx.has_error());
        // offset = 0x3100 − 0x3001 = 0xFF
        assert_eq!(words(&units[0]), vec![0x22FF]);
    }

    #[test]
    fn symbol_lookup_ignores_case() {
        let (units, ctx) = link(&[".ORIG x3000\nBRnzp tArGeT\nTARGET HALT\n.END"]);
        assert!(!ctx.has_error());
        assert_eq!(words(&units[0])[0], 0x0E00);
    }

    #[test]
    fn reports_unresolved_label() {
        let (units, ctx) = link(&[".ORIG x3000\nBRnzp NOWHERE\n.END"]);
        assert!(ctx.has_error());
        assert!(units[0].error.get());
    }

    #[test]
    fn reports_cross_unit_redefinition() {
        let (units, ctx) = link(&[
            ".ORIG x3000\nCOMMON .FILL x0\n.END",
            ".ORIG x3100\ncommon .FILL x0\n.END",
        ]);
        assert!(ctx.has_error());
        assert!(units[0].error.get());
        assert!(units[1].error.get());
    }

    #[test]
    fn reports_offset9_too_far() {
        let (units, ctx) = link(&[
            ".ORIG x3000\nBRnzp FAR\n.END\n.ORIG x4000\nFAR .FILL x0\n.END",
        ]);
        assert!(ctx.has_error());
        assert!(units[0].error.get());
    }

    #[test]
    fn reports_overlap_between_units() {
        let (units, ctx) = link(&[
            ".ORIG x3000\nFOO .FILL x0\n.END",
            ".ORIG x3000\nBAR .FILL x0\n.END",
        ]);
        assert!(ctx.has_error());
        assert!(units[1].error.get());
    }

    #[test]
    fn reports_overlap_within_one_unit() {
        let (_units, ctx) = link(&[
            ".ORIG x3000\n.BLKW 4\n.END\n.ORIG x3002\n.FILL x1\n.END",
        ]);
        assert!(ctx.has_error());
    }

    #[test]
    fn disjoint_sections_link_cleanly() {
        let (_units, ctx) = link(&[
            ".ORIG x3000\n.FILL x1\n.END",
            ".ORIG x4000\n.FILL x2\n.END",
        ]);
        assert!(!ctx.has_error());
    }
}
