//! Symbol tables: label definitions sorted for binary search and
//! duplicate detection
//!
//! A symbol never stores its name; the name is recovered by slicing the
//! defining line with the definition token. All comparisons are
//! case-insensitive on the recovered text.

use super::Unit;
use super::token::Token;
use std::cmp::Ordering;

/// A label definition: its address and where in the unit it was defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub address: u16,
    pub line: usize,
    pub token: Token,
}

/// A symbol paired with the index of the unit that defined it; the form
/// used by the combined link-time table
#[derive(Debug, Clone, Copy)]
pub struct GlobalSymbol {
    pub unit: usize,
    pub symbol: Symbol,
}

/// Case-insensitive comparison of two token texts, each sliced from its
/// own line
pub fn token_case_cmp(t1: Token, s1: &str, t2: Token, s2: &str) -> Ordering {
    let a = t1.slice(s1).as_bytes();
    let b = t2.slice(s2).as_bytes();

    for (&x, &y) in a.iter().zip(b.iter()) {
        let ord = x.to_ascii_uppercase().cmp(&y.to_ascii_uppercase());
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Sort a unit's own table by (name, defining line)
pub fn sort(symbols: &mut [Symbol], lines: &[String]) {
    symbols.sort_by(|a, b| {
        token_case_cmp(a.token, &lines[a.line], b.token, &lines[b.line])
            .then(a.line.cmp(&b.line))
    });
}

/// Sort the combined table by (name, unit, defining line)
pub fn sort_global(table: &mut [GlobalSymbol], units: &[Unit]) {
    table.sort_by(|a, b| {
        token_case_cmp(
            a.symbol.token,
            &units[a.unit].lines[a.symbol.line],
            b.symbol.token,
            &units[b.unit].lines[b.symbol.line],
        )
        .then(a.unit.cmp(&b.unit))
        .then(a.symbol.line.cmp(&b.symbol.line))
    });
}

/// Binary search of the sorted combined table for the symbol named by a
/// token; returns its address when found
pub fn find(table: &[GlobalSymbol], units: &[Unit], tk: Token, line: &str) -> Option<u16> {
    table
        .binary_search_by(|probe| {
            token_case_cmp(
                probe.symbol.token,
                &units[probe.unit].lines[probe.symbol.line],
                tk,
                line,
            )
        })
        .ok()
        .map(|idx| table[idx].symbol.address)
}
