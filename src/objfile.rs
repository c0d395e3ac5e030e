//! The on-disk object, executable and symbol-table format
//!
//! Files open with the magic `LC3\x03` and a little-endian flag word, then
//! hold a stream of records: `'S'` symbol tables and `'A'` assembled
//! sections. Object files keep unresolved label text with every word so a
//! later link can finish them; executables store finished words only.
//! With debug embedding enabled, every word also carries its source text.

use crate::assembler::symbols::Symbol;
use crate::assembler::token::Token;
use crate::assembler::{Context, ObjectLine, ObjectSection, SourceRef, Unit};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"LC3\x03";

/// Flag-word bits, serialized into the header
pub const FLAG_OBJ: u32 = 0x0001;
pub const FLAG_EXC: u32 = 0x0002;
pub const FLAG_DBG: u32 = 0x0004;

/// In-memory request bits; never written to disk
pub const FLAG_HDR: u32 = 0x0001_0000;
pub const FLAG_SYM: u32 = 0x0002_0000;

const IND_SYM: u8 = b'S';
const IND_ASM: u8 = b'A';

/// An input is a pre-assembled object when it is named like one and opens
/// with the magic bytes
pub fn is_object_file(path: &Path) -> bool {
    if path.extension().is_none_or(|ext| ext != "obj") {
        return false;
    }
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).is_ok() && magic == *MAGIC
}

fn write_text<W: Write>(writer: &mut W, unit: &Unit, sref: SourceRef) -> io::Result<()> {
    if sref.token.len > 0 {
        writer.write_all(sref.token.slice(&unit.lines[sref.line]).as_bytes())?;
    }
    writer.write_u8(0)
}

/// Serialize one unit's records. The header and the record selection are
/// driven by `flags`; debug text rides along whenever the context asks
/// for it.
pub fn write_unit<W: Write>(
    writer: &mut W,
    unit: &Unit,
    mut flags: u32,
    ctx: &Context,
) -> io::Result<()> {
    if ctx.store_debug {
        flags |= FLAG_DBG;
    }

    if flags & FLAG_HDR != 0 {
        writer.write_all(MAGIC)?;
        writer.write_u16::<LittleEndian>(flags as u16)?;
    }

    if flags & FLAG_SYM != 0 && !unit.symbols.is_empty() {
        writer.write_u8(IND_SYM)?;
        writer.write_u32::<LittleEndian>(unit.symbols.len() as u32)?;

        for sym in &unit.symbols {
            writer.write_u16::<LittleEndian>(sym.address)?;
            writer.write_all(sym.token.slice(&unit.lines[sym.line]).as_bytes())?;
            writer.write_u8(0)?;
        }
    }

    if flags & (FLAG_OBJ | FLAG_EXC) == 0 {
        return Ok(());
    }

    for section in &unit.sections {
        writer.write_u8(IND_ASM)?;
        writer.write_u16::<LittleEndian>(section.origin)?;
        writer.write_u16::<LittleEndian>(section.lines.len() as u16)?;

        for obj in &section.lines {
            writer.write_u16::<LittleEndian>(obj.word)?;
            if flags & FLAG_OBJ != 0 {
                write_text(writer, unit, obj.label)?;
            }
            if flags & FLAG_DBG != 0 {
                write_text(writer, unit, obj.debug)?;
            }
        }
    }

    Ok(())
}

/// Write one relocatable object file: symbols plus unresolved sections
pub fn write_object<W: Write>(writer: &mut W, unit: &Unit, ctx: &Context) -> io::Result<()> {
    write_unit(writer, unit, FLAG_HDR | FLAG_OBJ | FLAG_SYM, ctx)
}

/// Append one unit's symbol records; the header goes in front of the
/// first unit only
pub fn write_symbols<W: Write>(
    writer: &mut W,
    unit: &Unit,
    header: bool,
    ctx: &Context,
) -> io::Result<()> {
    let flags = FLAG_SYM | if header { FLAG_HDR } else { 0 };
    write_unit(writer, unit, flags, ctx)
}

/// Write the linked executable: one header, then every unit's sections
pub fn write_executable<W: Write>(writer: &mut W, units: &[Unit], ctx: &Context) -> io::Result<()> {
    let mut flags = FLAG_HDR | FLAG_EXC;
    for unit in units {
        write_unit(writer, unit, flags, ctx)?;
        flags &= !FLAG_HDR;
    }
    Ok(())
}

pub fn write_object_file(path: &Path, unit: &Unit, ctx: &Context) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_object(&mut writer, unit, ctx)
}

pub fn write_symbol_file(path: &Path, units: &[Unit], ctx: &Context) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (idx, unit) in units.iter().enumerate() {
        write_symbols(&mut writer, unit, idx == 0, ctx)?;
    }
    Ok(())
}

pub fn write_executable_file(path: &Path, units: &[Unit], ctx: &Context) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_executable(&mut writer, units, ctx)
}

fn read_cstr<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    reader.read_until(0, &mut buf)?;
    if buf.pop() != Some(0) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "unterminated string",
        ));
    }
    String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string is not valid utf-8"))
}

/// Read a string that tokens must keep slicing: non-empty strings become
/// pseudo-lines of the unit, referenced by a `(start 0, len N)` token
fn read_ref<R: BufRead>(reader: &mut R, unit: &mut Unit) -> io::Result<SourceRef> {
    let text = read_cstr(reader)?;
    let sref = SourceRef::new(unit.lines.len(), Token::new(0, text.len()));
    if !text.is_empty() {
        unit.lines.push(text);
    }
    Ok(sref)
}

/// Reconstruct a unit from a serialized object or executable
pub fn read_unit(unit: &mut Unit, ctx: &Context) {
    if let Err(_err) = read_records(unit) {
        unit.simple_error(ctx, "failed to read object file");
    }
}

fn read_records(unit: &mut Unit) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(&unit.filename)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    let flags = reader.read_u16::<LittleEndian>()? as u32;

    loop {
        let indicator = match reader.read_u8() {
            Ok(byte) => byte,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        };

        match indicator {
            IND_SYM => {
                let count = reader.read_u32::<LittleEndian>()?;
                for _ in 0..count {
                    let address = reader.read_u16::<LittleEndian>()?;
                    let name = read_cstr(&mut reader)?;
                    unit.symbols.push(Symbol {
                        address,
                        line: unit.lines.len(),
                        token: Token::new(0, name.len()),
                    });
                    unit.lines.push(name);
                }
            }
            IND_ASM => {
                let origin = reader.read_u16::<LittleEndian>()?;
                let count = reader.read_u16::<LittleEndian>()?;
                let mut section = ObjectSection {
                    origin,
                    lines: Vec::with_capacity(count as usize),
                };

                for _ in 0..count {
                    let word = reader.read_u16::<LittleEndian>()?;
                    let label = if flags & FLAG_OBJ != 0 {
                        read_ref(&mut reader, unit)?
                    } else {
                        SourceRef::empty(unit.lines.len())
                    };
                    let debug = if flags & FLAG_DBG != 0 {
                        read_ref(&mut reader, unit)?
                    } else {
                        SourceRef::empty(unit.lines.len())
                    };
                    section.lines.push(ObjectLine { word, label, debug });
                }

                unit.sections.push(section);
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unknown record indicator",
                ));
            }
        }
    }

    Ok(())
}
