//! A multi-file assembler and linker for the LC-3 architecture, featuring:
//! - parallel per-unit assembly
//! - relocatable object files and symbol-table dumps
//! - link-time resolution of PC-relative references across files

pub mod assembler;
pub mod linker;
pub mod logging;
pub mod objfile;
