//! Diagnostics and source-location tracking for the larch front-end
//!
//! This crate handles:
//! - Packed 64-bit source locations and the interned file registry
//! - Location persistence alongside serialized IR
//! - Coalesced multi-hint diagnostics with source-line rendering

pub mod diag;
pub mod loc;

pub use diag::{DiagConfig, Diagnostic, Reporter, Severity};
pub use loc::{FileRef, Loc, LocReader, LocWriter, SourceMap};
