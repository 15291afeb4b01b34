//! Shared low-level services for the larch front-end
//!
//! This crate provides:
//! - Identifier interning with pointer-style equality
//! - The `fbuf` binary stream used by the IR and location serializers

pub mod fbuf;
pub mod ident;

pub use fbuf::{FbufError, FbufReader, FbufWriter};
pub use ident::Ident;
