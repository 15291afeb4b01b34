//! Tree IR for the larch front-end
//!
//! This crate handles:
//! - The heterogeneous node store: kinds, slots, and checked accessors
//! - Structural traversal, post-order rewriting and deep copy
//! - Mark-and-sweep reclamation rooted at top-level design units
//! - Round-trip serialization with back-references and a shared type table

pub mod arena;
pub mod build;
pub mod eq;
pub mod kind;
pub mod node;
pub mod serialize;
pub mod types;

mod copy;
mod rewrite;
mod visit;

pub use arena::Arena;
pub use eq::structural_eq;
pub use kind::{slots, Kind, SlotMask};
pub use node::{
    Assoc, AttrKind, BuiltinOp, Choice, Class, Flags, Literal, NodeId, Param, PortMode, Range,
    RangeKind, SubprogKind,
};
pub use serialize::{TreeReader, TreeWriter};
pub use types::{Type, TypeData, TypeKind};
