//! Tree node kinds and the slot legality table
//!
//! Every node has exactly one kind, fixed at creation. Each kind declares
//! the subset of slots it may carry; the table in [`slots`] is the single
//! authority consulted by every accessor.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a tree node
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u16)]
pub enum Kind {
    // Top-level units
    Entity,
    Arch,
    Package,
    PackBody,
    Elab,

    // Declarations
    PortDecl,
    SignalDecl,
    VarDecl,
    ConstDecl,
    TypeDecl,
    UnitDecl,
    EnumLit,
    FuncDecl,
    FuncBody,
    ProcDecl,
    ProcBody,
    Alias,
    FieldDecl,
    Library,

    // Expressions
    Fcall,
    Literal,
    Ref,
    Qualified,
    Aggregate,
    AttrRef,
    ArrayRef,
    ArraySlice,
    RecordRef,
    TypeConv,
    Open,
    All,

    // Sequential statements
    Process,
    Wait,
    VarAssign,
    SignalAssign,
    Assert,
    If,
    Case,
    While,
    For,
    Null,
    Return,
    Block,
    Pcall,

    // Concurrent statements
    Cassign,
    Cassert,
    Cpcall,
    Select,
    IfGenerate,
    Instance,
    Binding,

    // Miscellaneous
    Waveform,
    Use,
    Context,
    CtxRef,
}

const ALL_KINDS: [Kind; 55] = [
    Kind::Entity,
    Kind::Arch,
    Kind::Package,
    Kind::PackBody,
    Kind::Elab,
    Kind::PortDecl,
    Kind::SignalDecl,
    Kind::VarDecl,
    Kind::ConstDecl,
    Kind::TypeDecl,
    Kind::UnitDecl,
    Kind::EnumLit,
    Kind::FuncDecl,
    Kind::FuncBody,
    Kind::ProcDecl,
    Kind::ProcBody,
    Kind::Alias,
    Kind::FieldDecl,
    Kind::Library,
    Kind::Fcall,
    Kind::Literal,
    Kind::Ref,
    Kind::Qualified,
    Kind::Aggregate,
    Kind::AttrRef,
    Kind::ArrayRef,
    Kind::ArraySlice,
    Kind::RecordRef,
    Kind::TypeConv,
    Kind::Open,
    Kind::All,
    Kind::Process,
    Kind::Wait,
    Kind::VarAssign,
    Kind::SignalAssign,
    Kind::Assert,
    Kind::If,
    Kind::Case,
    Kind::While,
    Kind::For,
    Kind::Null,
    Kind::Return,
    Kind::Block,
    Kind::Pcall,
    Kind::Cassign,
    Kind::Cassert,
    Kind::Cpcall,
    Kind::Select,
    Kind::IfGenerate,
    Kind::Instance,
    Kind::Binding,
    Kind::Waveform,
    Kind::Use,
    Kind::Context,
    Kind::CtxRef,
];

impl Kind {
    /// Ordinal used in the serialized form
    pub fn ordinal(self) -> u16 {
        self as u16
    }

    /// Inverse of [`Kind::ordinal`]
    pub fn from_ordinal(v: u16) -> Option<Kind> {
        ALL_KINDS.get(v as usize).copied()
    }

    /// Roots for garbage collection and the unit of compilation
    pub fn is_top_level(self) -> bool {
        matches!(
            self,
            Kind::Entity | Kind::Arch | Kind::Package | Kind::PackBody | Kind::Elab
        )
    }

    pub fn is_decl(self) -> bool {
        matches!(
            self,
            Kind::PortDecl
                | Kind::SignalDecl
                | Kind::VarDecl
                | Kind::ConstDecl
                | Kind::TypeDecl
                | Kind::UnitDecl
                | Kind::FuncDecl
                | Kind::FuncBody
                | Kind::ProcDecl
                | Kind::ProcBody
                | Kind::Alias
                | Kind::FieldDecl
                | Kind::Library
        )
    }

    pub fn is_expr(self) -> bool {
        matches!(
            self,
            Kind::Fcall
                | Kind::Literal
                | Kind::Ref
                | Kind::Qualified
                | Kind::Aggregate
                | Kind::AttrRef
                | Kind::ArrayRef
                | Kind::ArraySlice
                | Kind::RecordRef
                | Kind::TypeConv
                | Kind::Open
                | Kind::All
        )
    }

    /// Sequential or concurrent statement kinds
    pub fn is_stmt(self) -> bool {
        matches!(
            self,
            Kind::Process
                | Kind::Wait
                | Kind::VarAssign
                | Kind::SignalAssign
                | Kind::Assert
                | Kind::If
                | Kind::Case
                | Kind::While
                | Kind::For
                | Kind::Null
                | Kind::Return
                | Kind::Block
                | Kind::Pcall
                | Kind::Cassign
                | Kind::Cassert
                | Kind::Cpcall
                | Kind::Select
                | Kind::IfGenerate
                | Kind::Instance
        )
    }

    /// Subprogram declaration or body
    pub fn is_subprogram(self) -> bool {
        matches!(
            self,
            Kind::FuncDecl | Kind::FuncBody | Kind::ProcDecl | Kind::ProcBody
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

bitflags! {
    /// Slots a node kind may carry
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct SlotMask: u32 {
        const IDENT      = 1 << 0;
        const IDENT2     = 1 << 1;
        const PORTS      = 1 << 2;
        const GENERICS   = 1 << 3;
        const DECLS      = 1 << 4;
        const STMTS      = 1 << 5;
        const ELSE_STMTS = 1 << 6;
        const TRIGGERS   = 1 << 7;
        const WAVEFORMS  = 1 << 8;
        const DRIVERS    = 1 << 9;
        const CONTEXTS   = 1 << 10;
        const PARAMS     = 1 << 11;
        const GENMAPS    = 1 << 12;
        const ASSOCS     = 1 << 13;
        const TARGET     = 1 << 14;
        const VALUE      = 1 << 15;
        const DELAY      = 1 << 16;
        const MESSAGE    = 1 << 17;
        const SEVERITY   = 1 << 18;
        const REF        = 1 << 19;
        const NAME       = 1 << 20;
        const SPEC       = 1 << 21;
        const REJECT     = 1 << 22;
        const GUARD      = 1 << 23;
        const RANGE      = 1 << 24;
        const TYPE       = 1 << 25;
        const LITERAL    = 1 << 26;
    }
}

/// The slot set a kind declares
///
/// This table is authoritative: an accessor for a slot outside the
/// returned mask is a program bug and panics.
pub fn slots(kind: Kind) -> SlotMask {
    use Kind::*;
    match kind {
        Entity => {
            SlotMask::IDENT
                | SlotMask::PORTS
                | SlotMask::GENERICS
                | SlotMask::DECLS
                | SlotMask::STMTS
                | SlotMask::CONTEXTS
        }
        Arch => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::DECLS
                | SlotMask::STMTS
                | SlotMask::CONTEXTS
        }
        Package => SlotMask::IDENT | SlotMask::DECLS | SlotMask::CONTEXTS,
        PackBody => SlotMask::IDENT | SlotMask::DECLS | SlotMask::CONTEXTS,
        Elab => SlotMask::IDENT | SlotMask::DECLS | SlotMask::STMTS,

        PortDecl => SlotMask::IDENT | SlotMask::TYPE | SlotMask::VALUE,
        SignalDecl => SlotMask::IDENT | SlotMask::TYPE | SlotMask::VALUE | SlotMask::DRIVERS,
        VarDecl => SlotMask::IDENT | SlotMask::TYPE | SlotMask::VALUE,
        ConstDecl => SlotMask::IDENT | SlotMask::TYPE | SlotMask::VALUE,
        TypeDecl => SlotMask::IDENT | SlotMask::TYPE,
        UnitDecl => SlotMask::IDENT | SlotMask::TYPE | SlotMask::VALUE,
        EnumLit => SlotMask::IDENT | SlotMask::TYPE,
        FuncDecl => SlotMask::IDENT | SlotMask::IDENT2 | SlotMask::PORTS | SlotMask::TYPE,
        FuncBody => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::PORTS
                | SlotMask::DECLS
                | SlotMask::STMTS
                | SlotMask::TYPE
        }
        ProcDecl => SlotMask::IDENT | SlotMask::IDENT2 | SlotMask::PORTS,
        ProcBody => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::PORTS
                | SlotMask::DECLS
                | SlotMask::STMTS
        }
        Alias => SlotMask::IDENT | SlotMask::VALUE | SlotMask::TYPE,
        FieldDecl => SlotMask::IDENT | SlotMask::TYPE,
        Library => SlotMask::IDENT | SlotMask::IDENT2,

        Fcall => SlotMask::IDENT | SlotMask::PARAMS | SlotMask::TYPE | SlotMask::REF,
        Literal => SlotMask::IDENT | SlotMask::TYPE | SlotMask::REF | SlotMask::LITERAL,
        Ref => SlotMask::IDENT | SlotMask::TYPE | SlotMask::REF,
        Qualified => SlotMask::IDENT | SlotMask::VALUE | SlotMask::TYPE,
        Aggregate => SlotMask::ASSOCS | SlotMask::TYPE,
        AttrRef => {
            SlotMask::IDENT | SlotMask::NAME | SlotMask::PARAMS | SlotMask::VALUE | SlotMask::TYPE
        }
        ArrayRef => SlotMask::VALUE | SlotMask::PARAMS | SlotMask::TYPE,
        ArraySlice => SlotMask::VALUE | SlotMask::RANGE | SlotMask::TYPE,
        RecordRef => SlotMask::IDENT | SlotMask::VALUE | SlotMask::TYPE,
        TypeConv => SlotMask::IDENT | SlotMask::VALUE | SlotMask::TYPE,
        Open => SlotMask::TYPE,
        All => SlotMask::empty(),

        Process => SlotMask::IDENT | SlotMask::DECLS | SlotMask::STMTS | SlotMask::TRIGGERS,
        Wait => SlotMask::IDENT | SlotMask::DELAY | SlotMask::VALUE | SlotMask::TRIGGERS,
        VarAssign => SlotMask::IDENT | SlotMask::TARGET | SlotMask::VALUE,
        SignalAssign => {
            SlotMask::IDENT | SlotMask::TARGET | SlotMask::WAVEFORMS | SlotMask::REJECT
        }
        Assert => SlotMask::IDENT | SlotMask::VALUE | SlotMask::MESSAGE | SlotMask::SEVERITY,
        If => SlotMask::IDENT | SlotMask::VALUE | SlotMask::STMTS | SlotMask::ELSE_STMTS,
        Case => SlotMask::IDENT | SlotMask::VALUE | SlotMask::ASSOCS,
        While => SlotMask::IDENT | SlotMask::VALUE | SlotMask::STMTS,
        For => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::DECLS
                | SlotMask::STMTS
                | SlotMask::RANGE
        }
        Null => SlotMask::IDENT,
        Return => SlotMask::IDENT | SlotMask::VALUE,
        Block => {
            SlotMask::IDENT
                | SlotMask::PORTS
                | SlotMask::GENERICS
                | SlotMask::DECLS
                | SlotMask::STMTS
                | SlotMask::PARAMS
                | SlotMask::GENMAPS
        }
        Pcall => SlotMask::IDENT | SlotMask::IDENT2 | SlotMask::REF | SlotMask::PARAMS,

        Cassign => {
            SlotMask::IDENT
                | SlotMask::TARGET
                | SlotMask::WAVEFORMS
                | SlotMask::GUARD
                | SlotMask::REJECT
        }
        Cassert => SlotMask::IDENT | SlotMask::VALUE | SlotMask::MESSAGE | SlotMask::SEVERITY,
        Cpcall => SlotMask::IDENT | SlotMask::IDENT2 | SlotMask::REF | SlotMask::PARAMS,
        Select => {
            SlotMask::IDENT
                | SlotMask::VALUE
                | SlotMask::TARGET
                | SlotMask::ASSOCS
                | SlotMask::GUARD
        }
        IfGenerate => SlotMask::IDENT | SlotMask::VALUE | SlotMask::DECLS | SlotMask::STMTS,
        Instance => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::REF
                | SlotMask::PARAMS
                | SlotMask::GENMAPS
                | SlotMask::SPEC
        }
        Binding => {
            SlotMask::IDENT
                | SlotMask::IDENT2
                | SlotMask::REF
                | SlotMask::PARAMS
                | SlotMask::GENMAPS
        }

        Waveform => SlotMask::VALUE | SlotMask::DELAY,
        Use => SlotMask::IDENT | SlotMask::REF,
        Context => SlotMask::IDENT | SlotMask::CONTEXTS,
        CtxRef => SlotMask::IDENT | SlotMask::REF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(Kind::from_ordinal(kind.ordinal()), Some(kind));
        }
        assert_eq!(Kind::from_ordinal(ALL_KINDS.len() as u16), None);
    }

    #[test]
    fn classification_is_consistent() {
        for kind in ALL_KINDS {
            // Nothing is simultaneously a declaration and an expression
            assert!(!(kind.is_decl() && kind.is_expr()), "{kind}");
        }

        assert!(Kind::Arch.is_top_level());
        assert!(Kind::ConstDecl.is_decl());
        assert!(Kind::Fcall.is_expr());
        assert!(Kind::SignalAssign.is_stmt());
        assert!(Kind::Cassign.is_stmt());
        assert!(!Kind::Waveform.is_stmt());
    }

    #[test]
    fn slot_table_spot_checks() {
        assert!(slots(Kind::If).contains(SlotMask::ELSE_STMTS));
        assert!(!slots(Kind::While).contains(SlotMask::ELSE_STMTS));

        assert!(slots(Kind::Instance).contains(SlotMask::GENMAPS));
        assert!(slots(Kind::Binding).contains(SlotMask::GENMAPS));
        assert!(slots(Kind::Block).contains(SlotMask::GENMAPS));
        assert!(!slots(Kind::Entity).contains(SlotMask::GENMAPS));

        assert!(slots(Kind::SignalDecl).contains(SlotMask::DRIVERS));
        assert!(slots(Kind::Wait).contains(SlotMask::TRIGGERS));
        assert!(slots(Kind::Wait).contains(SlotMask::DELAY));
        assert!(slots(Kind::Waveform).contains(SlotMask::DELAY));
    }

    #[test]
    fn else_stmts_only_on_if() {
        for kind in ALL_KINDS {
            if slots(kind).contains(SlotMask::ELSE_STMTS) {
                assert_eq!(kind, Kind::If);
            }
        }
    }
}
