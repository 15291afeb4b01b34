//! Narrow interface to the constant-folding evaluator
//!
//! The pass asks the lowerer for an opaque [`Thunk`] covering an
//! expression, hands it to [`Exec::fold`], and replaces the expression
//! with the literal that comes back. In the full toolchain the thunk is
//! a byte-code unit; here it is backed by the reference interpreter in
//! [`crate::interp`], which plays the same role behind the same surface.

use bitflags::bitflags;

use larch_base::Ident;
use larch_tree::{Arena, Kind, NodeId};

bitflags! {
    /// Evaluator behaviour flags
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct EvalFlags: u32 {
        /// Calls to user-defined functions may be folded
        const FCALL = 1 << 0;
        /// Explain why an expression cannot be folded
        const WARN  = 1 << 1;
    }
}

pub(crate) enum ThunkKind {
    /// A lowered expression
    Expr(NodeId),
    /// A lowered subprogram body, produced on demand for calls
    Body(NodeId),
}

/// Opaque unit of lowered code
pub struct Thunk(pub(crate) ThunkKind);

impl Thunk {
    pub(crate) fn body(decl: NodeId) -> Thunk {
        Thunk(ThunkKind::Body(decl))
    }
}

/// Lower an expression for folding
///
/// Returns `None` when no code can be produced for the expression, in
/// which case the caller keeps the original node.
pub fn lower_thunk(arena: &Arena, expr: NodeId) -> Option<Thunk> {
    match arena.kind(expr) {
        k if k.is_expr() && k != Kind::Open && k != Kind::All => {
            Some(Thunk(ThunkKind::Expr(expr)))
        }
        _ => None,
    }
}

type LowerFn = Box<dyn Fn(&Arena, Ident) -> Option<Thunk>>;

/// Evaluator handle used during one simplification pass
pub struct Exec {
    flags: EvalFlags,
    lower_fn: Option<LowerFn>,
}

impl Exec {
    pub fn new(flags: EvalFlags) -> Exec {
        Exec {
            flags,
            lower_fn: None,
        }
    }

    pub fn flags(&self) -> EvalFlags {
        self.flags
    }

    /// Install a callback that lowers a subprogram by its mangled name
    /// when the evaluator meets a call during folding
    pub fn set_lower_fn(&mut self, f: LowerFn) {
        self.lower_fn = Some(f);
    }

    pub(crate) fn lower(&self, arena: &Arena, func: Ident) -> Option<Thunk> {
        self.lower_fn.as_ref().and_then(|f| f(arena, func))
    }

    /// Evaluate `thunk` and build the replacement literal for `expr`
    ///
    /// Returns `None` when evaluation fails; the caller keeps `expr`.
    pub fn fold(&self, arena: &mut Arena, expr: NodeId, thunk: Thunk) -> Option<NodeId> {
        let root = match thunk.0 {
            ThunkKind::Expr(root) => root,
            ThunkKind::Body(_) => return None,
        };

        let value = crate::interp::eval(arena, root, self).ok()?;
        crate::interp::value_to_node(arena, expr, value)
    }
}
