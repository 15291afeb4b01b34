//! Elaboration-time simplification
//!
//! A bottom-up rewrite over a top-level design unit that realizes the
//! static semantics of the source language: constant folding through
//! the evaluator, argument and generic-map normalization, dead-code
//! elimination on statically known conditions, desugaring of concurrent
//! constructs into processes, and sensitivity-list synthesis.
//!
//! The pass never fails: a rule that cannot apply leaves its node
//! unchanged, at most emitting a diagnostic.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use larch_base::Ident;
use larch_diag::{Reporter, SourceMap};
use larch_tree::{Arena, Flags, Kind, NodeId, Param};

mod attrs;
mod calls;
mod concurrent;
mod dce;
mod fold;
mod wait;

pub mod exec;
pub mod interp;

pub use exec::{lower_thunk, EvalFlags, Exec, Thunk};
pub use wait::{build_wait, longest_static_prefix};

/// Subprograms available for demand lowering, keyed by mangled name
pub type SubprogramTable = Rc<RefCell<IndexMap<Ident, NodeId>>>;

/// An implicit signal synthesized for `'DELAYED` or `'TRANSACTION`,
/// installed on the top unit after the rewrite
pub(crate) struct ImpSignal {
    pub signal: NodeId,
    pub process: NodeId,
}

/// State threaded through one simplification pass
pub struct SimpCtx<'a> {
    pub top: NodeId,
    pub exec: Exec,
    pub eval_mask: Flags,
    pub generics: Option<IndexMap<NodeId, NodeId>>,
    pub subprograms: Option<SubprogramTable>,
    pub reporter: &'a mut Reporter,
    pub smap: &'a SourceMap,
    pub(crate) imp_signals: Vec<ImpSignal>,
}

fn simp_fcall(ctx: &mut SimpCtx, arena: &mut Arena, t: NodeId) -> NodeId {
    let t = calls::simp_call_args(arena, t);

    if arena.flags(t).intersects(ctx.eval_mask) {
        fold::simp_fold(ctx, arena, t)
    } else {
        t
    }
}

/// Per-kind dispatch for the rewrite callback
fn simp_tree(arena: &mut Arena, t: NodeId, ctx: &mut SimpCtx) -> Option<NodeId> {
    match arena.kind(t) {
        Kind::Process => concurrent::simp_process(arena, t),
        Kind::ArrayRef => Some(fold::simp_array_ref(arena, t)),
        Kind::ArraySlice => Some(fold::simp_array_slice(arena, t)),
        Kind::AttrRef => Some(attrs::simp_attr_ref(ctx, arena, t)),
        Kind::Fcall => Some(simp_fcall(ctx, arena, t)),
        Kind::Pcall => Some(calls::simp_call_args(arena, t)),
        Kind::Ref => Some(fold::simp_ref(ctx, arena, t)),
        Kind::If => dce::simp_if(arena, t),
        Kind::Case => dce::simp_case(arena, t),
        Kind::While => dce::simp_while(arena, t),
        Kind::Cassign => Some(concurrent::simp_cassign(arena, t)),
        Kind::Select => Some(concurrent::simp_select(arena, t)),
        Kind::Wait => Some(concurrent::simp_wait(arena, t)),
        Kind::Null => None, // Delete it
        Kind::Cpcall => Some(concurrent::simp_cpcall(arena, t)),
        Kind::Cassert => concurrent::simp_cassert(arena, t),
        Kind::RecordRef => Some(fold::simp_record_ref(arena, t)),
        Kind::CtxRef => dce::simp_context_ref(arena, t, ctx.top),
        Kind::Use => Some(dce::simp_use(arena, t)),
        Kind::Assert => dce::simp_assert(arena, t),
        Kind::IfGenerate => dce::simp_if_generate(arena, t),
        Kind::SignalAssign => dce::simp_signal_assign(arena, t),
        Kind::TypeConv => Some(fold::simp_fold(ctx, arena, t)),
        Kind::Literal => Some(fold::simp_literal(arena, t)),
        Kind::FuncDecl | Kind::ProcDecl => {
            dce::simp_subprogram_decl(arena, t, ctx.subprograms.as_ref())
        }
        Kind::FuncBody | Kind::ProcBody => {
            dce::simp_subprogram_body(arena, t, ctx.subprograms.as_ref())
        }
        Kind::Instance | Kind::Binding => {
            let unit = arena.ref_(t);
            Some(calls::simp_generic_map(arena, t, unit))
        }
        Kind::Block => Some(calls::simp_generic_map(arena, t, t)),
        _ => Some(t),
    }
}

/// Record the generic substitutions a block's generic map establishes
///
/// Nested blocks extend the outer substitution; distinct declarations
/// keep distinct keys, so inner maps never clobber outer ones.
fn simp_generics(arena: &Arena, t: NodeId, ctx: &mut SimpCtx) {
    let generics = arena.generics(t).to_vec();
    let genmaps = arena.genmaps(t).to_vec();

    for (i, &g) in generics.iter().enumerate() {
        let mut map = None;

        if let Some(Param::Pos { value, .. }) = genmaps.get(i) {
            map = Some(*value);
        }

        if map.is_none() {
            let ident = arena.ident(g);
            for gm in &genmaps {
                if let Param::Named { name, value } = gm {
                    if *name == ident {
                        map = Some(*value);
                        break;
                    }
                }
            }
        }

        if map.is_none() && arena.has_value(g) {
            map = Some(arena.value(g));
        }

        let Some(map) = map else { continue };
        ctx.generics
            .get_or_insert_with(IndexMap::new)
            .insert(g, map);
    }
}

fn simp_pre_cb(arena: &mut Arena, t: NodeId, ctx: &mut SimpCtx) {
    if arena.kind(t) == Kind::Block && !arena.genmaps(t).is_empty() {
        simp_generics(arena, t, ctx);
    }
}

fn run(arena: &mut Arena, top: NodeId, ctx: &mut SimpCtx) {
    let mut pre = simp_pre_cb;
    let mut post = simp_tree;
    let _ = arena.rewrite(top, Some(&mut pre), &mut post, ctx);
}

/// Simplification after analysis: only locally static expressions are
/// folded and user functions are never called
pub fn simplify_local(
    arena: &mut Arena,
    top: NodeId,
    reporter: &mut Reporter,
    smap: &SourceMap,
) {
    trace!(unit = %arena.ident(top), "local simplification");

    let mut ctx = SimpCtx {
        top,
        exec: Exec::new(EvalFlags::empty()),
        eval_mask: Flags::LOCALLY_STATIC,
        generics: None,
        subprograms: None,
        reporter,
        smap,
        imp_signals: Vec::new(),
    };

    run(arena, top, &mut ctx);

    // Install the synthesized 'DELAYED / 'TRANSACTION signals and their
    // driver processes on the unit
    for imp in std::mem::take(&mut ctx.imp_signals) {
        arena.add_decl(top, imp.signal);
        arena.add_stmt(top, imp.process);
    }
}

/// Simplification during elaboration: globally static expressions fold
/// too, and the evaluator may demand-lower subprograms registered
/// during the walk
pub fn simplify_global(
    arena: &mut Arena,
    top: NodeId,
    generics: Option<IndexMap<NodeId, NodeId>>,
    reporter: &mut Reporter,
    smap: &SourceMap,
) {
    trace!(unit = %arena.ident(top), "global simplification");

    let subprograms: SubprogramTable = Rc::new(RefCell::new(IndexMap::new()));

    let mut exec = Exec::new(EvalFlags::FCALL);
    let table = subprograms.clone();
    exec.set_lower_fn(Box::new(move |_, func| {
        table.borrow().get(&func).copied().map(Thunk::body)
    }));

    let mut ctx = SimpCtx {
        top,
        exec,
        eval_mask: Flags::GLOBALLY_STATIC | Flags::LOCALLY_STATIC,
        generics,
        subprograms: Some(subprograms),
        reporter,
        smap,
        imp_signals: Vec::new(),
    };

    run(arena, top, &mut ctx);

    // Attributes have been rewritten away before elaboration
    assert!(ctx.imp_signals.is_empty());
}
