//! Constant folding: eligibility, evaluation and reference resolution

use larch_tree::{Arena, Choice, Flags, Kind, Literal, NodeId, SubprogKind};

use crate::exec::{lower_thunk, EvalFlags};
use crate::SimpCtx;

fn fold_not_possible(ctx: &mut SimpCtx, arena: &Arena, t: NodeId, why: &str) -> bool {
    if ctx.exec.flags().contains(EvalFlags::WARN) {
        ctx.reporter.warn_at(
            ctx.smap,
            arena.loc(t),
            &format!("{why} prevents constant folding"),
        );
    }
    false
}

/// Can `t` be evaluated at compile time under the current flags?
pub(crate) fn fold_possible(ctx: &mut SimpCtx, arena: &Arena, t: NodeId) -> bool {
    match arena.kind(t) {
        Kind::Fcall => {
            let decl = arena.ref_(t);
            let flags = ctx.exec.flags();
            match arena.subprog_kind(decl) {
                SubprogKind::User if !flags.contains(EvalFlags::FCALL) => {
                    return fold_not_possible(ctx, arena, t, "call to user defined function")
                }
                SubprogKind::Foreign => {
                    return fold_not_possible(ctx, arena, t, "call to foreign function")
                }
                _ => {}
            }
            if arena.flags(decl).contains(Flags::IMPURE) {
                return fold_not_possible(ctx, arena, t, "call to impure function");
            }
            if !arena.flags(t).contains(Flags::GLOBALLY_STATIC) {
                return fold_not_possible(ctx, arena, t, "non-static expression");
            }

            for p in arena.params(t).to_vec() {
                let Some(value) = p.value() else { continue };
                if !fold_possible(ctx, arena, value) {
                    return false;
                }
                // A scalar call argument would already have been folded
                // if it were possible
                if arena.kind(value) == Kind::Fcall
                    && arena.has_type(value)
                    && arena.type_of(value).is_scalar()
                {
                    return false;
                }
            }

            true
        }

        Kind::Literal => true,

        Kind::TypeConv | Kind::Qualified | Kind::RecordRef => {
            fold_possible(ctx, arena, arena.value(t))
        }

        Kind::Ref => {
            let decl = arena.ref_(t);
            match arena.kind(decl) {
                Kind::UnitDecl | Kind::EnumLit => true,
                Kind::ConstDecl => {
                    if arena.has_value(decl) {
                        fold_possible(ctx, arena, arena.value(decl))
                    } else if !ctx.exec.flags().contains(EvalFlags::FCALL) {
                        fold_not_possible(ctx, arena, t, "deferred constant")
                    } else {
                        true
                    }
                }
                _ => fold_not_possible(ctx, arena, t, "reference"),
            }
        }

        Kind::Aggregate => {
            for a in arena.assocs(t).to_vec() {
                match a.value {
                    Some(v) if fold_possible(ctx, arena, v) => {}
                    _ => return false,
                }
            }
            true
        }

        _ => fold_not_possible(ctx, arena, t, "non-constant expression"),
    }
}

/// Fold a scalar expression through the evaluator, keeping `t` when
/// lowering or evaluation fails
pub(crate) fn simp_fold(ctx: &mut SimpCtx, arena: &mut Arena, t: NodeId) -> NodeId {
    if !arena.has_type(t) || !arena.type_of(t).is_scalar() {
        return t;
    }
    if !fold_possible(ctx, arena, t) {
        return t;
    }

    let Some(thunk) = lower_thunk(arena, t) else {
        return t;
    };

    // The thunk is dropped as soon as folding completes
    ctx.exec.fold(arena, t, thunk).unwrap_or(t)
}

/// Replace references to scalar constants, units and mapped generics
pub(crate) fn simp_ref(ctx: &mut SimpCtx, arena: &Arena, t: NodeId) -> NodeId {
    // A formal in a port or generic map names the port, not its value
    if arena.flags(t).contains(Flags::FORMAL_NAME) {
        return t;
    }

    let decl = arena.ref_(t);
    match arena.kind(decl) {
        Kind::ConstDecl => {
            if !arena.type_of(decl).is_scalar() || !arena.has_value(decl) {
                return t;
            }
            let value = arena.value(decl);
            match arena.kind(value) {
                Kind::Literal => value,
                Kind::Ref if arena.kind(arena.ref_(value)) == Kind::EnumLit => value,
                _ => t,
            }
        }

        Kind::UnitDecl => arena.value(decl),

        Kind::PortDecl => {
            let Some(generics) = &ctx.generics else {
                return t;
            };
            let Some(&map) = generics.get(&decl) else {
                return t;
            };
            match arena.kind(map) {
                Kind::Ref
                | Kind::Literal
                | Kind::Aggregate
                | Kind::ArraySlice
                | Kind::ArrayRef
                | Kind::Fcall
                | Kind::RecordRef
                | Kind::Open
                | Kind::Qualified => map,
                other => panic!(
                    "cannot rewrite generic {} to tree kind {other}",
                    arena.ident(t)
                ),
            }
        }

        _ => t,
    }
}

/// Project a field selection out of a constant aggregate
pub(crate) fn simp_record_ref(arena: &Arena, t: NodeId) -> NodeId {
    let value = arena.value(t);
    let agg = match arena.kind(value) {
        Kind::Aggregate => value,
        Kind::Open => return value,
        Kind::Ref => {
            let decl = arena.ref_(value);
            if arena.kind(decl) != Kind::ConstDecl || !arena.has_value(decl) {
                return t;
            }
            let v = arena.value(decl);
            if arena.kind(v) != Kind::Aggregate {
                return t;
            }
            v
        }
        _ => return t,
    };

    let field = arena.ident(t);
    let fields = arena.type_of(agg).fields();

    for a in arena.assocs(agg) {
        let matches = match a.choice {
            Choice::Pos(pos) => fields
                .get(pos as usize)
                .is_some_and(|&f| arena.ident(f) == field),
            Choice::Named(name) => {
                arena.kind(name) == Kind::Ref && arena.ident(name) == field
            }
            _ => false,
        };
        if matches {
            if let Some(v) = a.value {
                return v;
            }
        }
    }

    t
}

fn extract_aggregate(arena: &Arena, agg: NodeId, index: i64, def: NodeId) -> NodeId {
    let ty = arena.type_of(agg);
    if ty.is_unconstrained() {
        return def;
    }
    let Some(bounds) = ty.range_of(0) else {
        return def;
    };
    let (low, high) = arena.range_bounds(&bounds);
    let to = bounds.kind == larch_tree::RangeKind::To;

    for a in arena.assocs(agg) {
        let hit = match a.choice {
            Choice::Pos(pos) => {
                let pos = pos as i64;
                (to && pos + low == index) || (!to && high - pos == index)
            }
            Choice::Others => true,
            Choice::Range(r) => {
                let left = arena.assume_int(r.left);
                let right = arena.assume_int(r.right);
                (to && index >= left && index <= right)
                    || (!to && index <= left && index >= right)
            }
            Choice::Named(name) => arena.folded_int(name) == Some(index),
        };
        if hit {
            if let Some(v) = a.value {
                return v;
            }
        }
    }

    def
}

/// Fold a statically-indexed array reference into a constant aggregate
pub(crate) fn simp_array_ref(arena: &Arena, t: NodeId) -> NodeId {
    let value = arena.value(t);
    if arena.kind(value) == Kind::Open {
        return value;
    }

    let mut indexes = Vec::new();
    for p in arena.params(t) {
        let Some(v) = p.value() else { return t };
        match arena.folded_int(v) {
            Some(i) => indexes.push(i),
            None => return t,
        }
    }

    if !arena.has_type(value) {
        return t;
    }

    match arena.kind(value) {
        Kind::Aggregate => extract_aggregate(arena, value, indexes[0], t),
        Kind::Ref => {
            if indexes.len() > 1 {
                return t; // No folding of multi-dimensional arrays
            }
            let decl = arena.ref_(value);
            if arena.kind(decl) != Kind::ConstDecl || !arena.has_value(decl) {
                return t;
            }
            let v = arena.value(decl);
            if arena.kind(v) != Kind::Aggregate {
                return t;
            }
            extract_aggregate(arena, v, indexes[0], t)
        }
        _ => t,
    }
}

/// Propagate `open` out of a slice
pub(crate) fn simp_array_slice(arena: &Arena, t: NodeId) -> NodeId {
    let value = arena.value(t);
    if arena.kind(value) == Kind::Open {
        value
    } else {
        t
    }
}

/// Rewrite a physical literal in terms of its base unit
pub(crate) fn simp_literal(arena: &mut Arena, t: NodeId) -> NodeId {
    if let Literal::Physical { ival, dval } = arena.literal(t) {
        if arena.has_ref(t) {
            let decl = arena.ref_(t);
            let base = arena.assume_int(arena.value(decl));

            let rebased = if ival == 0 {
                (dval * base as f64) as i64
            } else {
                ival * base
            };
            arena.set_literal(t, Literal::Physical { ival: rebased, dval });
            arena.clear_ref(t);
            arena.set_ident(t, arena.ident(decl));
        }
    }
    t
}
