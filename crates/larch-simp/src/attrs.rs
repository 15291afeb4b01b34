//! Predefined attribute folding
//!
//! Range attributes resolve through the prefix's type; `'DELAYED` and
//! `'TRANSACTION` synthesize an implicit signal with a driver process
//! that models the attribute, installed on the top unit after the
//! rewrite completes.

use larch_base::Ident;
use larch_tree::{
    Arena, AttrKind, Flags, Kind, NodeId, Param, RangeKind, SubprogKind, Type, TypeKind,
};

use crate::{ImpSignal, SimpCtx};

pub(crate) fn simp_attr_ref(ctx: &mut SimpCtx, arena: &mut Arena, t: NodeId) -> NodeId {
    // The analyzer may have resolved the attribute already
    if arena.has_value(t) {
        return arena.value(t);
    }

    let Some(predef) = arena.attr_kind(t) else {
        return t;
    };

    match predef {
        AttrKind::Delayed | AttrKind::Transaction => {
            simp_attr_delayed_transaction(ctx, arena, t, predef)
        }

        AttrKind::Pos => {
            let arg = arena.params(t)[0].value().expect("'POS without argument");
            match arena.folded_int(arg) {
                Some(v) => arena.get_int_lit(t, v),
                None => t,
            }
        }

        AttrKind::Length
        | AttrKind::Left
        | AttrKind::Low
        | AttrKind::High
        | AttrKind::Right
        | AttrKind::Ascending => simp_attr_range_bound(arena, t, predef),

        _ => t,
    }
}

fn simp_attr_range_bound(arena: &mut Arena, t: NodeId, predef: AttrKind) -> NodeId {
    let name = arena.name(t);
    let name_kind = arena.kind(name);

    let base_prefix =
        name_kind == Kind::AttrRef && arena.attr_kind(name) == Some(AttrKind::Base);
    if name_kind != Kind::Ref && !base_prefix {
        return t; // Cannot fold this
    }

    let mut ty = arena.type_of(name);
    let mut dim_i: i64 = 1;

    if ty.kind() == TypeKind::Enum {
        let lits = ty.enum_literals();
        return match predef {
            AttrKind::Left | AttrKind::Low => arena.make_ref(lits[0]),
            AttrKind::Right | AttrKind::High => arena.make_ref(lits[lits.len() - 1]),
            AttrKind::Ascending => arena.get_enum_lit(t, true),
            _ => panic!("invalid enumeration attribute {predef:?}"),
        };
    }

    if ty.is_array() {
        if !arena.params(t).is_empty() {
            let value = arena.params(t)[0].value().expect("dimension without value");
            match arena.folded_int(value) {
                Some(v) => dim_i = v,
                None => panic!("locally static dimension expression was not folded"),
            }
        }

        let type_decl_prefix =
            name_kind == Kind::Ref && arena.kind(arena.ref_(name)) == Kind::TypeDecl;

        if type_decl_prefix && ty.is_unconstrained() {
            // Substitute the index type of the unconstrained array
            let base = ty.base_recur();
            let n_constrs = base.data().index_constrs.len() as i64;
            if dim_i < 1 || dim_i > n_constrs {
                return t;
            }
            ty = match ty.index_constr(dim_i as usize - 1) {
                Some(ic) => ic,
                None => return t,
            };
            dim_i = 1;
        } else if ty.is_unconstrained() {
            return t;
        } else if dim_i < 1 || dim_i > ty.dimension_of() as i64 {
            return t;
        }
    }

    let Some(r) = ty.range_of(dim_i as usize - 1) else {
        return t;
    };
    if r.kind == RangeKind::Expr {
        return t;
    }
    let to = r.kind == RangeKind::To;

    match predef {
        AttrKind::Length => {
            if arena.kind(r.left) == Kind::Literal && arena.kind(r.right) == Kind::Literal {
                let (low, high) = arena.range_bounds(&r);
                arena.get_int_lit(t, if high < low { 0 } else { high - low + 1 })
            } else {
                t
            }
        }
        AttrKind::Low => {
            if to {
                r.left
            } else {
                r.right
            }
        }
        AttrKind::High => {
            if to {
                r.right
            } else {
                r.left
            }
        }
        AttrKind::Left => r.left,
        AttrKind::Right => r.right,
        AttrKind::Ascending => arena.get_enum_lit(t, to),
        _ => t,
    }
}

fn simp_attr_delayed_transaction(
    ctx: &mut SimpCtx,
    arena: &mut Arena,
    t: NodeId,
    predef: AttrKind,
) -> NodeId {
    let name = arena.name(t);
    assert_eq!(arena.kind(name), Kind::Ref);

    let decl = arena.ref_(name);
    let decl_kind = arena.kind(decl);
    if decl_kind != Kind::SignalDecl && decl_kind != Kind::PortDecl {
        return t;
    }

    let stem = if predef == AttrKind::Delayed {
        "delayed"
    } else {
        "transaction"
    };
    let sig_name = format!("{}_{}", stem, arena.ident(name));

    let s = arena.alloc(Kind::SignalDecl);
    arena.set_loc(s, arena.loc(t));
    arena.set_ident(s, Ident::uniq(&sig_name));
    arena.set_type(s, arena.type_of(t));

    let p = arena.alloc(Kind::Process);
    arena.set_loc(p, arena.loc(t));
    let p_name = arena.ident(s).prefix(Ident::new("p"), '_');
    arena.set_ident(p, p_name);

    let r = arena.make_ref(s);

    let a = arena.alloc(Kind::SignalAssign);
    arena.set_ident(a, Ident::new("assign"));
    arena.set_target(a, r);

    match predef {
        AttrKind::Delayed => {
            let init = if arena.has_value(decl) {
                arena.value(decl)
            } else {
                let ty = arena.type_of(t);
                let loc = arena.loc(t);
                arena.make_default_value(&ty, loc)
            };
            arena.set_value(s, init);

            let delay = arena.params(t)[0].value().expect("'DELAYED without delay");

            let wave = arena.alloc(Kind::Waveform);
            arena.set_value(wave, name);
            arena.set_delay(wave, delay);
            arena.add_waveform(a, wave);
        }

        AttrKind::Transaction => {
            let ty = arena.type_of(s);
            let loc = arena.loc(s);
            let init = arena.make_default_value(&ty, loc);
            arena.set_value(s, init);

            // new_sig <= not new_sig
            let not_decl = make_not_func(arena, &ty);
            let not = arena.alloc(Kind::Fcall);
            arena.set_ident(not, Ident::new("\"not\""));
            arena.set_ref(not, not_decl);
            arena.set_type(not, ty);
            arena.add_param(not, Param::Pos { pos: 0, value: r });

            let wave = arena.alloc(Kind::Waveform);
            arena.set_value(wave, not);
            arena.add_waveform(a, wave);
        }

        _ => unreachable!(),
    }

    arena.add_stmt(p, a);

    let wait = arena.alloc(Kind::Wait);
    arena.set_ident(wait, Ident::new("wait"));
    arena.set_flag(wait, Flags::STATIC_WAIT);
    arena.add_trigger(wait, name);
    arena.add_stmt(p, wait);

    ctx.imp_signals.push(ImpSignal {
        signal: s,
        process: p,
    });

    r
}

fn make_not_func(arena: &mut Arena, ty: &Type) -> NodeId {
    let func_ty = Type::new(TypeKind::Func);
    func_ty.data_mut().result = Some(ty.clone());

    let d = arena.alloc(Kind::FuncDecl);
    arena.set_ident(d, Ident::new("\"not\""));
    arena.set_subprog_kind(d, SubprogKind::Builtin(larch_tree::BuiltinOp::Not));
    arena.set_type(d, func_ty);
    d
}
