//! Argument-list normalization
//!
//! Calls and generic maps leave the analyzer with a mixture of
//! positional and named associations. Both are rewritten here into
//! purely positional lists in declaration order, substituting defaults
//! for missing or `open` actuals, so later phases index actuals by
//! position alone.

use larch_tree::{Arena, Kind, NodeId, Param};

/// Rewrite the argument list of a function or procedure call
pub(crate) fn simp_call_args(arena: &mut Arena, t: NodeId) -> NodeId {
    let decl = arena.ref_(t);

    let params = arena.params(t).to_vec();
    let ports = arena.ports(decl).to_vec();

    let mut last_pos: i64 = -1;
    for (i, p) in params.iter().enumerate() {
        if matches!(p, Param::Pos { .. }) {
            last_pos = i as i64;
        }
    }

    if last_pos == params.len() as i64 - 1 {
        return t;
    }

    let kind = arena.kind(t);
    let new = arena.alloc(kind);
    arena.set_loc(new, arena.loc(t));
    arena.set_ident(new, arena.ident(t));
    arena.set_ref(new, decl);

    if kind == Kind::Fcall {
        arena.set_type(new, arena.type_of(t));
        let flags = arena.flags(t);
        arena.set_flag(new, flags);
    } else if kind == Kind::Cpcall && arena.has_ident2(t) {
        arena.set_ident2(new, arena.ident2(t));
    }

    for i in 0..params.len().min((last_pos + 1) as usize) {
        let port = ports[i];
        let mut value = match &params[i] {
            Param::Pos { value, .. } => *value,
            _ => unreachable!("positional prefix"),
        };
        if arena.kind(value) == Kind::Open {
            value = arena.value(port);
        }
        arena.add_param(new, Param::Pos { pos: 0, value });
    }

    for &port in ports.iter().skip((last_pos + 1) as usize) {
        let name = arena.ident(port);

        let mut actual = None;
        for p in params.iter().skip((last_pos + 1) as usize) {
            if let Param::Named { name: n, value } = p {
                if *n == name {
                    actual = Some(*value);
                    break;
                }
            }
        }

        let value = match actual {
            Some(v) if arena.kind(v) == Kind::Open => arena.value(port),
            Some(v) => v,
            // A missing association takes the parameter's default
            None if arena.has_value(port) => arena.value(port),
            None => panic!(
                "missing actual for parameter {} in call to {}",
                name,
                arena.ident(t)
            ),
        };
        arena.add_param(new, Param::Pos { pos: 0, value });
    }

    new
}

/// Rewrite a generic map into positional order against the generics of
/// `unit`, filling defaults for unmapped generics
pub(crate) fn simp_generic_map(arena: &mut Arena, t: NodeId, unit: NodeId) -> NodeId {
    let genmaps = arena.genmaps(t).to_vec();
    let generics = arena.generics(unit).to_vec();

    let mut last_pos = 0usize;
    while last_pos < genmaps.len() {
        if !matches!(genmaps[last_pos], Param::Pos { .. }) {
            break;
        }
        last_pos += 1;
    }

    if last_pos == genmaps.len() && genmaps.len() == generics.len() {
        return t;
    }

    let kind = arena.kind(t);
    let new = arena.alloc(kind);
    arena.set_loc(new, arena.loc(t));
    arena.set_ident(new, arena.ident(t));

    for gm in genmaps.iter().take(last_pos) {
        arena.add_genmap(new, *gm);
    }
    for p in arena.params(t).to_vec() {
        arena.add_param(new, p);
    }

    match kind {
        Kind::Instance => {
            if arena.has_spec(t) {
                let spec = arena.spec(t);
                arena.set_spec(new, spec);
            }
            arena.set_ref(new, arena.ref_(t));
            if arena.has_ident2(t) {
                arena.set_ident2(new, arena.ident2(t));
            }
        }
        Kind::Binding => {
            arena.set_ref(new, arena.ref_(t));
            if arena.has_ident2(t) {
                arena.set_ident2(new, arena.ident2(t));
            }
        }
        Kind::Block => {
            for p in arena.ports(t).to_vec() {
                arena.add_port(new, p);
            }
            for g in arena.generics(t).to_vec() {
                arena.add_generic(new, g);
            }
            for d in arena.decls(t).to_vec() {
                arena.add_decl(new, d);
            }
            for s in arena.stmts(t).to_vec() {
                arena.add_stmt(new, s);
            }
        }
        other => panic!("cannot normalize generic map of tree kind {other}"),
    }

    for (i, &g) in generics.iter().enumerate().skip(last_pos) {
        let ident = arena.ident(g);

        let mut value = None;
        for gm in genmaps.iter().skip(last_pos) {
            if let Param::Named { name, value: v } = gm {
                if *name == ident {
                    assert!(value.is_none(), "duplicate generic association");
                    value = Some(*v);
                }
            }
        }

        let value = match value {
            Some(v) => v,
            None if arena.has_value(g) => arena.value(g),
            None if kind == Kind::Binding => {
                let open = arena.alloc(Kind::Open);
                arena.set_loc(open, arena.loc(t));
                if arena.has_type(g) {
                    arena.set_type(open, arena.type_of(g));
                }
                open
            }
            None => panic!("missing value for generic {ident}"),
        };

        arena.add_genmap(new, Param::Pos { pos: i as u32, value });
    }

    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_base::Ident;
    use larch_tree::{Literal, Type, TypeKind};

    fn func_with_ports(arena: &mut Arena, names: &[&str], defaults: &[Option<i64>]) -> NodeId {
        let ty = Type::new(TypeKind::Integer);
        let decl = arena.alloc(Kind::FuncDecl);
        arena.set_ident(decl, Ident::new("f"));
        arena.set_type(decl, ty.clone());

        for (name, def) in names.iter().zip(defaults.iter()) {
            let p = arena.alloc(Kind::PortDecl);
            arena.set_ident(p, Ident::new(name));
            arena.set_type(p, ty.clone());
            if let Some(d) = def {
                let lit = arena.alloc(Kind::Literal);
                arena.set_literal(lit, Literal::Int(*d));
                arena.set_type(lit, ty.clone());
                arena.set_value(p, lit);
            }
            arena.add_port(decl, p);
        }
        decl
    }

    fn int_lit(arena: &mut Arena, v: i64) -> NodeId {
        let l = arena.alloc(Kind::Literal);
        arena.set_literal(l, Literal::Int(v));
        l
    }

    #[test]
    fn named_arguments_become_positional() {
        let mut arena = Arena::new();
        let decl = func_with_ports(&mut arena, &["a", "b"], &[None, None]);

        // f(1, b => 2)
        let call = arena.alloc(Kind::Fcall);
        arena.set_ident(call, Ident::new("f"));
        arena.set_ref(call, decl);
        arena.set_type(call, Type::new(TypeKind::Integer));
        let one = int_lit(&mut arena, 1);
        let two = int_lit(&mut arena, 2);
        arena.add_param(call, Param::Pos { pos: 0, value: one });
        arena.add_param(
            call,
            Param::Named {
                name: Ident::new("b"),
                value: two,
            },
        );

        let new = simp_call_args(&mut arena, call);
        assert_ne!(new, call);

        let params = arena.params(new).to_vec();
        assert_eq!(params.len(), 2);
        assert!(matches!(params[0], Param::Pos { pos: 0, value } if value == one));
        assert!(matches!(params[1], Param::Pos { pos: 1, value } if value == two));
    }

    #[test]
    fn all_positional_calls_are_untouched() {
        let mut arena = Arena::new();
        let decl = func_with_ports(&mut arena, &["a"], &[None]);

        let call = arena.alloc(Kind::Fcall);
        arena.set_ident(call, Ident::new("f"));
        arena.set_ref(call, decl);
        arena.set_type(call, Type::new(TypeKind::Integer));
        let one = int_lit(&mut arena, 1);
        arena.add_param(call, Param::Pos { pos: 0, value: one });

        assert_eq!(simp_call_args(&mut arena, call), call);
    }

    #[test]
    fn missing_argument_takes_default() {
        let mut arena = Arena::new();
        let decl = func_with_ports(&mut arena, &["a", "b"], &[None, Some(7)]);

        // f(a => 1)  -- b defaults
        let call = arena.alloc(Kind::Fcall);
        arena.set_ident(call, Ident::new("f"));
        arena.set_ref(call, decl);
        arena.set_type(call, Type::new(TypeKind::Integer));
        let one = int_lit(&mut arena, 1);
        arena.add_param(
            call,
            Param::Named {
                name: Ident::new("a"),
                value: one,
            },
        );

        let new = simp_call_args(&mut arena, call);
        let params = arena.params(new).to_vec();
        assert_eq!(params.len(), 2);
        let b = params[1].value().unwrap();
        assert_eq!(arena.folded_int(b), Some(7));
    }

    #[test]
    fn open_actual_is_replaced_by_default() {
        let mut arena = Arena::new();
        let decl = func_with_ports(&mut arena, &["a"], &[Some(3)]);

        let call = arena.alloc(Kind::Fcall);
        arena.set_ident(call, Ident::new("f"));
        arena.set_ref(call, decl);
        arena.set_type(call, Type::new(TypeKind::Integer));
        let open = arena.alloc(Kind::Open);
        arena.add_param(
            call,
            Param::Named {
                name: Ident::new("a"),
                value: open,
            },
        );

        let new = simp_call_args(&mut arena, call);
        let a = arena.params(new)[0].value().unwrap();
        assert_eq!(arena.folded_int(a), Some(3));
    }
}
