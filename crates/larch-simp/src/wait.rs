//! Sensitivity-list synthesis
//!
//! `build_wait` collects the trigger expressions of a wait statement
//! from an arbitrary expression or statement body, following LRM 08
//! sections 10.2 and 11.3. Signals named through a statically-indexed
//! prefix contribute that prefix whole; otherwise the base signal and
//! the indexing expressions contribute separately.

use larch_tree::{Arena, AttrKind, Class, Kind, NodeId, PortMode, Range, RangeKind};

/// Is `expr` composed only of constants, literals and aliases to same?
pub fn is_static(arena: &Arena, expr: NodeId) -> bool {
    match arena.kind(expr) {
        Kind::Ref => {
            let decl = arena.ref_(expr);
            match arena.kind(decl) {
                Kind::ConstDecl | Kind::UnitDecl | Kind::EnumLit => true,
                Kind::PortDecl => arena.class(decl) == Class::Constant,
                Kind::Alias => is_static(arena, arena.value(decl)),
                _ => false,
            }
        }
        Kind::Literal => true,
        _ => false,
    }
}

/// The outermost indexed or sliced expression whose indices are all
/// static; the expression itself when fully static
pub fn longest_static_prefix(arena: &Arena, expr: NodeId) -> NodeId {
    match arena.kind(expr) {
        Kind::ArrayRef => {
            let value = arena.value(expr);
            let prefix = longest_static_prefix(arena, value);
            if prefix != value {
                return prefix;
            }
            for p in arena.params(expr) {
                match p.value() {
                    Some(v) if is_static(arena, v) => {}
                    _ => return prefix,
                }
            }
            expr
        }

        Kind::ArraySlice => {
            let value = arena.value(expr);
            let prefix = longest_static_prefix(arena, value);
            if prefix != value {
                return prefix;
            }
            let r = arena.range(expr);
            if !is_static(arena, r.left) || !is_static(arena, r.right) {
                return prefix;
            }
            expr
        }

        _ => expr,
    }
}

fn build_wait_range(arena: &mut Arena, wait: NodeId, r: &Range, all: bool) {
    if r.kind == RangeKind::Expr {
        build_wait(arena, wait, r.left, all);
    } else {
        build_wait(arena, wait, r.left, all);
        build_wait(arena, wait, r.right, all);
    }
}

/// Triggers contributed by an assignment target: its indexing
/// expressions, not the target object itself
fn build_wait_for_target(arena: &mut Arena, wait: NodeId, expr: NodeId, all: bool) {
    match arena.kind(expr) {
        Kind::ArraySlice => {
            let r = arena.range(expr);
            build_wait_range(arena, wait, &r, all);
        }
        Kind::ArrayRef => {
            for p in arena.params(expr).to_vec() {
                if let Some(v) = p.value() {
                    build_wait(arena, wait, v, all);
                }
            }
        }
        _ => {}
    }
}

/// Collect triggers for `wait` from `expr`
pub fn build_wait(arena: &mut Arena, wait: NodeId, expr: NodeId, all: bool) {
    match arena.kind(expr) {
        Kind::Ref => {
            let decl = arena.ref_(expr);
            if arena.class_of(decl) == Class::Signal {
                // No duplicates by declaration identity
                for &t in arena.triggers(wait) {
                    if arena.kind(t) == Kind::Ref && arena.ref_(t) == decl {
                        return;
                    }
                }
                arena.add_trigger(wait, expr);
            }
        }

        Kind::ArrayRef | Kind::ArraySlice => {
            if arena.class_of(expr) == Class::Signal {
                if longest_static_prefix(arena, expr) == expr {
                    arena.add_trigger(wait, expr);
                } else {
                    build_wait(arena, wait, arena.value(expr), all);
                    build_wait_for_target(arena, wait, expr, all);
                }
            }
        }

        Kind::Waveform | Kind::RecordRef | Kind::Qualified | Kind::TypeConv | Kind::Assert => {
            if arena.has_value(expr) {
                build_wait(arena, wait, arena.value(expr), all);
            }
        }

        Kind::Fcall | Kind::Pcall => {
            let decl = arena.ref_(expr);
            let ports = arena.ports(decl).to_vec();
            for (i, p) in arena.params(expr).to_vec().iter().enumerate() {
                let mode = ports
                    .get(i)
                    .and_then(|&port| arena.port_mode_opt(port))
                    .unwrap_or(PortMode::In);
                if mode == PortMode::In || mode == PortMode::InOut {
                    if let Some(v) = p.value() {
                        build_wait(arena, wait, v, all);
                    }
                }
            }

            // An all-sensitised process extends into called procedures
            if all && arena.kind(decl) == Kind::ProcBody {
                build_wait(arena, wait, decl, all);
            }
        }

        Kind::Aggregate => {
            for a in arena.assocs(expr).to_vec() {
                if let Some(v) = a.value {
                    build_wait(arena, wait, v, all);
                }
            }
        }

        Kind::AttrRef => {
            if matches!(
                arena.attr_kind(expr),
                Some(AttrKind::Event) | Some(AttrKind::Active)
            ) {
                build_wait(arena, wait, arena.name(expr), all);
            }
            for p in arena.params(expr).to_vec() {
                if let Some(v) = p.value() {
                    build_wait(arena, wait, v, all);
                }
            }
        }

        Kind::Literal | Kind::Open | Kind::Null => {}

        Kind::If => {
            build_wait(arena, wait, arena.value(expr), all);
            for s in arena.stmts(expr).to_vec() {
                build_wait(arena, wait, s, all);
            }
            for s in arena.else_stmts(expr).to_vec() {
                build_wait(arena, wait, s, all);
            }
        }

        Kind::Process | Kind::Block | Kind::ProcBody => {
            for s in arena.stmts(expr).to_vec() {
                build_wait(arena, wait, s, all);
            }
        }

        Kind::SignalAssign => {
            let target = arena.target(expr);
            build_wait_for_target(arena, wait, target, all);
            for w in arena.waveforms(expr).to_vec() {
                build_wait(arena, wait, w, all);
            }
        }

        Kind::VarAssign => {
            let target = arena.target(expr);
            build_wait_for_target(arena, wait, target, all);
            build_wait(arena, wait, arena.value(expr), all);
        }

        Kind::Case => {
            build_wait(arena, wait, arena.value(expr), all);
            for a in arena.assocs(expr).to_vec() {
                if let Some(v) = a.value {
                    build_wait(arena, wait, v, all);
                }
            }
        }

        Kind::For => {
            let r = arena.range(expr);
            build_wait_range(arena, wait, &r, all);
            for s in arena.stmts(expr).to_vec() {
                build_wait(arena, wait, s, all);
            }
        }

        Kind::While => {
            build_wait(arena, wait, arena.value(expr), all);
            for s in arena.stmts(expr).to_vec() {
                build_wait(arena, wait, s, all);
            }
        }

        Kind::Return => {
            if arena.has_value(expr) {
                build_wait(arena, wait, arena.value(expr), all);
            }
        }

        other => panic!("cannot handle tree kind {other} in wait expression"),
    }
}
