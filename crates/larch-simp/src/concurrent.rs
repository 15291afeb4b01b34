//! Desugaring of concurrent constructs into processes
//!
//! Concurrent signal assignment, selected signal assignment, concurrent
//! procedure call and concurrent assertion each become an equivalent
//! process ending in a synthesized wait whose sensitivity comes from
//! `build_wait`. A guard expression wraps the body in a generated `if`
//! and joins the trigger list.

use larch_base::Ident;
use larch_tree::{Arena, Flags, Kind, NodeId, PortMode};

use crate::calls::simp_call_args;
use crate::wait::build_wait;

/// Convert a process sensitivity list to a trailing `wait on`; delete
/// processes reduced to a lone wait
pub(crate) fn simp_process(arena: &mut Arena, t: NodeId) -> Option<NodeId> {
    let triggers = arena.triggers(t).to_vec();
    if !triggers.is_empty() {
        if arena.stmts(t).is_empty() {
            return None; // Body was optimised away
        }

        let p = arena.alloc(Kind::Process);
        arena.set_ident(p, arena.ident(t));
        arena.set_loc(p, arena.loc(t));
        if arena.flags(t).contains(Flags::POSTPONED) {
            arena.set_flag(p, Flags::POSTPONED);
        }

        for d in arena.decls(t).to_vec() {
            arena.add_decl(p, d);
        }
        for s in arena.stmts(t).to_vec() {
            arena.add_stmt(p, s);
        }

        let w = arena.alloc(Kind::Wait);
        arena.set_ident(w, arena.ident(p));
        arena.set_flag(w, Flags::STATIC_WAIT);

        if triggers.len() == 1 && arena.kind(triggers[0]) == Kind::All {
            // Sensitivity from every signal read anywhere in the body
            build_wait(arena, w, t, true);
        } else {
            for trigger in triggers {
                arena.add_trigger(w, trigger);
            }
        }
        arena.add_stmt(p, w);

        return Some(p);
    }

    let stmts = arena.stmts(t);
    if stmts.len() == 1 && arena.kind(stmts[0]) == Kind::Wait {
        None
    } else {
        Some(t)
    }
}

/// LRM 93 section 8.1: a wait with a condition clause but no
/// sensitivity list derives one from the condition
pub(crate) fn simp_wait(arena: &mut Arena, t: NodeId) -> NodeId {
    if arena.has_value(t) && arena.triggers(t).is_empty() {
        let cond = arena.value(t);
        build_wait(arena, t, cond, false);
    }
    t
}

/// LRM 93 section 9.3: the guard wraps the body in an if statement and
/// joins the wait's sensitivity
fn simp_guard(arena: &mut Arena, t: NodeId, wait: NodeId) -> NodeId {
    let g_if = arena.alloc(Kind::If);
    arena.set_ident(g_if, Ident::new("guard_if"));
    arena.set_loc(g_if, arena.loc(t));

    let guard_ref = arena.guard(t);
    arena.set_value(g_if, guard_ref);
    arena.add_trigger(wait, guard_ref);

    g_if
}

/// Concurrent signal assignment becomes a process
pub(crate) fn simp_cassign(arena: &mut Arena, t: NodeId) -> NodeId {
    let p = arena.alloc(Kind::Process);
    arena.set_ident(p, arena.ident(t));
    arena.set_loc(p, arena.loc(t));

    let w = arena.alloc(Kind::Wait);
    arena.set_ident(w, Ident::new("cassign"));
    arena.set_flag(w, Flags::STATIC_WAIT);

    let container = if arena.has_guard(t) {
        let g_if = simp_guard(arena, t, w);
        arena.add_stmt(p, g_if);
        g_if
    } else {
        p
    };

    let s = arena.alloc(Kind::SignalAssign);
    arena.set_loc(s, arena.loc(t));
    arena.set_ident(s, arena.ident(t));
    let target = arena.target(t);
    arena.set_target(s, target);
    if arena.has_reject(t) {
        let reject = arena.reject(t);
        arena.set_reject(s, reject);
    }

    for wave in arena.waveforms(t).to_vec() {
        arena.add_waveform(s, wave);
        build_wait(arena, w, wave, false);
    }

    arena.add_stmt(container, s);
    arena.add_stmt(p, w);
    p
}

/// Selected signal assignment becomes a case statement in a process
pub(crate) fn simp_select(arena: &mut Arena, t: NodeId) -> NodeId {
    let p = arena.alloc(Kind::Process);
    arena.set_ident(p, arena.ident(t));
    arena.set_loc(p, arena.loc(t));

    let w = arena.alloc(Kind::Wait);
    arena.set_ident(w, Ident::new("select_wait"));
    arena.set_flag(w, Flags::STATIC_WAIT);

    let container = if arena.has_guard(t) {
        let g_if = simp_guard(arena, t, w);
        arena.add_stmt(p, g_if);
        g_if
    } else {
        p
    };

    let c = arena.alloc(Kind::Case);
    arena.set_ident(c, Ident::new("select_case"));
    arena.set_loc(c, arena.loc(t));
    let scrutinee = arena.value(t);
    arena.set_value(c, scrutinee);

    build_wait(arena, w, scrutinee, false);

    for a in arena.assocs(t).to_vec() {
        arena.add_assoc(c, a);

        if let larch_tree::Choice::Named(name) = a.choice {
            build_wait(arena, w, name, false);
        }
        if let Some(value) = a.value {
            for wave in arena.waveforms(value).to_vec() {
                build_wait(arena, w, wave, false);
            }
        }
    }

    arena.add_stmt(container, c);
    arena.add_stmt(p, w);
    p
}

/// Concurrent procedure call becomes a process sensitive to its IN and
/// INOUT arguments
pub(crate) fn simp_cpcall(arena: &mut Arena, t: NodeId) -> NodeId {
    let t = simp_call_args(arena, t);

    let process = arena.alloc(Kind::Process);
    arena.set_ident(process, arena.ident(t));
    arena.set_loc(process, arena.loc(t));

    let wait = arena.alloc(Kind::Wait);
    arena.set_ident(wait, Ident::new("pcall_wait"));
    arena.set_flag(wait, Flags::STATIC_WAIT);

    let pcall = arena.alloc(Kind::Pcall);
    arena.set_ident(pcall, Ident::new("pcall"));
    if arena.has_ident2(t) {
        arena.set_ident2(pcall, arena.ident2(t));
    }
    arena.set_loc(pcall, arena.loc(t));
    let decl = arena.ref_(t);
    arena.set_ref(pcall, decl);

    let ports = arena.ports(decl).to_vec();
    for (i, p) in arena.params(t).to_vec().into_iter().enumerate() {
        let mode = ports
            .get(i)
            .and_then(|&port| arena.port_mode_opt(port))
            .unwrap_or(PortMode::In);
        if mode == PortMode::In || mode == PortMode::InOut {
            if let Some(v) = p.value() {
                build_wait(arena, wait, v, false);
            }
        }
        arena.add_param(pcall, p);
    }

    arena.add_stmt(process, pcall);
    arena.add_stmt(process, wait);
    process
}

/// Concurrent assertion becomes a process; one that always passes is
/// deleted outright
pub(crate) fn simp_cassert(arena: &mut Arena, t: NodeId) -> Option<NodeId> {
    let value = arena.value(t);
    if arena.folded_bool(value) == Some(true) {
        return None;
    }

    let process = arena.alloc(Kind::Process);
    arena.set_ident(process, arena.ident(t));
    arena.set_loc(process, arena.loc(t));
    if arena.flags(t).contains(Flags::POSTPONED) {
        arena.set_flag(process, Flags::POSTPONED);
    }

    let wait = arena.alloc(Kind::Wait);
    arena.set_ident(wait, Ident::new("assert_wait"));
    arena.set_flag(wait, Flags::STATIC_WAIT);

    let a = arena.alloc(Kind::Assert);
    arena.set_ident(a, Ident::new("assert_wrap"));
    arena.set_loc(a, arena.loc(t));
    arena.set_value(a, value);
    if arena.has_severity(t) {
        let severity = arena.severity(t);
        arena.set_severity(a, severity);
    }
    if arena.has_message(t) {
        let message = arena.message(t);
        arena.set_message(a, message);
    }

    build_wait(arena, wait, value, false);

    arena.add_stmt(process, a);
    arena.add_stmt(process, wait);
    Some(process)
}
