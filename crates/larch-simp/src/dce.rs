//! Dead-code elimination on statically known conditions

use larch_base::Ident;
use larch_tree::{Arena, Choice, Kind, NodeId};

/// Replace an `if` with a constant condition by the taken branch
pub(crate) fn simp_if(arena: &mut Arena, t: NodeId) -> Option<NodeId> {
    let cond = arena.value(t);
    match arena.folded_bool(cond) {
        Some(true) => {
            let stmts = arena.stmts(t).to_vec();
            if stmts.len() == 1 {
                Some(stmts[0])
            } else {
                Some(wrap_in_block(arena, t, &stmts))
            }
        }
        Some(false) => {
            let elses = arena.else_stmts(t).to_vec();
            match elses.len() {
                0 => None, // Delete it
                1 => Some(elses[0]),
                _ => Some(wrap_in_block(arena, t, &elses)),
            }
        }
        None => Some(t),
    }
}

fn wrap_in_block(arena: &mut Arena, t: NodeId, stmts: &[NodeId]) -> NodeId {
    let b = arena.alloc(Kind::Block);
    arena.set_loc(b, arena.loc(t));
    if arena.has_ident(t) {
        arena.set_ident(b, arena.ident(t));
    }
    for &s in stmts {
        arena.add_stmt(b, s);
    }
    b
}

/// Delete a while loop with a constant-false condition
pub(crate) fn simp_while(arena: &Arena, t: NodeId) -> Option<NodeId> {
    if !arena.has_value(t) {
        return Some(t);
    }
    match arena.folded_bool(arena.value(t)) {
        Some(false) => None,
        _ => Some(t),
    }
}

/// Select the matching arm of a case over a folded scrutinee
pub(crate) fn simp_case(arena: &Arena, t: NodeId) -> Option<NodeId> {
    let assocs = arena.assocs(t).to_vec();
    if assocs.is_empty() {
        return None; // All choices are unreachable
    }

    let Some(ival) = arena.folded_int(arena.value(t)) else {
        return Some(t);
    };

    for a in &assocs {
        match a.choice {
            Choice::Named(name) => {
                if arena.folded_int(name) == Some(ival) {
                    return a.value;
                }
            }
            Choice::Others => return a.value,
            Choice::Range(_) | Choice::Pos(_) => {}
        }
    }

    Some(t)
}

/// Delete an assertion that always passes
pub(crate) fn simp_assert(arena: &Arena, t: NodeId) -> Option<NodeId> {
    if !arena.has_value(t) {
        return Some(t);
    }
    match arena.folded_bool(arena.value(t)) {
        Some(true) => None,
        _ => Some(t),
    }
}

/// Reduce an if-generate with a folded condition to a block or nothing
pub(crate) fn simp_if_generate(arena: &mut Arena, t: NodeId) -> Option<NodeId> {
    match arena.folded_bool(arena.value(t)) {
        Some(true) => {
            let block = arena.alloc(Kind::Block);
            arena.set_ident(block, arena.ident(t));
            arena.set_loc(block, arena.loc(t));

            for d in arena.decls(t).to_vec() {
                arena.add_decl(block, d);
            }
            for s in arena.stmts(t).to_vec() {
                arena.add_stmt(block, s);
            }
            Some(block)
        }
        Some(false) => None,
        None => Some(t),
    }
}

/// Delete assignments to an open target
pub(crate) fn simp_signal_assign(arena: &Arena, t: NodeId) -> Option<NodeId> {
    if arena.kind(arena.target(t)) == Kind::Open {
        None
    } else {
        Some(t)
    }
}

/// Rename a use clause onto the library's true name when imported
/// through an alias
pub(crate) fn simp_use(arena: &mut Arena, t: NodeId) -> NodeId {
    let lib_decl = arena.ref_(t);
    if arena.kind(lib_decl) != Kind::Library {
        return t;
    }

    let qual = arena.ident(t);
    let lalias = qual.until('.');
    let lname = arena.ident2(lib_decl);

    if lalias != lname {
        let renamed = match qual.from('.') {
            Some(rest) => lname.prefix(rest, '.'),
            None => lname,
        };
        arena.set_ident(t, renamed);
    }

    t
}

/// Splice the items of a referenced context declaration into the top
/// unit and drop the reference
pub(crate) fn simp_context_ref(
    arena: &mut Arena,
    t: NodeId,
    top: NodeId,
) -> Option<NodeId> {
    let decl = arena.ref_(t);

    // The first two items are the implicit STD and WORK clauses
    let items: Vec<NodeId> = arena.contexts(decl).iter().skip(2).copied().collect();
    for item in items {
        arena.add_context(top, item);
    }

    None
}

/// Drop predefined operators hidden by explicit homographs; register
/// the rest for demand lowering
pub(crate) fn simp_subprogram_decl(
    arena: &Arena,
    t: NodeId,
    subprograms: Option<&crate::SubprogramTable>,
) -> Option<NodeId> {
    use larch_tree::Flags;

    let flags = arena.flags(t);
    if flags.contains(Flags::PREDEFINED) && flags.contains(Flags::HIDDEN) {
        return None;
    }

    if let Some(table) = subprograms {
        if arena.subprog_kind(t) != larch_tree::SubprogKind::User {
            table.borrow_mut().insert(subprogram_key(arena, t), t);
        }
    }

    Some(t)
}

pub(crate) fn simp_subprogram_body(
    arena: &Arena,
    t: NodeId,
    subprograms: Option<&crate::SubprogramTable>,
) -> Option<NodeId> {
    if let Some(table) = subprograms {
        table.borrow_mut().insert(subprogram_key(arena, t), t);
    }
    Some(t)
}

/// Mangled name when the analyzer provided one, else the plain name
pub(crate) fn subprogram_key(arena: &Arena, t: NodeId) -> Ident {
    if arena.has_ident2(t) {
        arena.ident2(t)
    } else {
        arena.ident(t)
    }
}
