//! Deep copy with sharing preservation
//!
//! Copying allocates a fresh node for everything reachable through child
//! slots, preserving sharing inside the copied subgraph through an
//! original-to-copy map. `ref` edges are not followed: a reference to a
//! declaration outside the copied subgraph keeps pointing at the
//! original, while references to declarations that were copied are
//! remapped onto their copies afterwards. Attached types are shared, not
//! duplicated.

use std::collections::HashMap;

use crate::arena::Arena;
use crate::node::{Choice, Node, NodeId, Param, Range, RangeKind};

impl Arena {
    /// Copy the subgraph rooted at `t`
    pub fn copy(&mut self, t: NodeId) -> NodeId {
        let _ = self.fresh_generation();

        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        let copy = self.copy_aux(t, &mut map);

        // Remap references onto copies of declarations inside the
        // copied subgraph; outside declarations stay shared
        let copies: Vec<NodeId> = map.values().copied().collect();
        for c in copies {
            if let Some(r) = self.node(c).ref_ {
                if let Some(&nr) = map.get(&r) {
                    self.node_mut(c).ref_ = Some(nr);
                }
            }
        }

        copy
    }

    fn copy_range(&mut self, r: &Range, map: &mut HashMap<NodeId, NodeId>) -> Range {
        Range {
            kind: r.kind,
            left: self.copy_aux(r.left, map),
            right: if r.kind == RangeKind::Expr {
                self.copy_aux(r.left, map)
            } else {
                self.copy_aux(r.right, map)
            },
        }
    }

    fn copy_params(&mut self, params: &[Param], map: &mut HashMap<NodeId, NodeId>) -> Vec<Param> {
        params
            .iter()
            .map(|p| match p {
                Param::Pos { pos, value } => Param::Pos {
                    pos: *pos,
                    value: self.copy_aux(*value, map),
                },
                Param::Named { name, value } => Param::Named {
                    name: *name,
                    value: self.copy_aux(*value, map),
                },
                Param::Range(r) => Param::Range(self.copy_range(r, map)),
            })
            .collect()
    }

    fn copy_aux(&mut self, t: NodeId, map: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&c) = map.get(&t) {
            return c;
        }

        let copy = self.alloc(self.kind(t));
        map.insert(t, copy);

        let src: Node = self.node(t).clone();
        let mut new = Node::new(src.kind);

        new.loc = src.loc;
        new.ident = src.ident;
        new.ident2 = src.ident2;

        new.ports = src.ports.iter().map(|&c| self.copy_aux(c, map)).collect();
        new.generics = src.generics.iter().map(|&c| self.copy_aux(c, map)).collect();
        new.decls = src.decls.iter().map(|&c| self.copy_aux(c, map)).collect();
        new.stmts = src.stmts.iter().map(|&c| self.copy_aux(c, map)).collect();
        new.else_stmts = src
            .else_stmts
            .iter()
            .map(|&c| self.copy_aux(c, map))
            .collect();
        new.triggers = src.triggers.iter().map(|&c| self.copy_aux(c, map)).collect();
        new.waveforms = src
            .waveforms
            .iter()
            .map(|&c| self.copy_aux(c, map))
            .collect();
        new.contexts = src.contexts.iter().map(|&c| self.copy_aux(c, map)).collect();
        // Drivers are rebuilt by elaboration, never copied

        new.params = self.copy_params(&src.params, map);
        new.genmaps = self.copy_params(&src.genmaps, map);
        new.assocs = src
            .assocs
            .iter()
            .map(|a| crate::node::Assoc {
                choice: match &a.choice {
                    Choice::Pos(p) => Choice::Pos(*p),
                    Choice::Named(n) => Choice::Named(self.copy_aux(*n, map)),
                    Choice::Range(r) => Choice::Range(self.copy_range(r, map)),
                    Choice::Others => Choice::Others,
                },
                value: a.value.map(|v| self.copy_aux(v, map)),
            })
            .collect();

        new.target = src.target.map(|c| self.copy_aux(c, map));
        new.value = src.value.map(|c| self.copy_aux(c, map));
        new.delay = src.delay.map(|c| self.copy_aux(c, map));
        new.message = src.message.map(|c| self.copy_aux(c, map));
        new.severity = src.severity.map(|c| self.copy_aux(c, map));
        new.name = src.name.map(|c| self.copy_aux(c, map));
        new.spec = src.spec.map(|c| self.copy_aux(c, map));
        new.reject = src.reject.map(|c| self.copy_aux(c, map));
        new.guard = src.guard.map(|c| self.copy_aux(c, map));

        // Not followed; fixed up by the caller where it lands in the map
        new.ref_ = src.ref_;

        new.range = src.range.as_ref().map(|r| self.copy_range(r, map));
        new.literal = src.literal.clone();
        new.ty = src.ty.clone();
        new.flags = src.flags;
        // Attribute trees are kept by reference, like refs
        new.attrs = src.attrs.clone();

        new.port_mode = src.port_mode;
        new.class = src.class;
        new.subprog = src.subprog;
        new.attr_kind = src.attr_kind;
        new.pos = src.pos;

        *self.node_mut(copy) = new;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::Kind;
    use crate::node::Literal;
    use crate::types::{Type, TypeKind};
    use larch_base::Ident;

    #[test]
    fn copy_gives_fresh_identity() {
        let mut arena = Arena::new();

        let proc = arena.alloc(Kind::Process);
        arena.set_ident(proc, Ident::new("p"));
        let wait = arena.alloc(Kind::Wait);
        arena.add_stmt(proc, wait);

        let copy = arena.copy(proc);

        assert_ne!(copy, proc);
        assert_eq!(arena.kind(copy), Kind::Process);
        assert_eq!(arena.ident(copy), Ident::new("p"));
        assert_ne!(arena.stmts(copy)[0], wait);
        assert_eq!(arena.kind(arena.stmts(copy)[0]), Kind::Wait);
    }

    #[test]
    fn sharing_is_preserved_within_copy() {
        let mut arena = Arena::new();

        let shared = arena.alloc(Kind::Literal);
        arena.set_literal(shared, Literal::Int(3));

        let w1 = arena.alloc(Kind::Waveform);
        let w2 = arena.alloc(Kind::Waveform);
        arena.set_value(w1, shared);
        arena.set_value(w2, shared);

        let asgn = arena.alloc(Kind::SignalAssign);
        let tgt = arena.alloc(Kind::Ref);
        arena.set_target(asgn, tgt);
        arena.add_waveform(asgn, w1);
        arena.add_waveform(asgn, w2);

        let copy = arena.copy(asgn);
        let cw = arena.waveforms(copy).to_vec();

        assert_eq!(arena.value(cw[0]), arena.value(cw[1]));
        assert_ne!(arena.value(cw[0]), shared);
    }

    #[test]
    fn types_are_shared_not_copied() {
        let mut arena = Arena::new();

        let lit = arena.alloc(Kind::Literal);
        arena.set_literal(lit, Literal::Int(0));
        let ty = Type::new(TypeKind::Integer);
        arena.set_type(lit, ty.clone());

        let copy = arena.copy(lit);
        assert_eq!(arena.type_of(copy), ty);
    }

    #[test]
    fn external_refs_stay_shared_internal_refs_remap() {
        let mut arena = Arena::new();

        // External declaration: referenced but not part of the copied tree
        let ext = arena.alloc(Kind::ConstDecl);
        arena.set_ident(ext, Ident::new("ext"));

        let proc = arena.alloc(Kind::Process);
        // Internal declaration: part of the copied tree
        let var = arena.alloc(Kind::VarDecl);
        arena.set_ident(var, Ident::new("v"));
        arena.add_decl(proc, var);

        let asgn = arena.alloc(Kind::VarAssign);
        let tgt = arena.alloc(Kind::Ref);
        arena.set_ref(tgt, var);
        let val = arena.alloc(Kind::Ref);
        arena.set_ref(val, ext);
        arena.set_target(asgn, tgt);
        arena.set_value(asgn, val);
        arena.add_stmt(proc, asgn);

        let copy = arena.copy(proc);

        let cvar = arena.decls(copy)[0];
        let casgn = arena.stmts(copy)[0];
        assert_ne!(cvar, var);
        assert_eq!(arena.ref_(arena.target(casgn)), cvar);
        assert_eq!(arena.ref_(arena.value(casgn)), ext);
    }

    #[test]
    fn copy_of_copy_is_structurally_equal() {
        let mut arena = Arena::new();

        let proc = arena.alloc(Kind::Process);
        arena.set_ident(proc, Ident::new("p"));
        let var = arena.alloc(Kind::VarDecl);
        arena.set_ident(var, Ident::new("v"));
        arena.add_decl(proc, var);

        let c1 = arena.copy(proc);
        let c2 = arena.copy(c1);

        assert!(crate::eq::structural_eq(&arena, c1, c2));
    }
}
