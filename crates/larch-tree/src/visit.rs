//! Structural traversal with generation-counter idempotence
//!
//! A traversal visits every node reachable through the child slots the
//! node's kind declares, at most once: each traversal takes a fresh
//! generation and stamps nodes as it goes. `deep` traversals additionally
//! follow `ref` edges, attached types, drivers and tree-valued
//! attributes; only the garbage collector uses that mode.

use crate::arena::Arena;
use crate::kind::Kind;
use crate::node::{AttrValue, Choice, NodeId, Param, Range, RangeKind};
use crate::types::{Type, TypeKind};

type VisitFn<'a> = &'a mut dyn FnMut(&mut Arena, NodeId);

impl Arena {
    /// Depth-first post-order walk calling `f` on every node once
    ///
    /// Returns the number of nodes visited.
    pub fn visit(&mut self, root: NodeId, f: VisitFn) -> usize {
        let gen = self.fresh_generation();
        self.visit_aux(root, &mut Some(f), None, gen, false)
    }

    /// Like [`Arena::visit`] but `f` runs only on nodes of `kind`; all
    /// nodes are still traversed and counted against the filter
    pub fn visit_only(&mut self, root: NodeId, f: VisitFn, kind: Kind) -> usize {
        let gen = self.fresh_generation();
        self.visit_aux(root, &mut Some(f), Some(kind), gen, false)
    }

    /// Deep mark for the garbage collector
    pub(crate) fn mark_deep(&mut self, root: NodeId, generation: u32) {
        self.visit_aux(root, &mut None, None, generation, true);
    }

    fn visit_range(&self, r: &Range, out: &mut Vec<NodeId>) {
        out.push(r.left);
        if r.kind != RangeKind::Expr {
            out.push(r.right);
        }
    }

    fn visit_params(&self, params: &[Param], out: &mut Vec<NodeId>) {
        for p in params {
            match p {
                Param::Pos { value, .. } | Param::Named { value, .. } => out.push(*value),
                Param::Range(r) => self.visit_range(r, out),
            }
        }
    }

    /// Children of `t` in traversal order
    fn children(&self, t: NodeId, deep: bool) -> Vec<NodeId> {
        let node = self.node(t);
        let mut out = Vec::new();

        out.extend_from_slice(&node.ports);
        out.extend_from_slice(&node.generics);
        out.extend_from_slice(&node.decls);
        out.extend_from_slice(&node.triggers);
        out.extend_from_slice(&node.stmts);
        out.extend_from_slice(&node.waveforms);

        out.extend(node.value);
        out.extend(node.delay);
        out.extend(node.target);
        out.extend(node.name);
        out.extend(node.spec);
        out.extend(node.reject);
        out.extend(node.guard);
        out.extend(node.severity);
        out.extend(node.message);

        out.extend_from_slice(&node.contexts);

        if deep {
            out.extend(node.ref_);
            out.extend_from_slice(&node.drivers);
        }

        self.visit_params(&node.params, &mut out);
        self.visit_params(&node.genmaps, &mut out);

        for a in &node.assocs {
            match &a.choice {
                Choice::Named(name) => out.push(*name),
                Choice::Range(r) => self.visit_range(r, &mut out),
                Choice::Pos(_) | Choice::Others => {}
            }
            out.extend(a.value);
        }

        if let Some(r) = &node.range {
            self.visit_range(r, &mut out);
        }

        out.extend_from_slice(&node.else_stmts);

        if deep {
            for attr in &node.attrs {
                if let AttrValue::Tree(n) = attr.value {
                    out.push(n);
                }
            }
        }

        out
    }

    fn visit_aux(
        &mut self,
        t: NodeId,
        f: &mut Option<VisitFn>,
        only: Option<Kind>,
        generation: u32,
        deep: bool,
    ) -> usize {
        if self.node(t).generation == generation {
            return 0;
        }
        self.node_mut(t).generation = generation;

        let mut n = 0;
        for child in self.children(t, deep) {
            n += self.visit_aux(child, f, only, generation, deep);
        }

        if deep {
            let ty = self.node(t).ty.clone();
            if let Some(ty) = ty {
                n += self.visit_type(&ty, f, only, generation, deep);
            }
        }

        let kind = self.node(t).kind;
        if only.is_none() || only == Some(kind) {
            if let Some(f) = f {
                f(self, t);
            }
            n += 1;
        }

        n
    }

    fn visit_type(
        &mut self,
        ty: &Type,
        f: &mut Option<VisitFn>,
        only: Option<Kind>,
        generation: u32,
        deep: bool,
    ) -> usize {
        // Collect before recursing so no type borrow is held while the
        // arena is walked
        let mut nodes = Vec::new();
        let mut types = Vec::new();
        {
            let data = ty.data();

            for r in &data.dims {
                self.visit_range(r, &mut nodes);
            }
            nodes.extend_from_slice(&data.enum_lits);
            nodes.extend_from_slice(&data.units);
            nodes.extend_from_slice(&data.fields);
            nodes.extend(data.resolution);

            if let Some(base) = &data.base {
                types.push(base.clone());
            }
            if let Some(elem) = &data.elem {
                types.push(elem.clone());
            }
            if matches!(data.kind, Some(TypeKind::Uarray)) {
                types.extend(data.index_constrs.iter().cloned());
            }
            if let Some(result) = &data.result {
                types.push(result.clone());
            }
        }

        let mut n = 0;
        for node in nodes {
            n += self.visit_aux(node, f, only, generation, deep);
        }
        for t in types {
            n += self.visit_type(&t, f, only, generation, deep);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Assoc;
    use larch_base::Ident;

    fn sample_arch(arena: &mut Arena) -> (NodeId, NodeId, NodeId) {
        let arch = arena.alloc(Kind::Arch);
        arena.set_ident(arch, Ident::new("rtl"));

        let sig = arena.alloc(Kind::SignalDecl);
        arena.set_ident(sig, Ident::new("s"));
        arena.add_decl(arch, sig);

        let proc = arena.alloc(Kind::Process);
        arena.set_ident(proc, Ident::new("p"));
        arena.add_stmt(arch, proc);

        (arch, sig, proc)
    }

    #[test]
    fn visit_reaches_all_children_once() {
        let mut arena = Arena::new();
        let (arch, _, _) = sample_arch(&mut arena);

        let mut seen = Vec::new();
        let count = arena.visit(arch, &mut |a, t| seen.push(a.kind(t)));

        assert_eq!(count, 3);
        assert_eq!(seen.len(), 3);
        // Post-order: the root comes last
        assert_eq!(seen.last(), Some(&Kind::Arch));
    }

    #[test]
    fn shared_nodes_visited_once() {
        let mut arena = Arena::new();
        let arch = arena.alloc(Kind::Arch);
        arena.set_ident(arch, Ident::new("rtl"));

        let c = arena.alloc(Kind::ConstDecl);
        arena.add_decl(arch, c);

        // The same literal shared by two assignments
        let lit = arena.alloc(Kind::Literal);
        for _ in 0..2 {
            let asgn = arena.alloc(Kind::VarAssign);
            let tgt = arena.alloc(Kind::Ref);
            arena.set_target(asgn, tgt);
            arena.set_value(asgn, lit);
            let proc = arena.alloc(Kind::Process);
            arena.add_stmt(proc, asgn);
            arena.add_stmt(arch, proc);
        }

        let mut lits = 0;
        arena.visit(arch, &mut |a, t| {
            if a.kind(t) == Kind::Literal {
                lits += 1;
            }
        });
        assert_eq!(lits, 1);
    }

    #[test]
    fn visit_only_filters_but_still_walks() {
        let mut arena = Arena::new();
        let (arch, _, _) = sample_arch(&mut arena);

        let mut seen = Vec::new();
        let count = arena.visit_only(arch, &mut |_, t| seen.push(t), Kind::Process);

        assert_eq!(count, 1);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn shallow_visit_does_not_follow_refs() {
        let mut arena = Arena::new();

        // A declaration never added to the unit, reachable only via ref
        let hidden = arena.alloc(Kind::ConstDecl);
        arena.set_ident(hidden, Ident::new("k"));

        let arch = arena.alloc(Kind::Arch);
        let proc = arena.alloc(Kind::Process);
        let asgn = arena.alloc(Kind::VarAssign);
        let tgt = arena.alloc(Kind::Ref);
        let r = arena.alloc(Kind::Ref);
        arena.set_ref(r, hidden);
        arena.set_target(asgn, tgt);
        arena.set_value(asgn, r);
        arena.add_stmt(proc, asgn);
        arena.add_stmt(arch, proc);

        let mut consts = 0;
        arena.visit(arch, &mut |a, t| {
            if a.kind(t) == Kind::ConstDecl {
                consts += 1;
            }
        });
        assert_eq!(consts, 0);
    }

    #[test]
    fn aggregate_assocs_are_traversed() {
        let mut arena = Arena::new();
        let agg = arena.alloc(Kind::Aggregate);
        let name = arena.alloc(Kind::Literal);
        let value = arena.alloc(Kind::Literal);

        arena.add_assoc(
            agg,
            Assoc {
                choice: Choice::Named(name),
                value: Some(value),
            },
        );

        let mut count = 0;
        arena.visit(agg, &mut |_, _| count += 1);
        assert_eq!(count, 3);
    }
}
