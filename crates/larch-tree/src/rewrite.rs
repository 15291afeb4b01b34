//! Post-order structural rewriting
//!
//! For every node the rewriter first rewrites each child-bearing slot,
//! replacing the slot contents with the callback's output; a `None`
//! result removes the element from sequence slots. The callback then
//! runs on the node itself and its result replaces the node in its
//! parent. Each node is rewritten at most once per pass: shared nodes
//! are memoized on first encounter.
//!
//! Attached types are not rewritten, with one exception: the dimension
//! bounds of a type declaration's integer/physical/array type, which
//! hold ordinary expression nodes.

use std::collections::HashMap;
use std::mem;

use crate::arena::Arena;
use crate::kind::Kind;
use crate::node::{Choice, NodeId, Param, RangeKind};
use crate::types::TypeKind;

type PreFn<'a, C> = &'a mut dyn FnMut(&mut Arena, NodeId, &mut C);
type PostFn<'a, C> = &'a mut dyn FnMut(&mut Arena, NodeId, &mut C) -> Option<NodeId>;

struct Rewriter<'a, C> {
    pre: Option<PreFn<'a, C>>,
    post: PostFn<'a, C>,
    done: HashMap<NodeId, Option<NodeId>>,
}

impl Arena {
    /// Rewrite the graph rooted at `root`
    ///
    /// `pre` runs on descent, before a node's children are rewritten;
    /// `post` runs after and its result replaces the node. Returns the
    /// replacement for `root` itself.
    pub fn rewrite<'a, C>(
        &mut self,
        root: NodeId,
        pre: Option<PreFn<'a, C>>,
        post: PostFn<'a, C>,
        ctx: &mut C,
    ) -> Option<NodeId> {
        // Rewriting participates in the same ordering discipline as
        // traversal: one fresh generation per top-level operation
        let _ = self.fresh_generation();

        let mut rw = Rewriter {
            pre,
            post,
            done: HashMap::new(),
        };
        self.rewrite_aux(root, &mut rw, ctx)
    }

    fn rewrite_expr<C>(
        &mut self,
        t: NodeId,
        rw: &mut Rewriter<'_, C>,
        ctx: &mut C,
    ) -> NodeId {
        self.rewrite_aux(t, rw, ctx)
            .expect("expression deleted during rewrite")
    }

    fn rewrite_seq<C>(&mut self, items: &mut Vec<NodeId>, rw: &mut Rewriter<'_, C>, ctx: &mut C) {
        let taken = mem::take(items);
        *items = taken
            .into_iter()
            .filter_map(|t| self.rewrite_aux(t, rw, ctx))
            .collect();
    }

    fn rewrite_params<C>(
        &mut self,
        params: &mut [Param],
        rw: &mut Rewriter<'_, C>,
        ctx: &mut C,
    ) {
        for p in params.iter_mut() {
            match p {
                Param::Pos { value, .. } | Param::Named { value, .. } => {
                    *value = self.rewrite_expr(*value, rw, ctx);
                }
                Param::Range(r) => {
                    r.left = self.rewrite_expr(r.left, rw, ctx);
                    if r.kind != RangeKind::Expr {
                        r.right = self.rewrite_expr(r.right, rw, ctx);
                    }
                }
            }
        }
    }

    fn rewrite_aux<C>(
        &mut self,
        t: NodeId,
        rw: &mut Rewriter<'_, C>,
        ctx: &mut C,
    ) -> Option<NodeId> {
        if let Some(&result) = rw.done.get(&t) {
            return result;
        }

        if let Some(pre) = rw.pre.as_mut() {
            pre(self, t, ctx);
        }

        // Sequence slots: a None result deletes the element
        let mut generics = mem::take(&mut self.node_mut(t).generics);
        self.rewrite_seq(&mut generics, rw, ctx);
        self.node_mut(t).generics = generics;

        let mut ports = mem::take(&mut self.node_mut(t).ports);
        self.rewrite_seq(&mut ports, rw, ctx);
        self.node_mut(t).ports = ports;

        let mut decls = mem::take(&mut self.node_mut(t).decls);
        self.rewrite_seq(&mut decls, rw, ctx);
        self.node_mut(t).decls = decls;

        let mut triggers = mem::take(&mut self.node_mut(t).triggers);
        self.rewrite_seq(&mut triggers, rw, ctx);
        self.node_mut(t).triggers = triggers;

        let mut stmts = mem::take(&mut self.node_mut(t).stmts);
        self.rewrite_seq(&mut stmts, rw, ctx);
        self.node_mut(t).stmts = stmts;

        let mut waveforms = mem::take(&mut self.node_mut(t).waveforms);
        self.rewrite_seq(&mut waveforms, rw, ctx);
        self.node_mut(t).waveforms = waveforms;

        let mut else_stmts = mem::take(&mut self.node_mut(t).else_stmts);
        self.rewrite_seq(&mut else_stmts, rw, ctx);
        self.node_mut(t).else_stmts = else_stmts;

        let mut contexts = mem::take(&mut self.node_mut(t).contexts);
        self.rewrite_seq(&mut contexts, rw, ctx);
        self.node_mut(t).contexts = contexts;

        // Single-child slots
        macro_rules! rewrite_single {
            ($slot:ident) => {
                if let Some(child) = self.node(t).$slot {
                    let new = self.rewrite_aux(child, rw, ctx);
                    self.node_mut(t).$slot = new;
                }
            };
        }
        rewrite_single!(target);
        rewrite_single!(value);
        rewrite_single!(delay);
        rewrite_single!(name);
        rewrite_single!(spec);
        rewrite_single!(reject);
        rewrite_single!(guard);
        rewrite_single!(severity);
        rewrite_single!(message);

        let mut params = mem::take(&mut self.node_mut(t).params);
        self.rewrite_params(&mut params, rw, ctx);
        self.node_mut(t).params = params;

        let mut genmaps = mem::take(&mut self.node_mut(t).genmaps);
        self.rewrite_params(&mut genmaps, rw, ctx);
        self.node_mut(t).genmaps = genmaps;

        if let Some(mut r) = self.node(t).range {
            r.left = self.rewrite_expr(r.left, rw, ctx);
            if r.kind != RangeKind::Expr {
                r.right = self.rewrite_expr(r.right, rw, ctx);
            }
            self.node_mut(t).range = Some(r);
        }

        // Associations: rewriting a value to None deletes the element
        let mut assocs = mem::take(&mut self.node_mut(t).assocs);
        assocs.retain_mut(|a| {
            match &mut a.choice {
                Choice::Named(name) => *name = self.rewrite_expr(*name, rw, ctx),
                Choice::Range(r) => {
                    r.left = self.rewrite_expr(r.left, rw, ctx);
                    if r.kind != RangeKind::Expr {
                        r.right = self.rewrite_expr(r.right, rw, ctx);
                    }
                }
                Choice::Pos(_) | Choice::Others => {}
            }
            match a.value {
                Some(v) => {
                    a.value = self.rewrite_aux(v, rw, ctx);
                    a.value.is_some()
                }
                None => true,
            }
        });
        self.node_mut(t).assocs = assocs;

        // Bounds inside a declared type are expression nodes too
        if self.node(t).kind == Kind::TypeDecl {
            if let Some(ty) = self.node(t).ty.clone() {
                if matches!(
                    ty.kind(),
                    TypeKind::Integer | TypeKind::Physical | TypeKind::Carray
                ) {
                    let dims = ty.data().dims.clone();
                    let mut new_dims = dims;
                    for r in new_dims.iter_mut() {
                        r.left = self.rewrite_expr(r.left, rw, ctx);
                        if r.kind != RangeKind::Expr {
                            r.right = self.rewrite_expr(r.right, rw, ctx);
                        }
                    }
                    ty.data_mut().dims = new_dims;
                }
            }
        }

        let result = (rw.post)(self, t, ctx);
        rw.done.insert(t, result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Literal;
    use larch_base::Ident;

    #[test]
    fn post_order_replacement() {
        let mut arena = Arena::new();

        let proc = arena.alloc(Kind::Process);
        arena.set_ident(proc, Ident::new("p"));
        let null = arena.alloc(Kind::Null);
        let asgn = arena.alloc(Kind::VarAssign);
        let tgt = arena.alloc(Kind::Ref);
        let val = arena.alloc(Kind::Literal);
        arena.set_literal(val, Literal::Int(1));
        arena.set_target(asgn, tgt);
        arena.set_value(asgn, val);
        arena.add_stmt(proc, null);
        arena.add_stmt(proc, asgn);

        // Delete null statements
        let result = arena.rewrite(
            proc,
            None,
            &mut |a, t, _| {
                if a.kind(t) == Kind::Null {
                    None
                } else {
                    Some(t)
                }
            },
            &mut (),
        );

        assert_eq!(result, Some(proc));
        assert_eq!(arena.stmts(proc), &[asgn]);
    }

    #[test]
    fn child_replacement_lands_in_parent_slot() {
        let mut arena = Arena::new();

        let asgn = arena.alloc(Kind::VarAssign);
        let tgt = arena.alloc(Kind::Ref);
        let old = arena.alloc(Kind::Literal);
        arena.set_literal(old, Literal::Int(1));
        arena.set_target(asgn, tgt);
        arena.set_value(asgn, old);

        let fresh = arena.alloc(Kind::Literal);
        arena.set_literal(fresh, Literal::Int(2));

        arena.rewrite(
            asgn,
            None,
            &mut |a, t, new: &mut NodeId| {
                if a.kind(t) == Kind::Literal && t != *new {
                    Some(*new)
                } else {
                    Some(t)
                }
            },
            &mut { fresh },
        );

        assert_eq!(arena.value(asgn), fresh);
    }

    #[test]
    fn shared_nodes_rewritten_once() {
        let mut arena = Arena::new();

        let shared = arena.alloc(Kind::Literal);
        arena.set_literal(shared, Literal::Int(5));

        let w1 = arena.alloc(Kind::Waveform);
        let w2 = arena.alloc(Kind::Waveform);
        arena.set_value(w1, shared);
        arena.set_value(w2, shared);

        let asgn = arena.alloc(Kind::SignalAssign);
        let tgt = arena.alloc(Kind::Ref);
        arena.set_target(asgn, tgt);
        arena.add_waveform(asgn, w1);
        arena.add_waveform(asgn, w2);

        let mut calls = 0usize;
        arena.rewrite(
            asgn,
            None,
            &mut |a, t, calls: &mut usize| {
                if a.kind(t) == Kind::Literal {
                    *calls += 1;
                }
                Some(t)
            },
            &mut calls,
        );

        assert_eq!(calls, 1);
    }

    #[test]
    fn pre_hook_runs_before_children() {
        let mut arena = Arena::new();

        let blk = arena.alloc(Kind::Block);
        arena.set_ident(blk, Ident::new("b"));
        let inner = arena.alloc(Kind::Null);
        arena.add_stmt(blk, inner);

        let mut order = Vec::new();
        arena.rewrite(
            blk,
            Some(&mut |a: &mut Arena, t: NodeId, order: &mut Vec<String>| {
                order.push(format!("pre {}", a.kind(t)));
            }),
            &mut |a, t, order: &mut Vec<String>| {
                order.push(format!("post {}", a.kind(t)));
                Some(t)
            },
            &mut order,
        );

        assert_eq!(
            order,
            vec!["pre Block", "pre Null", "post Null", "post Block"]
        );
    }
}
