//! Structural equality over node graphs
//!
//! Two graphs are structurally equal when they have the same shape slot
//! by slot and the same sharing: wherever one graph reuses a node, the
//! other must reuse the corresponding node. Attached types are compared
//! structurally by kind, shape and name, not by identity, so that
//! serialization round-trips compare equal.

use std::collections::HashMap;

use crate::arena::Arena;
use crate::node::{AttrValue, Choice, NodeId, Param, Range};
use crate::types::Type;

struct Cmp<'a> {
    arena: &'a Arena,
    // Sharing map: node in graph A -> node in graph B
    map: HashMap<NodeId, NodeId>,
}

/// Compare the graphs rooted at `a` and `b` within one arena
pub fn structural_eq(arena: &Arena, a: NodeId, b: NodeId) -> bool {
    let mut cmp = Cmp {
        arena,
        map: HashMap::new(),
    };
    cmp.nodes(Some(a), Some(b))
}

impl Cmp<'_> {
    fn nodes(&mut self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        let (a, b) = match (a, b) {
            (None, None) => return true,
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        // Sharing must correspond
        if let Some(&seen) = self.map.get(&a) {
            return seen == b;
        }
        self.map.insert(a, b);

        let na = self.arena.node(a);
        let nb = self.arena.node(b);

        if na.kind != nb.kind
            || na.ident != nb.ident
            || na.ident2 != nb.ident2
            || na.flags != nb.flags
            || na.literal != nb.literal
            || na.port_mode != nb.port_mode
            || na.class != nb.class
            || na.subprog != nb.subprog
            || na.attr_kind != nb.attr_kind
            || na.pos != nb.pos
        {
            return false;
        }

        let seqs = [
            (&na.ports, &nb.ports),
            (&na.generics, &nb.generics),
            (&na.decls, &nb.decls),
            (&na.stmts, &nb.stmts),
            (&na.else_stmts, &nb.else_stmts),
            (&na.triggers, &nb.triggers),
            (&na.waveforms, &nb.waveforms),
            (&na.drivers, &nb.drivers),
            (&na.contexts, &nb.contexts),
        ];
        for (sa, sb) in seqs {
            if sa.len() != sb.len() {
                return false;
            }
        }

        let singles = [
            (na.target, nb.target),
            (na.value, nb.value),
            (na.delay, nb.delay),
            (na.message, nb.message),
            (na.severity, nb.severity),
            (na.ref_, nb.ref_),
            (na.name, nb.name),
            (na.spec, nb.spec),
            (na.reject, nb.reject),
            (na.guard, nb.guard),
        ];

        let params_a = na.params.clone();
        let params_b = nb.params.clone();
        let genmaps_a = na.genmaps.clone();
        let genmaps_b = nb.genmaps.clone();
        let assocs_a = na.assocs.clone();
        let assocs_b = nb.assocs.clone();
        let range_a = na.range;
        let range_b = nb.range;
        let ty_a = na.ty.clone();
        let ty_b = nb.ty.clone();
        let attrs_a: Vec<_> = na.attrs.clone();
        let attrs_b: Vec<_> = nb.attrs.clone();

        let seq_pairs: Vec<(Vec<NodeId>, Vec<NodeId>)> = seqs
            .iter()
            .map(|(sa, sb)| ((*sa).clone(), (*sb).clone()))
            .collect();

        for (sa, sb) in seq_pairs {
            for (&ca, &cb) in sa.iter().zip(sb.iter()) {
                if !self.nodes(Some(ca), Some(cb)) {
                    return false;
                }
            }
        }

        for (ca, cb) in singles {
            if !self.nodes(ca, cb) {
                return false;
            }
        }

        if !self.params(&params_a, &params_b) || !self.params(&genmaps_a, &genmaps_b) {
            return false;
        }

        if assocs_a.len() != assocs_b.len() {
            return false;
        }
        for (aa, ab) in assocs_a.iter().zip(assocs_b.iter()) {
            let choices_eq = match (&aa.choice, &ab.choice) {
                (Choice::Pos(x), Choice::Pos(y)) => x == y,
                (Choice::Named(x), Choice::Named(y)) => self.nodes(Some(*x), Some(*y)),
                (Choice::Range(x), Choice::Range(y)) => self.ranges(x, y),
                (Choice::Others, Choice::Others) => true,
                _ => false,
            };
            if !choices_eq || !self.nodes(aa.value, ab.value) {
                return false;
            }
        }

        match (range_a, range_b) {
            (None, None) => {}
            (Some(ra), Some(rb)) => {
                if !self.ranges(&ra, &rb) {
                    return false;
                }
            }
            _ => return false,
        }

        match (ty_a, ty_b) {
            (None, None) => {}
            (Some(ta), Some(tb)) => {
                if !self.types(&ta, &tb) {
                    return false;
                }
            }
            _ => return false,
        }

        if attrs_a.len() != attrs_b.len() {
            return false;
        }
        for (aa, ab) in attrs_a.iter().zip(attrs_b.iter()) {
            if aa.name != ab.name {
                return false;
            }
            let eq = match (&aa.value, &ab.value) {
                (AttrValue::Str(x), AttrValue::Str(y)) => x == y,
                (AttrValue::Int(x), AttrValue::Int(y)) => x == y,
                (AttrValue::Tree(x), AttrValue::Tree(y)) => self.nodes(Some(*x), Some(*y)),
                (AttrValue::Ptr(_), AttrValue::Ptr(_)) => true,
                _ => false,
            };
            if !eq {
                return false;
            }
        }

        true
    }

    fn params(&mut self, a: &[Param], b: &[Param]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).all(|(pa, pb)| match (pa, pb) {
            (Param::Pos { pos: xa, value: va }, Param::Pos { pos: xb, value: vb }) => {
                xa == xb && self.nodes(Some(*va), Some(*vb))
            }
            (
                Param::Named { name: na, value: va },
                Param::Named { name: nb, value: vb },
            ) => na == nb && self.nodes(Some(*va), Some(*vb)),
            (Param::Range(ra), Param::Range(rb)) => self.ranges(ra, rb),
            _ => false,
        })
    }

    fn ranges(&mut self, a: &Range, b: &Range) -> bool {
        a.kind == b.kind
            && self.nodes(Some(a.left), Some(b.left))
            && self.nodes(Some(a.right), Some(b.right))
    }

    fn types(&mut self, a: &Type, b: &Type) -> bool {
        if a == b {
            return true;
        }

        let da = a.data();
        let db = b.data();

        if da.kind != db.kind || da.ident != db.ident {
            return false;
        }
        if da.dims.len() != db.dims.len()
            || da.enum_lits.len() != db.enum_lits.len()
            || da.index_constrs.len() != db.index_constrs.len()
            || da.units.len() != db.units.len()
            || da.fields.len() != db.fields.len()
        {
            return false;
        }

        let dims: Vec<_> = da.dims.iter().cloned().zip(db.dims.iter().cloned()).collect();
        let lits: Vec<_> = da
            .enum_lits
            .iter()
            .copied()
            .zip(db.enum_lits.iter().copied())
            .collect();
        let bases = (da.base.clone(), db.base.clone());
        let elems = (da.elem.clone(), db.elem.clone());
        drop(da);
        drop(db);

        for (ra, rb) in dims {
            if !self.ranges(&ra, &rb) {
                return false;
            }
        }
        for (la, lb) in lits {
            if !self.nodes(Some(la), Some(lb)) {
                return false;
            }
        }

        match bases {
            (None, None) => {}
            (Some(ba), Some(bb)) => {
                if !self.types(&ba, &bb) {
                    return false;
                }
            }
            _ => return false,
        }
        match elems {
            (None, None) => true,
            (Some(ea), Some(eb)) => self.types(&ea, &eb),
            _ => false,
        }
    }
}
