//! The node arena: allocation, slot access and garbage collection
//!
//! Every node lives in an arena and is addressed by a [`NodeId`]. Slot
//! accessors check the kind's slot mask; reading a slot the kind does not
//! declare, or storing a value of the wrong category, is a program bug
//! and panics.

use std::any::Any;
use std::rc::Rc;

use larch_base::Ident;
use larch_diag::Loc;
use tracing::debug;

use crate::kind::{slots, Kind, SlotMask};
use crate::node::{
    Assoc, Attr, AttrKind, AttrValue, Choice, Class, Flags, Literal, Node, NodeId, Param,
    PortMode, Range, SubprogKind, MAX_ATTRS,
};
use crate::types::Type;

/// Owns every tree node in a compilation session
#[derive(Default)]
pub struct Arena {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    next_generation: u32,
}

impl Arena {
    pub fn new() -> Arena {
        Arena {
            nodes: Vec::new(),
            free: Vec::new(),
            next_generation: 1,
        }
    }

    /// Allocate a node with all slots cleared to their defaults
    pub fn alloc(&mut self, kind: Kind) -> NodeId {
        let node = Node::new(kind);
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() as u32 - 1)
            }
        }
    }

    /// Number of live nodes
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub(crate) fn node(&self, t: NodeId) -> &Node {
        self.nodes[t.0 as usize]
            .as_ref()
            .expect("use of node freed by gc")
    }

    pub(crate) fn node_mut(&mut self, t: NodeId) -> &mut Node {
        self.nodes[t.0 as usize]
            .as_mut()
            .expect("use of node freed by gc")
    }

    pub(crate) fn fresh_generation(&mut self) -> u32 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }

    fn check(&self, t: NodeId, slot: SlotMask) -> &Node {
        let node = self.node(t);
        assert!(
            slots(node.kind).contains(slot),
            "tree kind {} does not have slot {:?}",
            node.kind,
            slot
        );
        node
    }

    fn check_mut(&mut self, t: NodeId, slot: SlotMask) -> &mut Node {
        let kind = self.node(t).kind;
        assert!(
            slots(kind).contains(slot),
            "tree kind {kind} does not have slot {slot:?}"
        );
        self.node_mut(t)
    }

    // ------------------------------------------------------------------
    // Kind and location

    pub fn kind(&self, t: NodeId) -> Kind {
        self.node(t).kind
    }

    /// Change the kind in place; used only by late passes
    pub fn change_kind(&mut self, t: NodeId, kind: Kind) {
        self.node_mut(t).kind = kind;
    }

    pub fn loc(&self, t: NodeId) -> Loc {
        self.node(t).loc
    }

    pub fn set_loc(&mut self, t: NodeId, loc: Loc) {
        self.node_mut(t).loc = loc;
    }

    // ------------------------------------------------------------------
    // Identifiers

    pub fn ident(&self, t: NodeId) -> Ident {
        self.check(t, SlotMask::IDENT)
            .ident
            .expect("node has no ident")
    }

    pub fn has_ident(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::IDENT).ident.is_some()
    }

    pub fn set_ident(&mut self, t: NodeId, i: Ident) {
        self.check_mut(t, SlotMask::IDENT).ident = Some(i);
    }

    pub fn ident2(&self, t: NodeId) -> Ident {
        self.check(t, SlotMask::IDENT2)
            .ident2
            .expect("node has no ident2")
    }

    pub fn has_ident2(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::IDENT2).ident2.is_some()
    }

    pub fn set_ident2(&mut self, t: NodeId, i: Ident) {
        self.check_mut(t, SlotMask::IDENT2).ident2 = Some(i);
    }

    // ------------------------------------------------------------------
    // Node sequences

    pub fn ports(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::PORTS).ports
    }

    pub fn add_port(&mut self, t: NodeId, d: NodeId) {
        assert!(self.kind(d).is_decl(), "port must be a declaration");
        self.check_mut(t, SlotMask::PORTS).ports.push(d);
    }

    pub fn generics(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::GENERICS).generics
    }

    pub fn add_generic(&mut self, t: NodeId, d: NodeId) {
        assert!(self.kind(d).is_decl(), "generic must be a declaration");
        self.check_mut(t, SlotMask::GENERICS).generics.push(d);
    }

    pub fn decls(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::DECLS).decls
    }

    pub fn add_decl(&mut self, t: NodeId, d: NodeId) {
        assert!(self.kind(d).is_decl(), "not a declaration kind");
        self.check_mut(t, SlotMask::DECLS).decls.push(d);
    }

    pub fn stmts(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::STMTS).stmts
    }

    pub fn add_stmt(&mut self, t: NodeId, s: NodeId) {
        assert!(self.kind(s).is_stmt(), "not a statement kind");
        self.check_mut(t, SlotMask::STMTS).stmts.push(s);
    }

    pub fn else_stmts(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::ELSE_STMTS).else_stmts
    }

    pub fn add_else_stmt(&mut self, t: NodeId, s: NodeId) {
        assert!(self.kind(s).is_stmt(), "not a statement kind");
        self.check_mut(t, SlotMask::ELSE_STMTS).else_stmts.push(s);
    }

    pub fn triggers(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::TRIGGERS).triggers
    }

    pub fn add_trigger(&mut self, t: NodeId, e: NodeId) {
        assert!(self.kind(e).is_expr(), "trigger must be an expression");
        self.check_mut(t, SlotMask::TRIGGERS).triggers.push(e);
    }

    pub fn waveforms(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::WAVEFORMS).waveforms
    }

    pub fn add_waveform(&mut self, t: NodeId, w: NodeId) {
        assert_eq!(self.kind(w), Kind::Waveform);
        self.check_mut(t, SlotMask::WAVEFORMS).waveforms.push(w);
    }

    pub fn drivers(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::DRIVERS).drivers
    }

    pub fn add_driver(&mut self, t: NodeId, p: NodeId) {
        assert_eq!(self.kind(p), Kind::Process);
        self.check_mut(t, SlotMask::DRIVERS).drivers.push(p);
    }

    pub fn contexts(&self, t: NodeId) -> &[NodeId] {
        &self.check(t, SlotMask::CONTEXTS).contexts
    }

    pub fn add_context(&mut self, t: NodeId, c: NodeId) {
        assert!(
            matches!(self.kind(c), Kind::Use | Kind::Library | Kind::CtxRef),
            "not a context item"
        );
        self.check_mut(t, SlotMask::CONTEXTS).contexts.push(c);
    }

    // ------------------------------------------------------------------
    // Parameter and association lists

    pub fn params(&self, t: NodeId) -> &[Param] {
        &self.check(t, SlotMask::PARAMS).params
    }

    /// Append a parameter; a positional parameter is stamped with its
    /// index in the list
    pub fn add_param(&mut self, t: NodeId, mut p: Param) {
        if let Some(value) = p.value() {
            assert!(self.kind(value).is_expr(), "param value must be expression");
        }
        let node = self.check_mut(t, SlotMask::PARAMS);
        if let Param::Pos { pos, .. } = &mut p {
            *pos = node.params.len() as u32;
        }
        node.params.push(p);
    }

    pub fn genmaps(&self, t: NodeId) -> &[Param] {
        &self.check(t, SlotMask::GENMAPS).genmaps
    }

    pub fn add_genmap(&mut self, t: NodeId, mut p: Param) {
        if let Some(value) = p.value() {
            assert!(self.kind(value).is_expr(), "genmap value must be expression");
        }
        let node = self.check_mut(t, SlotMask::GENMAPS);
        if let Param::Pos { pos, .. } = &mut p {
            *pos = node.genmaps.len() as u32;
        }
        node.genmaps.push(p);
    }

    pub fn assocs(&self, t: NodeId) -> &[Assoc] {
        &self.check(t, SlotMask::ASSOCS).assocs
    }

    /// Append an association; a positional choice is stamped with the
    /// count of positional choices before it
    pub fn add_assoc(&mut self, t: NodeId, mut a: Assoc) {
        let node = self.check_mut(t, SlotMask::ASSOCS);
        if let Choice::Pos(pos) = &mut a.choice {
            *pos = node
                .assocs
                .iter()
                .filter(|a| matches!(a.choice, Choice::Pos(_)))
                .count() as u32;
        }
        node.assocs.push(a);
    }

    // ------------------------------------------------------------------
    // Single-child slots

    pub fn target(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::TARGET)
            .target
            .expect("node has no target")
    }

    pub fn set_target(&mut self, t: NodeId, lhs: NodeId) {
        self.check_mut(t, SlotMask::TARGET).target = Some(lhs);
    }

    pub fn value(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::VALUE)
            .value
            .expect("node has no value")
    }

    pub fn has_value(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::VALUE).value.is_some()
    }

    pub fn set_value(&mut self, t: NodeId, v: NodeId) {
        assert!(self.kind(v).is_expr(), "value must be an expression");
        self.check_mut(t, SlotMask::VALUE).value = Some(v);
    }

    pub fn delay(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::DELAY)
            .delay
            .expect("node has no delay")
    }

    pub fn has_delay(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::DELAY).delay.is_some()
    }

    pub fn set_delay(&mut self, t: NodeId, d: NodeId) {
        assert!(self.kind(d).is_expr(), "delay must be an expression");
        self.check_mut(t, SlotMask::DELAY).delay = Some(d);
    }

    pub fn message(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::MESSAGE)
            .message
            .expect("node has no message")
    }

    pub fn has_message(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::MESSAGE).message.is_some()
    }

    pub fn set_message(&mut self, t: NodeId, m: NodeId) {
        assert!(self.kind(m).is_expr(), "message must be an expression");
        self.check_mut(t, SlotMask::MESSAGE).message = Some(m);
    }

    pub fn severity(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::SEVERITY)
            .severity
            .expect("node has no severity")
    }

    pub fn has_severity(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::SEVERITY).severity.is_some()
    }

    pub fn set_severity(&mut self, t: NodeId, s: NodeId) {
        assert!(self.kind(s).is_expr(), "severity must be an expression");
        self.check_mut(t, SlotMask::SEVERITY).severity = Some(s);
    }

    pub fn ref_(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::REF).ref_.expect("node has no ref")
    }

    pub fn has_ref(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::REF).ref_.is_some()
    }

    pub fn set_ref(&mut self, t: NodeId, decl: NodeId) {
        let dk = self.kind(decl);
        assert!(
            dk.is_decl() || dk == Kind::EnumLit || dk.is_top_level(),
            "ref target {dk} is not a declaration"
        );
        self.check_mut(t, SlotMask::REF).ref_ = Some(decl);
    }

    /// Remove a reference; used when a physical literal is rebased onto
    /// its base unit
    pub fn clear_ref(&mut self, t: NodeId) {
        self.check_mut(t, SlotMask::REF).ref_ = None;
    }

    pub fn name(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::NAME).name.expect("node has no name")
    }

    pub fn has_name(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::NAME).name.is_some()
    }

    pub fn set_name(&mut self, t: NodeId, n: NodeId) {
        assert!(self.kind(n).is_expr(), "name must be an expression");
        self.check_mut(t, SlotMask::NAME).name = Some(n);
    }

    pub fn spec(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::SPEC).spec.expect("node has no spec")
    }

    pub fn has_spec(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::SPEC).spec.is_some()
    }

    pub fn set_spec(&mut self, t: NodeId, s: NodeId) {
        self.check_mut(t, SlotMask::SPEC).spec = Some(s);
    }

    pub fn reject(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::REJECT)
            .reject
            .expect("node has no reject")
    }

    pub fn has_reject(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::REJECT).reject.is_some()
    }

    pub fn set_reject(&mut self, t: NodeId, r: NodeId) {
        assert!(self.kind(r).is_expr(), "reject must be an expression");
        self.check_mut(t, SlotMask::REJECT).reject = Some(r);
    }

    pub fn guard(&self, t: NodeId) -> NodeId {
        self.check(t, SlotMask::GUARD)
            .guard
            .expect("node has no guard")
    }

    pub fn has_guard(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::GUARD).guard.is_some()
    }

    pub fn set_guard(&mut self, t: NodeId, g: NodeId) {
        assert!(self.kind(g).is_expr(), "guard must be an expression");
        self.check_mut(t, SlotMask::GUARD).guard = Some(g);
    }

    // ------------------------------------------------------------------
    // Ranges, literals, types, flags

    pub fn range(&self, t: NodeId) -> Range {
        self.check(t, SlotMask::RANGE)
            .range
            .expect("node has no range")
    }

    pub fn set_range(&mut self, t: NodeId, r: Range) {
        self.check_mut(t, SlotMask::RANGE).range = Some(r);
    }

    pub fn literal(&self, t: NodeId) -> Literal {
        self.check(t, SlotMask::LITERAL)
            .literal
            .clone()
            .expect("node has no literal")
    }

    pub fn set_literal(&mut self, t: NodeId, lit: Literal) {
        self.check_mut(t, SlotMask::LITERAL).literal = Some(lit);
    }

    pub fn type_of(&self, t: NodeId) -> Type {
        self.check(t, SlotMask::TYPE)
            .ty
            .clone()
            .expect("node has no type")
    }

    pub fn has_type(&self, t: NodeId) -> bool {
        self.check(t, SlotMask::TYPE).ty.is_some()
    }

    pub fn set_type(&mut self, t: NodeId, ty: Type) {
        self.check_mut(t, SlotMask::TYPE).ty = Some(ty);
    }

    pub fn flags(&self, t: NodeId) -> Flags {
        self.node(t).flags
    }

    /// Set flags; flags are never cleared
    pub fn set_flag(&mut self, t: NodeId, f: Flags) {
        self.node_mut(t).flags |= f;
    }

    // ------------------------------------------------------------------
    // Kind-specific extras

    pub fn port_mode(&self, t: NodeId) -> PortMode {
        assert_eq!(self.kind(t), Kind::PortDecl);
        self.node(t).port_mode.expect("port mode not set")
    }

    pub fn set_port_mode(&mut self, t: NodeId, mode: PortMode) {
        assert_eq!(self.kind(t), Kind::PortDecl);
        self.node_mut(t).port_mode = Some(mode);
    }

    /// Port mode without the set-before-read contract, for interface
    /// objects that leave it defaulted
    pub fn port_mode_opt(&self, t: NodeId) -> Option<PortMode> {
        assert_eq!(self.kind(t), Kind::PortDecl);
        self.node(t).port_mode
    }

    pub fn class(&self, t: NodeId) -> Class {
        assert_eq!(self.kind(t), Kind::PortDecl);
        self.node(t).class.unwrap_or(Class::Signal)
    }

    pub fn set_class(&mut self, t: NodeId, class: Class) {
        assert_eq!(self.kind(t), Kind::PortDecl);
        self.node_mut(t).class = Some(class);
    }

    pub fn pos(&self, t: NodeId) -> u32 {
        assert_eq!(self.kind(t), Kind::EnumLit);
        self.node(t).pos
    }

    pub fn set_pos(&mut self, t: NodeId, pos: u32) {
        assert_eq!(self.kind(t), Kind::EnumLit);
        self.node_mut(t).pos = pos;
    }

    pub fn subprog_kind(&self, t: NodeId) -> SubprogKind {
        assert!(self.kind(t).is_subprogram());
        self.node(t).subprog.unwrap_or(SubprogKind::User)
    }

    pub fn set_subprog_kind(&mut self, t: NodeId, sk: SubprogKind) {
        assert!(self.kind(t).is_subprogram());
        self.node_mut(t).subprog = Some(sk);
    }

    pub fn attr_kind(&self, t: NodeId) -> Option<AttrKind> {
        assert_eq!(self.kind(t), Kind::AttrRef);
        self.node(t).attr_kind
    }

    pub fn set_attr_kind(&mut self, t: NodeId, ak: AttrKind) {
        assert_eq!(self.kind(t), Kind::AttrRef);
        self.node_mut(t).attr_kind = Some(ak);
    }

    // ------------------------------------------------------------------
    // Auxiliary attributes

    fn find_attr(&self, t: NodeId, name: Ident, tag: u8) -> Option<&AttrValue> {
        self.node(t)
            .attrs
            .iter()
            .find(|a| a.name == name && a.value.tag() == tag)
            .map(|a| &a.value)
    }

    fn put_attr(&mut self, t: NodeId, name: Ident, value: AttrValue) {
        let node = self.node_mut(t);
        if let Some(a) = node
            .attrs
            .iter_mut()
            .find(|a| a.name == name && a.value.tag() == value.tag())
        {
            a.value = value;
            return;
        }
        assert!(node.attrs.len() < MAX_ATTRS, "too many attributes");
        node.attrs.push(Attr { name, value });
    }

    pub fn add_attr_str(&mut self, t: NodeId, name: Ident, s: &str) {
        self.put_attr(t, name, AttrValue::Str(s.to_owned()));
    }

    pub fn attr_str(&self, t: NodeId, name: Ident) -> Option<String> {
        match self.find_attr(t, name, 0) {
            Some(AttrValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn add_attr_int(&mut self, t: NodeId, name: Ident, n: i64) {
        self.put_attr(t, name, AttrValue::Int(n));
    }

    pub fn attr_int(&self, t: NodeId, name: Ident, def: i64) -> i64 {
        match self.find_attr(t, name, 1) {
            Some(AttrValue::Int(n)) => *n,
            _ => def,
        }
    }

    pub fn add_attr_tree(&mut self, t: NodeId, name: Ident, val: NodeId) {
        self.put_attr(t, name, AttrValue::Tree(val));
    }

    pub fn attr_tree(&self, t: NodeId, name: Ident) -> Option<NodeId> {
        match self.find_attr(t, name, 2) {
            Some(AttrValue::Tree(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn add_attr_ptr(&mut self, t: NodeId, name: Ident, ptr: Rc<dyn Any>) {
        self.put_attr(t, name, AttrValue::Ptr(ptr));
    }

    pub fn attr_ptr(&self, t: NodeId, name: Ident) -> Option<Rc<dyn Any>> {
        match self.find_attr(t, name, 3) {
            Some(AttrValue::Ptr(p)) => Some(p.clone()),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Object class resolution

    /// Object class of the declaration an expression ultimately names
    pub fn class_of(&self, t: NodeId) -> Class {
        match self.kind(t) {
            Kind::SignalDecl => Class::Signal,
            Kind::VarDecl => Class::Variable,
            Kind::PortDecl => self.class(t),
            Kind::ConstDecl | Kind::EnumLit | Kind::UnitDecl => Class::Constant,
            Kind::Alias => self.class_of(self.value(t)),
            Kind::Ref => self.class_of(self.ref_(t)),
            Kind::ArrayRef | Kind::ArraySlice | Kind::RecordRef => {
                self.class_of(self.value(t))
            }
            _ => Class::Constant,
        }
    }

    // ------------------------------------------------------------------
    // Garbage collection

    /// Mark-and-sweep over the whole arena
    ///
    /// Every top-level unit roots a deep mark; anything unmarked is
    /// swept and its slot recycled. Callers must not hold `NodeId`s to
    /// swept nodes across this call.
    pub fn gc(&mut self) {
        let base_gen = self.next_generation;

        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Some(node) if node.kind.is_top_level() => Some(NodeId(i as u32)),
                _ => None,
            })
            .collect();

        for root in roots {
            let gen = self.fresh_generation();
            self.mark_deep(root, gen);
        }

        let mut freed = 0usize;
        for i in 0..self.nodes.len() {
            let dead = matches!(&self.nodes[i], Some(n) if n.generation < base_gen);
            if dead {
                // Dropping the node releases its type references,
                // sequence storage and string attributes
                self.nodes[i] = None;
                self.free.push(i as u32);
                freed += 1;
            }
        }

        debug!(freed, live = self.live_count(), "tree arena gc");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn new_node_has_cleared_slots() {
        let mut arena = Arena::new();
        let p = arena.alloc(Kind::Process);

        assert_eq!(arena.kind(p), Kind::Process);
        assert!(arena.loc(p).is_invalid());
        assert!(arena.stmts(p).is_empty());
        assert!(arena.triggers(p).is_empty());
        assert!(!arena.has_ident(p));
        assert_eq!(arena.flags(p), Flags::empty());
    }

    #[test]
    fn sequence_slots_append_in_order() {
        let mut arena = Arena::new();
        let p = arena.alloc(Kind::Process);
        let s1 = arena.alloc(Kind::Null);
        let s2 = arena.alloc(Kind::Wait);

        arena.add_stmt(p, s1);
        arena.add_stmt(p, s2);
        assert_eq!(arena.stmts(p), &[s1, s2]);
    }

    #[test]
    #[should_panic(expected = "does not have slot")]
    fn reading_undeclared_slot_panics() {
        let mut arena = Arena::new();
        let w = arena.alloc(Kind::Waveform);
        let _ = arena.stmts(w);
    }

    #[test]
    #[should_panic(expected = "not a statement kind")]
    fn add_stmt_requires_statement() {
        let mut arena = Arena::new();
        let p = arena.alloc(Kind::Process);
        let e = arena.alloc(Kind::Literal);
        arena.add_stmt(p, e);
    }

    #[test]
    #[should_panic(expected = "is not a declaration")]
    fn ref_must_point_at_declaration() {
        let mut arena = Arena::new();
        let r = arena.alloc(Kind::Ref);
        let lit = arena.alloc(Kind::Literal);
        arena.set_ref(r, lit);
    }

    #[test]
    fn ref_accepts_enum_literal_and_top_level() {
        let mut arena = Arena::new();
        let r1 = arena.alloc(Kind::Ref);
        let lit = arena.alloc(Kind::EnumLit);
        arena.set_ref(r1, lit);

        let u = arena.alloc(Kind::Use);
        let lib = arena.alloc(Kind::Package);
        arena.set_ref(u, lib);
    }

    #[test]
    fn positional_params_are_stamped() {
        let mut arena = Arena::new();
        let f = arena.alloc(Kind::Fcall);
        let a = arena.alloc(Kind::Literal);
        let b = arena.alloc(Kind::Literal);

        arena.add_param(f, Param::Pos { pos: 99, value: a });
        arena.add_param(f, Param::Pos { pos: 99, value: b });

        match (arena.params(f)[0], arena.params(f)[1]) {
            (Param::Pos { pos: 0, .. }, Param::Pos { pos: 1, .. }) => {}
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn positional_assocs_count_only_positional() {
        let mut arena = Arena::new();
        let agg = arena.alloc(Kind::Aggregate);
        let v1 = arena.alloc(Kind::Literal);
        let v2 = arena.alloc(Kind::Literal);
        let v3 = arena.alloc(Kind::Literal);

        arena.add_assoc(
            agg,
            Assoc {
                choice: Choice::Pos(0),
                value: Some(v1),
            },
        );
        arena.add_assoc(
            agg,
            Assoc {
                choice: Choice::Others,
                value: Some(v2),
            },
        );
        arena.add_assoc(
            agg,
            Assoc {
                choice: Choice::Pos(0),
                value: Some(v3),
            },
        );

        match arena.assocs(agg)[2].choice {
            Choice::Pos(1) => {}
            other => panic!("unexpected choice {other:?}"),
        }
    }

    #[test]
    fn attributes_find_or_replace() {
        let mut arena = Arena::new();
        let e = arena.alloc(Kind::Entity);
        let name = Ident::new("mangled");

        arena.add_attr_str(e, name, "one");
        arena.add_attr_str(e, name, "two");
        assert_eq!(arena.attr_str(e, name).as_deref(), Some("two"));

        arena.add_attr_int(e, name, 5);
        assert_eq!(arena.attr_int(e, name, 0), 5);
        assert_eq!(arena.attr_int(e, Ident::new("absent"), 7), 7);
    }

    #[test]
    fn gc_frees_unreachable_nodes() {
        let mut arena = Arena::new();

        let arch = arena.alloc(Kind::Arch);
        arena.set_ident(arch, Ident::new("rtl"));
        let p = arena.alloc(Kind::Process);
        arena.add_stmt(arch, p);

        // Unreachable garbage
        for _ in 0..10 {
            arena.alloc(Kind::Literal);
        }

        let before = arena.live_count();
        arena.gc();
        let after = arena.live_count();

        assert_eq!(before - after, 10);
        // Survivors still accessible
        assert_eq!(arena.kind(arch), Kind::Arch);
        assert_eq!(arena.stmts(arch), &[p]);
    }

    #[test]
    fn gc_follows_refs_and_types() {
        let mut arena = Arena::new();

        let pack = arena.alloc(Kind::Package);
        arena.set_ident(pack, Ident::new("pkg"));

        // A constant reachable only through a ref inside an expression
        let c = arena.alloc(Kind::ConstDecl);
        let ty = Type::new(TypeKind::Integer);
        arena.set_type(c, ty);

        let r = arena.alloc(Kind::Ref);
        arena.set_ref(r, c);

        let decl = arena.alloc(Kind::ConstDecl);
        arena.set_value(decl, r);
        arena.add_decl(pack, decl);

        arena.gc();

        assert_eq!(arena.kind(c), Kind::ConstDecl);
        assert!(arena.has_type(c));
    }

    #[test]
    fn gc_recycles_slots() {
        let mut arena = Arena::new();
        for _ in 0..4 {
            arena.alloc(Kind::Literal);
        }
        arena.gc();
        assert_eq!(arena.live_count(), 0);

        let n = arena.alloc(Kind::Entity);
        assert_eq!(arena.live_count(), 1);
        assert_eq!(arena.kind(n), Kind::Entity);
    }
}
