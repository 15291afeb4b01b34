//! Convenience constructors and literal inspection helpers

use larch_base::Ident;

use crate::arena::Arena;
use crate::kind::Kind;
use crate::node::{Assoc, Choice, Literal, NodeId, Range, RangeKind};
use crate::types::{Type, TypeKind};

impl Arena {
    /// Build a reference expression naming `decl`
    pub fn make_ref(&mut self, decl: NodeId) -> NodeId {
        let r = self.alloc(Kind::Ref);
        self.set_loc(r, self.loc(decl));
        if self.has_ident(decl) {
            self.set_ident(r, self.ident(decl));
        }
        self.set_ref(r, decl);
        if crate::kind::slots(self.kind(decl)).contains(crate::kind::SlotMask::TYPE)
            && self.has_type(decl)
        {
            self.set_type(r, self.type_of(decl));
        }
        r
    }

    /// Integer literal borrowing the type and location of `proto`
    pub fn get_int_lit(&mut self, proto: NodeId, value: i64) -> NodeId {
        let lit = self.alloc(Kind::Literal);
        self.set_loc(lit, self.loc(proto));
        self.set_literal(lit, Literal::Int(value));
        if self.has_type(proto) {
            self.set_type(lit, self.type_of(proto));
        }
        lit
    }

    /// Real literal borrowing the type and location of `proto`
    pub fn get_real_lit(&mut self, proto: NodeId, value: f64) -> NodeId {
        let lit = self.alloc(Kind::Literal);
        self.set_loc(lit, self.loc(proto));
        self.set_literal(lit, Literal::Real(value));
        if self.has_type(proto) {
            self.set_type(lit, self.type_of(proto));
        }
        lit
    }

    /// Reference to literal 0 or 1 of the enumeration type of `proto`
    pub fn get_enum_lit(&mut self, proto: NodeId, which: bool) -> NodeId {
        let ty = self.type_of(proto);
        let lits = ty.enum_literals();
        assert!(lits.len() >= 2, "type has too few enumeration literals");
        self.make_ref(lits[which as usize])
    }

    /// The value an object of `ty` takes when not explicitly initialized
    pub fn make_default_value(&mut self, ty: &Type, loc: larch_diag::Loc) -> NodeId {
        let base = ty.base_recur();
        match base.kind() {
            TypeKind::Enum => {
                let lits = base.enum_literals();
                let r = self.make_ref(lits[0]);
                self.set_loc(r, loc);
                r
            }
            TypeKind::Integer | TypeKind::Real | TypeKind::Physical => {
                // Left bound of the first index range
                match ty.range_of(0) {
                    Some(r) => r.left,
                    None => {
                        let lit = self.alloc(Kind::Literal);
                        self.set_loc(lit, loc);
                        self.set_literal(lit, Literal::Int(0));
                        self.set_type(lit, ty.clone());
                        lit
                    }
                }
            }
            TypeKind::Carray | TypeKind::Uarray => {
                let agg = self.alloc(Kind::Aggregate);
                self.set_loc(agg, loc);
                self.set_type(agg, ty.clone());
                if let Some(elem) = ty.elem_type() {
                    let def = self.make_default_value(&elem, loc);
                    self.add_assoc(
                        agg,
                        Assoc {
                            choice: Choice::Others,
                            value: Some(def),
                        },
                    );
                }
                agg
            }
            TypeKind::Record => {
                let agg = self.alloc(Kind::Aggregate);
                self.set_loc(agg, loc);
                self.set_type(agg, ty.clone());
                for field in ty.fields() {
                    let fty = self.type_of(field);
                    let def = self.make_default_value(&fty, loc);
                    self.add_assoc(
                        agg,
                        Assoc {
                            choice: Choice::Pos(0),
                            value: Some(def),
                        },
                    );
                }
                agg
            }
            _ => {
                let lit = self.alloc(Kind::Literal);
                self.set_loc(lit, loc);
                self.set_literal(lit, Literal::Null);
                lit
            }
        }
    }

    /// The integer value of a literal node; panics otherwise
    pub fn assume_int(&self, t: NodeId) -> i64 {
        assert_eq!(self.kind(t), Kind::Literal);
        match self.literal(t) {
            Literal::Int(i) => i,
            Literal::Physical { ival, .. } => ival,
            other => panic!("not an integer literal: {other:?}"),
        }
    }

    /// Low and high bounds of a range over integer literals
    pub fn range_bounds(&self, r: &Range) -> (i64, i64) {
        let left = self.assume_int(r.left);
        let right = self.assume_int(r.right);
        match r.kind {
            RangeKind::To => (left, right),
            _ => (right, left),
        }
    }

    /// Integer value of an already-folded expression
    pub fn folded_int(&self, t: NodeId) -> Option<i64> {
        if self.kind(t) != Kind::Literal {
            return None;
        }
        match self.literal(t) {
            Literal::Int(i) => Some(i),
            Literal::Physical { ival, .. } => Some(ival),
            _ => None,
        }
    }

    /// Real value of an already-folded expression
    pub fn folded_real(&self, t: NodeId) -> Option<f64> {
        match self.kind(t) {
            Kind::Literal => match self.literal(t) {
                Literal::Real(r) => Some(r),
                _ => None,
            },
            _ => None,
        }
    }

    /// Enumeration literal named by an already-folded expression
    pub fn folded_enum(&self, t: NodeId) -> Option<NodeId> {
        if self.kind(t) != Kind::Ref || !self.has_ref(t) {
            return None;
        }
        let decl = self.ref_(t);
        (self.kind(decl) == Kind::EnumLit).then_some(decl)
    }

    /// Boolean value of an already-folded condition
    ///
    /// Truth values are references to the literals of a two-valued
    /// enumeration, position 0 being false.
    pub fn folded_bool(&self, t: NodeId) -> Option<bool> {
        let lit = self.folded_enum(t)?;
        match self.pos(lit) {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    /// Declare an enumeration type with the given literal names
    ///
    /// Returns the type together with its literal declarations; useful
    /// for building test environments and synthesized helpers.
    pub fn declare_enum(&mut self, name: &str, lits: &[&str]) -> (Type, Vec<NodeId>) {
        let ty = Type::new(TypeKind::Enum);
        ty.data_mut().ident = Some(Ident::new(name));

        let mut ids = Vec::with_capacity(lits.len());
        for (i, lit) in lits.iter().enumerate() {
            let l = self.alloc(Kind::EnumLit);
            self.set_ident(l, Ident::new(lit));
            self.set_pos(l, i as u32);
            self.set_type(l, ty.clone());
            ids.push(l);
        }
        ty.data_mut().enum_lits = ids.clone();
        (ty, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_diag::Loc;

    #[test]
    fn make_ref_carries_ident_and_type() {
        let mut arena = Arena::new();
        let ty = Type::new(TypeKind::Integer);

        let c = arena.alloc(Kind::ConstDecl);
        arena.set_ident(c, Ident::new("k"));
        arena.set_type(c, ty.clone());

        let r = arena.make_ref(c);
        assert_eq!(arena.kind(r), Kind::Ref);
        assert_eq!(arena.ident(r), Ident::new("k"));
        assert_eq!(arena.ref_(r), c);
        assert_eq!(arena.type_of(r), ty);
    }

    #[test]
    fn folded_bool_reads_enum_position() {
        let mut arena = Arena::new();
        let (_ty, lits) = arena.declare_enum("boolean", &["false", "true"]);

        let t = arena.make_ref(lits[1]);
        let f = arena.make_ref(lits[0]);

        assert_eq!(arena.folded_bool(t), Some(true));
        assert_eq!(arena.folded_bool(f), Some(false));

        let lit = arena.alloc(Kind::Literal);
        arena.set_literal(lit, Literal::Int(1));
        assert_eq!(arena.folded_bool(lit), None);
    }

    #[test]
    fn default_value_of_enum_is_first_literal() {
        let mut arena = Arena::new();
        let (ty, lits) = arena.declare_enum("bit", &["'0'", "'1'"]);

        let def = arena.make_default_value(&ty, Loc::INVALID);
        assert_eq!(arena.ref_(def), lits[0]);
    }

    #[test]
    fn default_value_of_integer_is_left_bound() {
        let mut arena = Arena::new();

        let ty = Type::new(TypeKind::Integer);
        let low = arena.alloc(Kind::Literal);
        arena.set_literal(low, Literal::Int(-5));
        let high = arena.alloc(Kind::Literal);
        arena.set_literal(high, Literal::Int(5));
        ty.data_mut().dims = vec![Range::to(low, high)];

        let def = arena.make_default_value(&ty, Loc::INVALID);
        assert_eq!(def, low);
    }

    #[test]
    fn range_bounds_swap_for_downto() {
        let mut arena = Arena::new();
        let a = arena.alloc(Kind::Literal);
        arena.set_literal(a, Literal::Int(7));
        let b = arena.alloc(Kind::Literal);
        arena.set_literal(b, Literal::Int(0));

        assert_eq!(arena.range_bounds(&Range::to(b, a)), (0, 7));
        assert_eq!(arena.range_bounds(&Range::downto(a, b)), (0, 7));
    }
}
