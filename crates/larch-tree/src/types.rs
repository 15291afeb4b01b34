//! Externally-managed type records attached to tree nodes
//!
//! Types are shared, reference-counted records. Node ownership of a type
//! is a counted reference: dropping the last node (or the arena slot)
//! holding a type releases it. Bounds, enumeration literals, physical
//! units and record fields inside a type are ordinary tree nodes.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use larch_base::Ident;

use crate::node::{NodeId, Range};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeKind {
    Unresolved,
    Subtype,
    Integer,
    Real,
    Enum,
    Physical,
    /// Constrained array
    Carray,
    /// Unconstrained array
    Uarray,
    Record,
    Func,
}

/// Contents of a type record
#[derive(Default)]
pub struct TypeData {
    pub kind: Option<TypeKind>,
    pub ident: Option<Ident>,
    /// Index ranges of integer/physical/constrained-array types
    pub dims: Vec<Range>,
    /// Base of a subtype or element type of an array
    pub base: Option<Type>,
    pub elem: Option<Type>,
    /// Enumeration literals in declaration order
    pub enum_lits: Vec<NodeId>,
    /// Index types of an unconstrained array
    pub index_constrs: Vec<Type>,
    /// Unit declarations of a physical type, base unit first
    pub units: Vec<NodeId>,
    /// Field declarations of a record type
    pub fields: Vec<NodeId>,
    /// Resolution function of a subtype
    pub resolution: Option<NodeId>,
    /// Result type of a function type
    pub result: Option<Type>,
}

/// A shared, reference-counted type
///
/// Equality is identity: two `Type`s are equal when they are the same
/// record.
#[derive(Clone)]
pub struct Type(Rc<RefCell<TypeData>>);

impl Type {
    pub fn new(kind: TypeKind) -> Type {
        Type(Rc::new(RefCell::new(TypeData {
            kind: Some(kind),
            ..TypeData::default()
        })))
    }

    pub(crate) fn empty() -> Type {
        Type(Rc::new(RefCell::new(TypeData::default())))
    }

    pub fn kind(&self) -> TypeKind {
        self.0.borrow().kind.expect("type record not yet populated")
    }

    pub fn data(&self) -> Ref<'_, TypeData> {
        self.0.borrow()
    }

    pub fn data_mut(&self) -> RefMut<'_, TypeData> {
        self.0.borrow_mut()
    }

    /// Stable address used for identity during serialization
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ident(&self) -> Option<Ident> {
        self.0.borrow().ident
    }

    /// Strip subtypes down to the base type
    pub fn base_recur(&self) -> Type {
        let mut ty = self.clone();
        loop {
            let base = match ty.kind() {
                TypeKind::Subtype => ty.data().base.clone(),
                _ => None,
            };
            match base {
                Some(b) => ty = b,
                None => return ty,
            }
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.base_recur().kind(),
            TypeKind::Integer | TypeKind::Real | TypeKind::Enum | TypeKind::Physical
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self.base_recur().kind(), TypeKind::Carray | TypeKind::Uarray)
    }

    /// An array type with no index constraint anywhere in its subtype chain
    pub fn is_unconstrained(&self) -> bool {
        match self.kind() {
            TypeKind::Uarray => true,
            TypeKind::Subtype => {
                if self.data().dims.is_empty() {
                    self.data().base.as_ref().is_some_and(Type::is_unconstrained)
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Number of dimensions carrying an explicit range
    pub fn dimension_of(&self) -> usize {
        let n = self.data().dims.len();
        if n == 0 && self.kind() == TypeKind::Subtype {
            self.data().base.as_ref().map_or(0, Type::dimension_of)
        } else {
            n
        }
    }

    /// Range of dimension `n`, searching through subtypes
    pub fn range_of(&self, n: usize) -> Option<Range> {
        let data = self.data();
        if let Some(r) = data.dims.get(n) {
            return Some(*r);
        }
        if self.kind() == TypeKind::Subtype {
            return data.base.as_ref().and_then(|b| b.range_of(n));
        }
        None
    }

    /// Index type of dimension `n` of an unconstrained array
    pub fn index_constr(&self, n: usize) -> Option<Type> {
        let base = self.base_recur();
        let data = base.data();
        data.index_constrs.get(n).cloned()
    }

    /// Enumeration literals of this type or its base
    pub fn enum_literals(&self) -> Vec<NodeId> {
        self.base_recur().data().enum_lits.clone()
    }

    /// Element type of an array
    pub fn elem_type(&self) -> Option<Type> {
        self.base_recur().data().elem.clone()
    }

    /// Record field declarations
    pub fn fields(&self) -> Vec<NodeId> {
        self.base_recur().data().fields.clone()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        write!(f, "Type({:?}", data.kind)?;
        if let Some(ident) = data.ident {
            write!(f, " {ident}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_identity() {
        let a = Type::new(TypeKind::Integer);
        let b = Type::new(TypeKind::Integer);
        let c = a.clone();

        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn subtype_chains_resolve_to_base() {
        let base = Type::new(TypeKind::Integer);
        base.data_mut().ident = Some(Ident::new("integer"));

        let sub = Type::new(TypeKind::Subtype);
        sub.data_mut().base = Some(base.clone());

        assert_eq!(sub.base_recur(), base);
        assert!(sub.is_scalar());
        assert!(!sub.is_array());
    }

    #[test]
    fn unconstrained_detection() {
        let uarray = Type::new(TypeKind::Uarray);
        assert!(uarray.is_unconstrained());

        let sub = Type::new(TypeKind::Subtype);
        sub.data_mut().base = Some(uarray.clone());
        assert!(sub.is_unconstrained());

        let carray = Type::new(TypeKind::Carray);
        assert!(!carray.is_unconstrained());
    }
}
