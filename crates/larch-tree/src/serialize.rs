//! Tree serialization
//!
//! Nodes are written depth-first with a per-context back-reference
//! table: the first visit of a node emits its kind and slots in a fixed
//! canonical order, later visits emit `0xFFFE` plus the node's assigned
//! index, and a missing node emits `0xFFFF`. Types carry their own
//! back-reference space. Locations are interleaved through the location
//! stream of §the diag crate, which prepends the file-name index on
//! first use.
//!
//! The format is stable only within a single build: kind ordinals and
//! slot order are the compatibility boundary.

use std::collections::HashMap;
use std::io::{Read, Write};

use larch_base::fbuf::{FbufReader, FbufWriter, Result};
use larch_base::Ident;
use larch_diag::{LocReader, LocWriter, SourceMap};

use crate::arena::Arena;
use crate::kind::{slots, Kind, SlotMask};
use crate::node::{
    Assoc, Attr, AttrKind, AttrValue, BuiltinOp, Choice, Class, Flags, Literal, NodeId, Param,
    PortMode, Range, RangeKind, SubprogKind,
};
use crate::types::{Type, TypeKind};

const NULL_MARKER: u16 = 0xffff;
const BACKREF_MARKER: u16 = 0xfffe;

fn range_kind_tag(k: RangeKind) -> u8 {
    match k {
        RangeKind::To => 0,
        RangeKind::Downto => 1,
        RangeKind::Expr => 2,
    }
}

fn range_kind_from(tag: u8) -> RangeKind {
    match tag {
        0 => RangeKind::To,
        1 => RangeKind::Downto,
        2 => RangeKind::Expr,
        _ => panic!("corrupt range kind {tag}"),
    }
}

fn type_kind_tag(k: TypeKind) -> u8 {
    match k {
        TypeKind::Unresolved => 0,
        TypeKind::Subtype => 1,
        TypeKind::Integer => 2,
        TypeKind::Real => 3,
        TypeKind::Enum => 4,
        TypeKind::Physical => 5,
        TypeKind::Carray => 6,
        TypeKind::Uarray => 7,
        TypeKind::Record => 8,
        TypeKind::Func => 9,
    }
}

fn type_kind_from(tag: u8) -> TypeKind {
    match tag {
        0 => TypeKind::Unresolved,
        1 => TypeKind::Subtype,
        2 => TypeKind::Integer,
        3 => TypeKind::Real,
        4 => TypeKind::Enum,
        5 => TypeKind::Physical,
        6 => TypeKind::Carray,
        7 => TypeKind::Uarray,
        8 => TypeKind::Record,
        9 => TypeKind::Func,
        _ => panic!("corrupt type kind {tag}"),
    }
}

fn builtin_tag(op: BuiltinOp) -> u8 {
    use BuiltinOp::*;
    match op {
        Add => 0,
        Sub => 1,
        Mul => 2,
        Div => 3,
        Mod => 4,
        Rem => 5,
        Neg => 6,
        Abs => 7,
        Eq => 8,
        Neq => 9,
        Lt => 10,
        Le => 11,
        Gt => 12,
        Ge => 13,
        And => 14,
        Or => 15,
        Nand => 16,
        Nor => 17,
        Xor => 18,
        Xnor => 19,
        Not => 20,
    }
}

fn builtin_from(tag: u8) -> BuiltinOp {
    use BuiltinOp::*;
    match tag {
        0 => Add,
        1 => Sub,
        2 => Mul,
        3 => Div,
        4 => Mod,
        5 => Rem,
        6 => Neg,
        7 => Abs,
        8 => Eq,
        9 => Neq,
        10 => Lt,
        11 => Le,
        12 => Gt,
        13 => Ge,
        14 => And,
        15 => Or,
        16 => Nand,
        17 => Nor,
        18 => Xor,
        19 => Xnor,
        20 => Not,
        _ => panic!("corrupt builtin operation {tag}"),
    }
}

fn attr_kind_tag(a: AttrKind) -> u8 {
    use AttrKind::*;
    match a {
        Left => 0,
        Right => 1,
        Low => 2,
        High => 3,
        Length => 4,
        Ascending => 5,
        Pos => 6,
        Val => 7,
        Event => 8,
        Active => 9,
        Delayed => 10,
        Transaction => 11,
        Base => 12,
        Range => 13,
        ReverseRange => 14,
    }
}

fn attr_kind_from(tag: u8) -> AttrKind {
    use AttrKind::*;
    match tag {
        0 => Left,
        1 => Right,
        2 => Low,
        3 => High,
        4 => Length,
        5 => Ascending,
        6 => Pos,
        7 => Val,
        8 => Event,
        9 => Active,
        10 => Delayed,
        11 => Transaction,
        12 => Base,
        13 => Range,
        14 => ReverseRange,
        _ => panic!("corrupt attribute kind {tag}"),
    }
}

/// Serialization context for one output document
pub struct TreeWriter {
    indices: HashMap<NodeId, u32>,
    n_nodes: u32,
    types: HashMap<usize, u32>,
    n_types: u32,
    loc: LocWriter,
}

impl TreeWriter {
    /// Begin a document; takes a fresh generation so no other traversal
    /// may be in flight
    pub fn new(arena: &mut Arena) -> TreeWriter {
        let _ = arena.fresh_generation();
        TreeWriter {
            indices: HashMap::new(),
            n_nodes: 0,
            types: HashMap::new(),
            n_types: 0,
            loc: LocWriter::new(),
        }
    }

    /// Write the graph rooted at `t`
    pub fn write<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        t: Option<NodeId>,
    ) -> Result<()> {
        let t = match t {
            None => {
                fb.write_u16(NULL_MARKER)?;
                return Ok(());
            }
            Some(t) => t,
        };

        if let Some(&index) = self.indices.get(&t) {
            fb.write_u16(BACKREF_MARKER)?;
            fb.put_uint(index as u64)?;
            return Ok(());
        }

        let index = self.n_nodes;
        self.n_nodes += 1;
        self.indices.insert(t, index);

        let kind = arena.kind(t);
        let mask = slots(kind);

        fb.write_u16(kind.ordinal())?;
        self.loc.write(&arena.loc(t), smap, fb)?;
        fb.write_u32(arena.flags(t).bits())?;

        if mask.contains(SlotMask::IDENT) {
            self.write_opt_ident(fb, arena.node(t).ident)?;
        }
        if mask.contains(SlotMask::IDENT2) {
            self.write_opt_ident(fb, arena.node(t).ident2)?;
        }

        if mask.contains(SlotMask::PORTS) {
            self.write_seq(arena, smap, fb, &arena.node(t).ports.clone())?;
        }
        if mask.contains(SlotMask::GENERICS) {
            self.write_seq(arena, smap, fb, &arena.node(t).generics.clone())?;
        }
        if mask.contains(SlotMask::DECLS) {
            self.write_seq(arena, smap, fb, &arena.node(t).decls.clone())?;
        }
        if mask.contains(SlotMask::TRIGGERS) {
            self.write_seq(arena, smap, fb, &arena.node(t).triggers.clone())?;
        }
        if mask.contains(SlotMask::STMTS) {
            self.write_seq(arena, smap, fb, &arena.node(t).stmts.clone())?;
        }
        if mask.contains(SlotMask::WAVEFORMS) {
            self.write_seq(arena, smap, fb, &arena.node(t).waveforms.clone())?;
        }
        if mask.contains(SlotMask::DRIVERS) {
            self.write_seq(arena, smap, fb, &arena.node(t).drivers.clone())?;
        }

        if mask.contains(SlotMask::TYPE) {
            let ty = arena.node(t).ty.clone();
            self.write_type(arena, smap, fb, ty.as_ref())?;
        }

        if mask.contains(SlotMask::VALUE) {
            self.write(arena, smap, fb, arena.node(t).value)?;
        }
        if mask.contains(SlotMask::DELAY) {
            self.write(arena, smap, fb, arena.node(t).delay)?;
        }
        if mask.contains(SlotMask::TARGET) {
            self.write(arena, smap, fb, arena.node(t).target)?;
        }
        if mask.contains(SlotMask::REF) {
            self.write(arena, smap, fb, arena.node(t).ref_)?;
        }
        if mask.contains(SlotMask::NAME) {
            self.write(arena, smap, fb, arena.node(t).name)?;
        }
        if mask.contains(SlotMask::SPEC) {
            self.write(arena, smap, fb, arena.node(t).spec)?;
        }
        if mask.contains(SlotMask::REJECT) {
            self.write(arena, smap, fb, arena.node(t).reject)?;
        }
        if mask.contains(SlotMask::GUARD) {
            self.write(arena, smap, fb, arena.node(t).guard)?;
        }
        if mask.contains(SlotMask::MESSAGE) {
            self.write(arena, smap, fb, arena.node(t).message)?;
        }
        if mask.contains(SlotMask::SEVERITY) {
            self.write(arena, smap, fb, arena.node(t).severity)?;
        }

        if mask.contains(SlotMask::CONTEXTS) {
            self.write_seq(arena, smap, fb, &arena.node(t).contexts.clone())?;
        }

        if mask.contains(SlotMask::PARAMS) {
            self.write_params(arena, smap, fb, &arena.node(t).params.clone())?;
        }
        if mask.contains(SlotMask::GENMAPS) {
            self.write_params(arena, smap, fb, &arena.node(t).genmaps.clone())?;
        }
        if mask.contains(SlotMask::ASSOCS) {
            self.write_assocs(arena, smap, fb, &arena.node(t).assocs.clone())?;
        }

        if mask.contains(SlotMask::RANGE) {
            match arena.node(t).range {
                Some(r) => {
                    fb.write_u8(1)?;
                    self.write_range(arena, smap, fb, &r)?;
                }
                None => fb.write_u8(0)?,
            }
        }

        if mask.contains(SlotMask::LITERAL) {
            let lit = arena.node(t).literal.clone().expect("literal not set");
            self.write_literal(fb, &lit)?;
        }

        // Kind-specific extras
        match kind {
            Kind::PortDecl => {
                let node = arena.node(t);
                match node.port_mode {
                    Some(m) => fb.write_u8(match m {
                        PortMode::In => 0,
                        PortMode::Out => 1,
                        PortMode::InOut => 2,
                        PortMode::Buffer => 3,
                    })?,
                    None => fb.write_u8(0xff)?,
                }
                match node.class {
                    Some(c) => fb.write_u8(match c {
                        Class::Constant => 0,
                        Class::Signal => 1,
                        Class::Variable => 2,
                    })?,
                    None => fb.write_u8(0xff)?,
                }
            }
            Kind::EnumLit => fb.put_uint(arena.node(t).pos as u64)?,
            Kind::AttrRef => match arena.node(t).attr_kind {
                Some(a) => fb.write_u8(attr_kind_tag(a))?,
                None => fb.write_u8(0xff)?,
            },
            k if k.is_subprogram() => match arena.node(t).subprog {
                Some(SubprogKind::User) => fb.write_u8(0)?,
                Some(SubprogKind::Foreign) => fb.write_u8(1)?,
                Some(SubprogKind::Builtin(op)) => {
                    fb.write_u8(2)?;
                    fb.write_u8(builtin_tag(op))?;
                }
                None => fb.write_u8(0xff)?,
            },
            _ => {}
        }

        let attrs = arena.node(t).attrs.clone();
        fb.put_uint(attrs.len() as u64)?;
        for attr in &attrs {
            fb.write_u8(attr.value.tag())?;
            fb.put_str(attr.name.as_str())?;
            match &attr.value {
                AttrValue::Str(s) => fb.put_str(s)?,
                AttrValue::Int(n) => fb.write_i64(*n)?,
                AttrValue::Tree(n) => self.write(arena, smap, fb, Some(*n))?,
                AttrValue::Ptr(_) => panic!("pointer attributes cannot be saved"),
            }
        }

        Ok(())
    }

    fn write_opt_ident<W: Write>(
        &mut self,
        fb: &mut FbufWriter<W>,
        ident: Option<Ident>,
    ) -> Result<()> {
        match ident {
            Some(i) => {
                fb.write_u8(1)?;
                fb.put_str(i.as_str())
            }
            None => fb.write_u8(0),
        }
    }

    fn write_seq<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        items: &[NodeId],
    ) -> Result<()> {
        fb.put_uint(items.len() as u64)?;
        for &item in items {
            self.write(arena, smap, fb, Some(item))?;
        }
        Ok(())
    }

    fn write_range<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        r: &Range,
    ) -> Result<()> {
        fb.write_u8(range_kind_tag(r.kind))?;
        self.write(arena, smap, fb, Some(r.left))?;
        self.write(arena, smap, fb, Some(r.right))
    }

    fn write_params<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        params: &[Param],
    ) -> Result<()> {
        fb.put_uint(params.len() as u64)?;
        for p in params {
            match p {
                Param::Pos { pos, value } => {
                    fb.write_u8(0)?;
                    fb.put_uint(*pos as u64)?;
                    self.write(arena, smap, fb, Some(*value))?;
                }
                Param::Named { name, value } => {
                    fb.write_u8(1)?;
                    fb.put_str(name.as_str())?;
                    self.write(arena, smap, fb, Some(*value))?;
                }
                Param::Range(r) => {
                    fb.write_u8(2)?;
                    self.write_range(arena, smap, fb, r)?;
                }
            }
        }
        Ok(())
    }

    fn write_assocs<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        assocs: &[Assoc],
    ) -> Result<()> {
        fb.put_uint(assocs.len() as u64)?;
        for a in assocs {
            match &a.choice {
                Choice::Pos(pos) => {
                    fb.write_u8(0)?;
                    fb.put_uint(*pos as u64)?;
                }
                Choice::Named(name) => {
                    fb.write_u8(1)?;
                    self.write(arena, smap, fb, Some(*name))?;
                }
                Choice::Range(r) => {
                    fb.write_u8(2)?;
                    self.write_range(arena, smap, fb, r)?;
                }
                Choice::Others => fb.write_u8(3)?,
            }
            self.write(arena, smap, fb, a.value)?;
        }
        Ok(())
    }

    fn write_literal<W: Write>(&mut self, fb: &mut FbufWriter<W>, lit: &Literal) -> Result<()> {
        match lit {
            Literal::Int(i) => {
                fb.write_u8(0)?;
                fb.write_i64(*i)
            }
            Literal::Real(r) => {
                fb.write_u8(1)?;
                fb.write_f64(*r)
            }
            Literal::Null => fb.write_u8(2),
            Literal::Str(s) => {
                fb.write_u8(3)?;
                fb.put_str(s)
            }
            Literal::Physical { ival, dval } => {
                fb.write_u8(4)?;
                fb.write_i64(*ival)?;
                fb.write_f64(*dval)
            }
        }
    }

    fn write_type<W: Write>(
        &mut self,
        arena: &Arena,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
        ty: Option<&Type>,
    ) -> Result<()> {
        let ty = match ty {
            None => {
                fb.write_u16(NULL_MARKER)?;
                return Ok(());
            }
            Some(ty) => ty,
        };

        if let Some(&index) = self.types.get(&ty.addr()) {
            fb.write_u16(BACKREF_MARKER)?;
            fb.put_uint(index as u64)?;
            return Ok(());
        }

        let index = self.n_types;
        self.n_types += 1;
        self.types.insert(ty.addr(), index);

        let kind = ty.data().kind.expect("serializing unpopulated type");
        fb.write_u16(type_kind_tag(kind) as u16)?;
        self.write_opt_ident(fb, ty.ident())?;

        let (dims, base, elem, enum_lits, index_constrs, units, fields, resolution, result) = {
            let data = ty.data();
            (
                data.dims.clone(),
                data.base.clone(),
                data.elem.clone(),
                data.enum_lits.clone(),
                data.index_constrs.clone(),
                data.units.clone(),
                data.fields.clone(),
                data.resolution,
                data.result.clone(),
            )
        };

        fb.put_uint(dims.len() as u64)?;
        for r in &dims {
            self.write_range(arena, smap, fb, r)?;
        }

        self.write_type(arena, smap, fb, base.as_ref())?;
        self.write_type(arena, smap, fb, elem.as_ref())?;
        self.write_seq(arena, smap, fb, &enum_lits)?;

        fb.put_uint(index_constrs.len() as u64)?;
        for ic in &index_constrs {
            self.write_type(arena, smap, fb, Some(ic))?;
        }

        self.write_seq(arena, smap, fb, &units)?;
        self.write_seq(arena, smap, fb, &fields)?;
        self.write(arena, smap, fb, resolution)?;
        self.write_type(arena, smap, fb, result.as_ref())
    }
}

/// Deserialization context for one input document
#[derive(Default)]
pub struct TreeReader {
    store: Vec<NodeId>,
    type_store: Vec<Type>,
    loc: LocReader,
}

impl TreeReader {
    pub fn new() -> TreeReader {
        TreeReader {
            store: Vec::new(),
            type_store: Vec::new(),
            loc: LocReader::new(),
        }
    }

    /// A previously-read node by document index
    pub fn recall(&self, index: u32) -> NodeId {
        self.store[index as usize]
    }

    /// Read one graph, mirroring [`TreeWriter::write`]
    pub fn read<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Option<NodeId>> {
        let marker = fb.read_u16()?;
        if marker == NULL_MARKER {
            return Ok(None);
        }
        if marker == BACKREF_MARKER {
            let index = fb.get_uint()? as usize;
            assert!(index < self.store.len(), "corrupt tree back-reference");
            return Ok(Some(self.store[index]));
        }

        let kind = Kind::from_ordinal(marker)
            .unwrap_or_else(|| panic!("corrupt tree kind {marker} in {}", fb.file_name()));

        let t = arena.alloc(kind);
        // Register before descending so children can refer back up
        self.store.push(t);

        let loc = self.loc.read(smap, fb)?;
        arena.set_loc(t, loc);
        let flags = Flags::from_bits_truncate(fb.read_u32()?);
        arena.node_mut(t).flags = flags;

        let mask = slots(kind);

        if mask.contains(SlotMask::IDENT) {
            arena.node_mut(t).ident = self.read_opt_ident(fb)?;
        }
        if mask.contains(SlotMask::IDENT2) {
            arena.node_mut(t).ident2 = self.read_opt_ident(fb)?;
        }

        if mask.contains(SlotMask::PORTS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).ports = v;
        }
        if mask.contains(SlotMask::GENERICS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).generics = v;
        }
        if mask.contains(SlotMask::DECLS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).decls = v;
        }
        if mask.contains(SlotMask::TRIGGERS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).triggers = v;
        }
        if mask.contains(SlotMask::STMTS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).stmts = v;
        }
        if mask.contains(SlotMask::WAVEFORMS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).waveforms = v;
        }
        if mask.contains(SlotMask::DRIVERS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).drivers = v;
        }

        if mask.contains(SlotMask::TYPE) {
            let ty = self.read_type(arena, smap, fb)?;
            arena.node_mut(t).ty = ty;
        }

        if mask.contains(SlotMask::VALUE) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).value = v;
        }
        if mask.contains(SlotMask::DELAY) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).delay = v;
        }
        if mask.contains(SlotMask::TARGET) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).target = v;
        }
        if mask.contains(SlotMask::REF) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).ref_ = v;
        }
        if mask.contains(SlotMask::NAME) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).name = v;
        }
        if mask.contains(SlotMask::SPEC) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).spec = v;
        }
        if mask.contains(SlotMask::REJECT) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).reject = v;
        }
        if mask.contains(SlotMask::GUARD) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).guard = v;
        }
        if mask.contains(SlotMask::MESSAGE) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).message = v;
        }
        if mask.contains(SlotMask::SEVERITY) {
            let v = self.read(arena, smap, fb)?;
            arena.node_mut(t).severity = v;
        }

        if mask.contains(SlotMask::CONTEXTS) {
            let v = self.read_seq(arena, smap, fb)?;
            arena.node_mut(t).contexts = v;
        }

        if mask.contains(SlotMask::PARAMS) {
            let v = self.read_params(arena, smap, fb)?;
            arena.node_mut(t).params = v;
        }
        if mask.contains(SlotMask::GENMAPS) {
            let v = self.read_params(arena, smap, fb)?;
            arena.node_mut(t).genmaps = v;
        }
        if mask.contains(SlotMask::ASSOCS) {
            let v = self.read_assocs(arena, smap, fb)?;
            arena.node_mut(t).assocs = v;
        }

        if mask.contains(SlotMask::RANGE) {
            if fb.read_u8()? != 0 {
                let r = self.read_range(arena, smap, fb)?;
                arena.node_mut(t).range = Some(r);
            }
        }

        if mask.contains(SlotMask::LITERAL) {
            let lit = self.read_literal(fb)?;
            arena.node_mut(t).literal = Some(lit);
        }

        match kind {
            Kind::PortDecl => {
                let mode = fb.read_u8()?;
                arena.node_mut(t).port_mode = match mode {
                    0 => Some(PortMode::In),
                    1 => Some(PortMode::Out),
                    2 => Some(PortMode::InOut),
                    3 => Some(PortMode::Buffer),
                    0xff => None,
                    other => panic!("corrupt port mode {other}"),
                };
                let class = fb.read_u8()?;
                arena.node_mut(t).class = match class {
                    0 => Some(Class::Constant),
                    1 => Some(Class::Signal),
                    2 => Some(Class::Variable),
                    0xff => None,
                    other => panic!("corrupt object class {other}"),
                };
            }
            Kind::EnumLit => {
                arena.node_mut(t).pos = fb.get_uint()? as u32;
            }
            Kind::AttrRef => {
                let tag = fb.read_u8()?;
                arena.node_mut(t).attr_kind = (tag != 0xff).then(|| attr_kind_from(tag));
            }
            k if k.is_subprogram() => {
                let tag = fb.read_u8()?;
                arena.node_mut(t).subprog = match tag {
                    0 => Some(SubprogKind::User),
                    1 => Some(SubprogKind::Foreign),
                    2 => Some(SubprogKind::Builtin(builtin_from(fb.read_u8()?))),
                    0xff => None,
                    other => panic!("corrupt subprogram kind {other}"),
                };
            }
            _ => {}
        }

        let n_attrs = fb.get_uint()? as usize;
        assert!(n_attrs <= crate::node::MAX_ATTRS, "too many attributes");
        for _ in 0..n_attrs {
            let tag = fb.read_u8()?;
            let name = Ident::new(&fb.get_str()?);
            let value = match tag {
                0 => AttrValue::Str(fb.get_str()?),
                1 => AttrValue::Int(fb.read_i64()?),
                2 => {
                    let node = self
                        .read(arena, smap, fb)?
                        .expect("missing attribute tree");
                    AttrValue::Tree(node)
                }
                other => panic!("corrupt attribute tag {other}"),
            };
            arena.node_mut(t).attrs.push(Attr { name, value });
        }

        Ok(Some(t))
    }

    fn read_opt_ident<R: Read>(&mut self, fb: &mut FbufReader<R>) -> Result<Option<Ident>> {
        if fb.read_u8()? != 0 {
            Ok(Some(Ident::new(&fb.get_str()?)))
        } else {
            Ok(None)
        }
    }

    fn read_seq<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Vec<NodeId>> {
        let count = fb.get_uint()? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.read(arena, smap, fb)?.expect("missing sequence item"));
        }
        Ok(items)
    }

    fn read_range<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Range> {
        let kind = range_kind_from(fb.read_u8()?);
        let left = self.read(arena, smap, fb)?.expect("missing range bound");
        let right = self.read(arena, smap, fb)?.expect("missing range bound");
        Ok(Range { kind, left, right })
    }

    fn read_params<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Vec<Param>> {
        let count = fb.get_uint()? as usize;
        let mut params = Vec::with_capacity(count);
        for _ in 0..count {
            let param = match fb.read_u8()? {
                0 => {
                    let pos = fb.get_uint()? as u32;
                    let value = self.read(arena, smap, fb)?.expect("missing param value");
                    Param::Pos { pos, value }
                }
                1 => {
                    let name = Ident::new(&fb.get_str()?);
                    let value = self.read(arena, smap, fb)?.expect("missing param value");
                    Param::Named { name, value }
                }
                2 => Param::Range(self.read_range(arena, smap, fb)?),
                other => panic!("corrupt parameter kind {other}"),
            };
            params.push(param);
        }
        Ok(params)
    }

    fn read_assocs<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Vec<Assoc>> {
        let count = fb.get_uint()? as usize;
        let mut assocs = Vec::with_capacity(count);
        for _ in 0..count {
            let choice = match fb.read_u8()? {
                0 => Choice::Pos(fb.get_uint()? as u32),
                1 => Choice::Named(self.read(arena, smap, fb)?.expect("missing assoc name")),
                2 => Choice::Range(self.read_range(arena, smap, fb)?),
                3 => Choice::Others,
                other => panic!("corrupt association kind {other}"),
            };
            let value = self.read(arena, smap, fb)?;
            assocs.push(Assoc { choice, value });
        }
        Ok(assocs)
    }

    fn read_literal<R: Read>(&mut self, fb: &mut FbufReader<R>) -> Result<Literal> {
        let lit = match fb.read_u8()? {
            0 => Literal::Int(fb.read_i64()?),
            1 => Literal::Real(fb.read_f64()?),
            2 => Literal::Null,
            3 => Literal::Str(fb.get_str()?),
            4 => Literal::Physical {
                ival: fb.read_i64()?,
                dval: fb.read_f64()?,
            },
            other => panic!("corrupt literal kind {other}"),
        };
        Ok(lit)
    }

    fn read_type<R: Read>(
        &mut self,
        arena: &mut Arena,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Option<Type>> {
        let marker = fb.read_u16()?;
        if marker == NULL_MARKER {
            return Ok(None);
        }
        if marker == BACKREF_MARKER {
            let index = fb.get_uint()? as usize;
            assert!(index < self.type_store.len(), "corrupt type back-reference");
            return Ok(Some(self.type_store[index].clone()));
        }

        let kind = type_kind_from(marker as u8);

        // Register before descending, as with nodes
        let ty = Type::empty();
        self.type_store.push(ty.clone());

        let ident = self.read_opt_ident(fb)?;

        let n_dims = fb.get_uint()? as usize;
        let mut dims = Vec::with_capacity(n_dims);
        for _ in 0..n_dims {
            dims.push(self.read_range(arena, smap, fb)?);
        }

        let base = self.read_type(arena, smap, fb)?;
        let elem = self.read_type(arena, smap, fb)?;
        let enum_lits = self.read_seq(arena, smap, fb)?;

        let n_constrs = fb.get_uint()? as usize;
        let mut index_constrs = Vec::with_capacity(n_constrs);
        for _ in 0..n_constrs {
            index_constrs.push(
                self.read_type(arena, smap, fb)?
                    .expect("missing index constraint"),
            );
        }

        let units = self.read_seq(arena, smap, fb)?;
        let fields = self.read_seq(arena, smap, fb)?;
        let resolution = self.read(arena, smap, fb)?;
        let result = self.read_type(arena, smap, fb)?;

        {
            let mut data = ty.data_mut();
            data.kind = Some(kind);
            data.ident = ident;
            data.dims = dims;
            data.base = base;
            data.elem = elem;
            data.enum_lits = enum_lits;
            data.index_constrs = index_constrs;
            data.units = units;
            data.fields = fields;
            data.resolution = resolution;
            data.result = result;
        }

        Ok(Some(ty))
    }
}
