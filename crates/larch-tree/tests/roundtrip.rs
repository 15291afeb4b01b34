//! Serialization round-trip tests over realistic design units

use std::io::Cursor;

use larch_base::fbuf::{FbufReader, FbufWriter};
use larch_base::Ident;
use larch_diag::{Loc, SourceMap};
use larch_tree::{
    structural_eq, Arena, Assoc, Choice, Flags, Kind, Literal, NodeId, Param, PortMode, Range,
    TreeReader, TreeWriter, Type, TypeKind,
};

/// An architecture with a constant, a process and a shared expression
fn build_arch(arena: &mut Arena, smap: &mut SourceMap) -> NodeId {
    let file = smap.intern("counter.vhd");
    let int_ty = Type::new(TypeKind::Integer);
    int_ty.data_mut().ident = Some(Ident::new("integer"));

    let arch = arena.alloc(Kind::Arch);
    arena.set_ident(arch, Ident::new("rtl"));
    arena.set_ident2(arch, Ident::new("counter"));
    arena.set_loc(arch, Loc::new(1, 0, 30, 10, file));

    let width = arena.alloc(Kind::ConstDecl);
    arena.set_ident(width, Ident::new("width"));
    arena.set_type(width, int_ty.clone());
    let lit = arena.alloc(Kind::Literal);
    arena.set_literal(lit, Literal::Int(8));
    arena.set_type(lit, int_ty.clone());
    arena.set_flag(lit, Flags::LOCALLY_STATIC);
    arena.set_value(width, lit);
    arena.add_decl(arch, width);

    let sig = arena.alloc(Kind::SignalDecl);
    arena.set_ident(sig, Ident::new("count"));
    arena.set_type(sig, int_ty.clone());
    arena.add_decl(arch, sig);

    let proc = arena.alloc(Kind::Process);
    arena.set_ident(proc, Ident::new("tick"));
    arena.set_loc(proc, Loc::new(10, 2, 20, 12, file));

    // count <= width + width  -- the two operands share one ref node
    let wref = arena.make_ref(width);
    let add = arena.alloc(Kind::Fcall);
    arena.set_ident(add, Ident::new("\"+\""));
    arena.set_type(add, int_ty);
    arena.add_param(add, Param::Pos { pos: 0, value: wref });
    arena.add_param(add, Param::Pos { pos: 0, value: wref });

    let wave = arena.alloc(Kind::Waveform);
    arena.set_value(wave, add);

    let asgn = arena.alloc(Kind::SignalAssign);
    arena.set_ident(asgn, Ident::new("a0"));
    let target = arena.make_ref(sig);
    arena.set_target(asgn, target);
    arena.add_waveform(asgn, wave);
    arena.add_stmt(proc, asgn);

    let wait = arena.alloc(Kind::Wait);
    arena.set_ident(wait, Ident::new("w0"));
    arena.set_flag(wait, Flags::STATIC_WAIT);
    let trigger = arena.make_ref(sig);
    arena.add_trigger(wait, trigger);
    arena.add_stmt(proc, wait);

    arena.add_stmt(arch, proc);
    arch
}

fn round_trip(arena: &mut Arena, smap: &mut SourceMap, root: NodeId) -> (NodeId, SourceMap) {
    let mut buf = Vec::new();
    {
        let mut fb = FbufWriter::new(&mut buf, "<mem>");
        let mut w = TreeWriter::new(arena);
        w.write(arena, smap, &mut fb, Some(root)).unwrap();
        fb.flush().unwrap();
    }

    let mut smap2 = SourceMap::new();
    let mut fb = FbufReader::new(Cursor::new(buf), "<mem>");
    let mut r = TreeReader::new();
    let copy = r.read(arena, &mut smap2, &mut fb).unwrap().unwrap();
    (copy, smap2)
}

#[test]
fn arch_round_trips_structurally_equal() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, _) = round_trip(&mut arena, &mut smap, arch);

    assert_ne!(copy, arch);
    assert!(structural_eq(&arena, arch, copy));
}

#[test]
fn sharing_survives_round_trip() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, _) = round_trip(&mut arena, &mut smap, arch);

    // The two operands of the addition must still be the same node
    let proc = arena.stmts(copy)[0];
    let asgn = arena.stmts(proc)[0];
    let wave = arena.waveforms(asgn)[0];
    let add = arena.value(wave);

    let values: Vec<NodeId> = arena.params(add).iter().map(|p| p.value().unwrap()).collect();
    assert_eq!(values[0], values[1]);
}

#[test]
fn back_references_resolve_through_ref_cycles() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, _) = round_trip(&mut arena, &mut smap, arch);

    // The assignment target's ref must resolve to the decl inside the copy
    let sig = arena.decls(copy)[1];
    let proc = arena.stmts(copy)[0];
    let asgn = arena.stmts(proc)[0];
    assert_eq!(arena.ref_(arena.target(asgn)), sig);
}

#[test]
fn types_are_shared_within_document() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, _) = round_trip(&mut arena, &mut smap, arch);

    let width = arena.decls(copy)[0];
    let sig = arena.decls(copy)[1];
    // One Integer record in the stream, one record after reading
    assert_eq!(arena.type_of(width), arena.type_of(sig));
    assert_eq!(arena.type_of(width).kind(), TypeKind::Integer);
}

#[test]
fn locations_remap_to_local_registry() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, smap2) = round_trip(&mut arena, &mut smap, arch);

    let loc = arena.loc(copy);
    assert_eq!(loc.first_line, 1);
    assert_eq!(smap2.file_name(loc.file), Some("counter.vhd"));
}

#[test]
fn flags_and_literals_survive() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let (copy, _) = round_trip(&mut arena, &mut smap, arch);

    let width = arena.decls(copy)[0];
    let lit = arena.value(width);
    assert_eq!(arena.literal(lit), Literal::Int(8));
    assert!(arena.flags(lit).contains(Flags::LOCALLY_STATIC));
}

#[test]
fn aggregates_and_enum_types_round_trip() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();

    let (bit_ty, lits) = arena.declare_enum("bit", &["'0'", "'1'"]);

    let pack = arena.alloc(Kind::Package);
    arena.set_ident(pack, Ident::new("pkg"));

    let arr_ty = Type::new(TypeKind::Carray);
    arr_ty.data_mut().elem = Some(bit_ty.clone());
    let low = arena.alloc(Kind::Literal);
    arena.set_literal(low, Literal::Int(0));
    let high = arena.alloc(Kind::Literal);
    arena.set_literal(high, Literal::Int(7));
    arr_ty.data_mut().dims = vec![Range::to(low, high)];

    let c = arena.alloc(Kind::ConstDecl);
    arena.set_ident(c, Ident::new("zeros"));
    arena.set_type(c, arr_ty.clone());

    let agg = arena.alloc(Kind::Aggregate);
    arena.set_type(agg, arr_ty);
    let zero = arena.make_ref(lits[0]);
    arena.add_assoc(
        agg,
        Assoc {
            choice: Choice::Others,
            value: Some(zero),
        },
    );
    arena.set_value(c, agg);
    arena.add_decl(pack, c);

    let (copy, _) = round_trip(&mut arena, &mut smap, pack);

    assert!(structural_eq(&arena, pack, copy));

    let cc = arena.decls(copy)[0];
    let cagg = arena.value(cc);
    assert_eq!(arena.assocs(cagg).len(), 1);

    // The enum literal reached through the aggregate keeps its position
    let zref = arena.assocs(cagg)[0].value.unwrap();
    assert_eq!(arena.pos(arena.ref_(zref)), 0);
}

#[test]
fn port_decl_extras_round_trip() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();

    let entity = arena.alloc(Kind::Entity);
    arena.set_ident(entity, Ident::new("e"));

    let p = arena.alloc(Kind::PortDecl);
    arena.set_ident(p, Ident::new("clk"));
    arena.set_port_mode(p, PortMode::In);
    arena.add_port(entity, p);

    let (copy, _) = round_trip(&mut arena, &mut smap, entity);
    let cp = arena.ports(copy)[0];
    assert_eq!(arena.port_mode(cp), PortMode::In);
}

#[test]
fn round_trip_through_a_file_on_disk() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();
    let arch = build_arch(&mut arena, &mut smap);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rtl.unit");

    {
        let mut fb = FbufWriter::create(&path).unwrap();
        let mut w = TreeWriter::new(&mut arena);
        w.write(&arena, &smap, &mut fb, Some(arch)).unwrap();
        fb.flush().unwrap();
    }

    let mut smap2 = SourceMap::new();
    let mut fb = FbufReader::open(&path).unwrap();
    let mut r = TreeReader::new();
    let copy = r.read(&mut arena, &mut smap2, &mut fb).unwrap().unwrap();

    assert!(structural_eq(&arena, arch, copy));
}

#[test]
fn null_subtree_round_trips() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();

    let mut buf = Vec::new();
    {
        let mut fb = FbufWriter::new(&mut buf, "<mem>");
        let mut w = TreeWriter::new(&mut arena);
        w.write(&arena, &smap, &mut fb, None).unwrap();
        fb.flush().unwrap();
    }

    let mut fb = FbufReader::new(Cursor::new(buf), "<mem>");
    let mut r = TreeReader::new();
    assert_eq!(r.read(&mut arena, &mut smap, &mut fb).unwrap(), None);
}

#[test]
#[should_panic(expected = "corrupt tree kind")]
fn corrupt_kind_is_fatal() {
    let mut arena = Arena::new();
    let mut smap = SourceMap::new();

    let mut fb = FbufReader::new(Cursor::new(vec![0xf0, 0xf0]), "<mem>");
    let mut r = TreeReader::new();
    let _ = r.read(&mut arena, &mut smap, &mut fb);
}
