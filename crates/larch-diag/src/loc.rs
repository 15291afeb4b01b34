//! Packed source locations and the source-file registry
//!
//! A location identifies a range of characters in a registered source
//! file. The whole record packs into 64 bits for persistence:
//!
//! ```text
//! | first_line:20 | first_column:12 | line_delta:8 | column_delta:8 | file_ref:16 |
//! ```
//!
//! Out-of-range values saturate to the invalid sentinel for their field.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io::{Read, Write};

use larch_base::fbuf::{FbufError, FbufReader, FbufWriter};
use serde::{Deserialize, Serialize};

/// Line number that marks an invalid location
pub const LINE_INVALID: u32 = 0xfffff;
/// Column number that marks an invalid location
pub const COLUMN_INVALID: u16 = 0xfff;
/// Saturated line or column delta
pub const DELTA_INVALID: u8 = 0xff;

const LOC_MAGIC: u16 = 0xf00f;

/// Stable reference to an entry in the file registry
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FileRef(pub u16);

impl FileRef {
    /// Sentinel for "no file"
    pub const INVALID: FileRef = FileRef(0xffff);

    pub fn is_invalid(self) -> bool {
        self == FileRef::INVALID
    }
}

/// A source range: start line/column, extent, and originating file
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Loc {
    pub first_line: u32,
    pub first_column: u16,
    pub line_delta: u8,
    pub column_delta: u8,
    pub file: FileRef,
}

impl Loc {
    /// The invalid location
    pub const INVALID: Loc = Loc {
        first_line: LINE_INVALID,
        first_column: COLUMN_INVALID,
        line_delta: 0,
        column_delta: 0,
        file: FileRef::INVALID,
    };

    /// Build a location from absolute start and end coordinates
    ///
    /// Any coordinate already at its invalid ceiling yields
    /// `Loc::INVALID`; otherwise each packed field saturates at its
    /// sentinel.
    pub fn new(
        first_line: u32,
        first_column: u16,
        last_line: u32,
        last_column: u16,
        file: FileRef,
    ) -> Loc {
        if first_line >= LINE_INVALID
            || last_line >= LINE_INVALID
            || first_column >= COLUMN_INVALID
            || last_column >= COLUMN_INVALID
        {
            return Loc::INVALID;
        }

        debug_assert!(first_line <= last_line);
        debug_assert!(first_line != last_line || first_column <= last_column);

        Loc {
            first_line,
            first_column,
            line_delta: (last_line - first_line).min(DELTA_INVALID as u32) as u8,
            column_delta: (last_column.saturating_sub(first_column)).min(DELTA_INVALID as u16)
                as u8,
            file,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.first_line == LINE_INVALID || self.file.is_invalid()
    }

    /// Pack into the on-disk 64-bit representation
    pub fn pack(&self) -> u64 {
        ((self.first_line as u64) << 44)
            | ((self.first_column as u64) << 32)
            | ((self.line_delta as u64) << 24)
            | ((self.column_delta as u64) << 16)
            | self.file.0 as u64
    }

    /// Unpack the 64-bit representation, substituting a remapped file ref
    pub fn unpack(merged: u64, file: FileRef) -> Loc {
        Loc {
            first_line: ((merged >> 44) & 0xfffff) as u32,
            first_column: ((merged >> 32) & 0xfff) as u16,
            line_delta: ((merged >> 24) & 0xff) as u8,
            column_delta: ((merged >> 16) & 0xff) as u8,
            file,
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "<invalid>")
        } else {
            write!(f, "{}:{}", self.first_line, self.first_column + 1)
        }
    }
}

struct LocFile {
    ref_: FileRef,
    name: String,
    content: RefCell<Option<String>>,
    tried_open: RefCell<bool>,
}

/// Registry of source files referenced by locations
///
/// File references are stable for the lifetime of the registry.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<LocFile>,
}

/// Collapse consecutive `/` characters
fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_slash = false;
    for c in name.chars() {
        if c == '/' && last_slash {
            continue;
        }
        last_slash = c == '/';
        out.push(c);
    }
    out
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file, de-duplicating by canonical name
    pub fn intern(&mut self, name: &str) -> FileRef {
        for f in &self.files {
            if f.name == name {
                return f.ref_;
            }
        }

        let canonical = canonical_name(name);
        for f in &self.files {
            if f.name == canonical {
                return f.ref_;
            }
        }

        self.intern_with_content(canonical, None)
    }

    /// Register a file whose contents are already in memory
    pub fn intern_buffer(&mut self, name: &str, content: String) -> FileRef {
        self.intern_with_content(canonical_name(name), Some(content))
    }

    fn intern_with_content(&mut self, canonical: String, content: Option<String>) -> FileRef {
        let ref_ = FileRef(self.files.len() as u16);
        self.files.push(LocFile {
            ref_,
            name: canonical,
            tried_open: RefCell::new(content.is_some()),
            content: RefCell::new(content),
        });
        ref_
    }

    /// Canonical name of a registered file
    pub fn file_name(&self, fr: FileRef) -> Option<&str> {
        if fr.is_invalid() {
            return None;
        }
        self.files.get(fr.0 as usize).map(|f| f.name.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Fetch one source line (1-indexed), loading and caching the file on
    /// first use. A file that fails to open is not retried.
    pub fn source_line(&self, fr: FileRef, line: u32) -> Option<String> {
        if fr.is_invalid() || line == 0 || line >= LINE_INVALID {
            return None;
        }
        let file = self.files.get(fr.0 as usize)?;

        {
            let mut content = file.content.borrow_mut();
            if content.is_none() && !*file.tried_open.borrow() {
                *file.tried_open.borrow_mut() = true;
                if let Ok(text) = fs::read_to_string(&file.name) {
                    *content = Some(text);
                }
            }
        }

        let content = file.content.borrow();
        let text = content.as_deref()?;
        text.lines().nth(line as usize - 1).map(str::to_owned)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }
}

/// Streaming writer for packed locations
///
/// The first location written emits the magic word and the file-name
/// index; every location thereafter is a single `u64`.
pub struct LocWriter {
    have_index: bool,
}

impl LocWriter {
    pub fn new() -> Self {
        Self { have_index: false }
    }

    pub fn write<W: Write>(
        &mut self,
        loc: &Loc,
        smap: &SourceMap,
        fb: &mut FbufWriter<W>,
    ) -> Result<(), FbufError> {
        if !self.have_index {
            fb.write_u16(LOC_MAGIC)?;
            fb.put_uint(smap.file_count() as u64)?;
            for name in smap.names() {
                fb.put_str(name)?;
            }
            self.have_index = true;
        }

        fb.write_u64(loc.pack())
    }
}

impl Default for LocWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming reader for packed locations
///
/// File references in the stream are remapped on first encounter to an
/// entry of the local registry with the same canonical name, appending a
/// new entry when none matches.
pub struct LocReader {
    have_index: bool,
    file_map: Vec<String>,
    ref_map: Vec<FileRef>,
}

impl LocReader {
    pub fn new() -> Self {
        Self {
            have_index: false,
            file_map: Vec::new(),
            ref_map: Vec::new(),
        }
    }

    pub fn read<R: Read>(
        &mut self,
        smap: &mut SourceMap,
        fb: &mut FbufReader<R>,
    ) -> Result<Loc, FbufError> {
        if !self.have_index {
            let magic = fb.read_u16()?;
            if magic != LOC_MAGIC {
                panic!("corrupt location header in {}", fb.file_name());
            }

            let n_files = fb.get_uint()? as usize;
            for _ in 0..n_files {
                self.file_map.push(fb.get_str()?);
                self.ref_map.push(FileRef::INVALID);
            }
            self.have_index = true;
        }

        let merged = fb.read_u64()?;

        let old_ref = (merged & 0xffff) as u16;
        let mut new_ref = FileRef::INVALID;
        if old_ref != FileRef::INVALID.0 {
            if old_ref as usize >= self.file_map.len() {
                panic!("corrupt location file reference {old_ref:#x}");
            }

            if self.ref_map[old_ref as usize].is_invalid() {
                self.ref_map[old_ref as usize] = smap.intern(&self.file_map[old_ref as usize]);
            }

            new_ref = self.ref_map[old_ref as usize];
        }

        Ok(Loc::unpack(merged, new_ref))
    }
}

impl Default for LocReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pack_unpack_identity() {
        let mut smap = SourceMap::new();
        let file = smap.intern("top.vhd");

        let loc = Loc::new(120, 4, 120, 17, file);
        assert_eq!(Loc::unpack(loc.pack(), file), loc);
        assert_eq!(loc.line_delta, 0);
        assert_eq!(loc.column_delta, 13);
    }

    #[test]
    fn construction_saturates() {
        let mut smap = SourceMap::new();
        let file = smap.intern("big.vhd");

        let loc = Loc::new(10, 0, 2000, 5, file);
        assert_eq!(loc.line_delta, DELTA_INVALID);

        let invalid = Loc::new(LINE_INVALID, 0, LINE_INVALID, 0, file);
        assert!(invalid.is_invalid());
    }

    #[test]
    fn intern_collapses_slashes_and_dedups() {
        let mut smap = SourceMap::new();
        let a = smap.intern("lib//work/top.vhd");
        let b = smap.intern("lib/work/top.vhd");

        assert_eq!(a, b);
        assert_eq!(smap.file_name(a), Some("lib/work/top.vhd"));
        assert_eq!(smap.file_count(), 1);
    }

    #[test]
    fn source_line_from_buffer() {
        let mut smap = SourceMap::new();
        let file = smap.intern_buffer("mem.vhd", "entity e is\nend entity;\n".to_string());

        assert_eq!(smap.source_line(file, 1).as_deref(), Some("entity e is"));
        assert_eq!(smap.source_line(file, 2).as_deref(), Some("end entity;"));
        assert_eq!(smap.source_line(file, 3), None);
    }

    #[test]
    fn missing_file_is_tried_once() {
        let mut smap = SourceMap::new();
        let file = smap.intern("/nonexistent/missing.vhd");

        assert_eq!(smap.source_line(file, 1), None);
        assert_eq!(smap.source_line(file, 1), None);
    }

    #[test]
    fn location_stream_round_trip() {
        let mut smap = SourceMap::new();
        let f1 = smap.intern("a.vhd");
        let f2 = smap.intern("b.vhd");

        let l1 = Loc::new(3, 0, 3, 9, f1);
        let l2 = Loc::new(40, 2, 41, 0, f2);

        let mut buf = Vec::new();
        {
            let mut fb = FbufWriter::new(&mut buf, "<mem>");
            let mut w = LocWriter::new();
            w.write(&l1, &smap, &mut fb).unwrap();
            w.write(&l2, &smap, &mut fb).unwrap();
            fb.flush().unwrap();
        }

        // A fresh registry with one of the two files already present
        let mut smap2 = SourceMap::new();
        smap2.intern("b.vhd");

        let mut fb = FbufReader::new(Cursor::new(buf), "<mem>");
        let mut r = LocReader::new();
        let r1 = r.read(&mut smap2, &mut fb).unwrap();
        let r2 = r.read(&mut smap2, &mut fb).unwrap();

        assert_eq!(
            (r1.first_line, r1.first_column, r1.line_delta, r1.column_delta),
            (3, 0, 0, 9)
        );
        assert_eq!((r2.first_line, r2.line_delta), (40, 1));

        assert_eq!(smap2.file_name(r1.file), Some("a.vhd"));
        assert_eq!(smap2.file_name(r2.file), Some("b.vhd"));
        assert_eq!(smap2.file_count(), 2);
    }

    #[test]
    fn invalid_location_round_trips() {
        let smap = SourceMap::new();
        let mut buf = Vec::new();
        {
            let mut fb = FbufWriter::new(&mut buf, "<mem>");
            let mut w = LocWriter::new();
            w.write(&Loc::INVALID, &smap, &mut fb).unwrap();
            fb.flush().unwrap();
        }

        let mut smap2 = SourceMap::new();
        let mut fb = FbufReader::new(Cursor::new(buf), "<mem>");
        let mut r = LocReader::new();
        assert!(r.read(&mut smap2, &mut fb).unwrap().is_invalid());
    }

    #[test]
    #[should_panic(expected = "corrupt location header")]
    fn corrupt_magic_is_fatal() {
        let mut smap = SourceMap::new();
        let mut fb = FbufReader::new(Cursor::new(vec![0xde, 0xad]), "<mem>");
        let mut r = LocReader::new();
        let _ = r.read(&mut smap, &mut fb);
    }
}
