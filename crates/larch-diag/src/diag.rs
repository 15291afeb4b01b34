//! Coalesced multi-location diagnostics
//!
//! A diagnostic carries a message plus any number of location hints and
//! stack-trace entries. Emission renders the referenced source lines with
//! caret underlining, paginates long messages to the terminal width and
//! maintains the process-wide error count.

use std::fmt;
use std::io::{self, IsTerminal, Write};

use serde::{Deserialize, Serialize};

use crate::loc::{Loc, SourceMap};

/// Diagnostic severity
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone)]
enum Style {
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Red => "\x1b[31m",
            Style::Green => "\x1b[32m",
            Style::Yellow => "\x1b[33m",
            Style::Blue => "\x1b[34m",
            Style::Cyan => "\x1b[36m",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Writes styled spans, degrading to plain text when color is off
struct Painter {
    enabled: bool,
}

impl Painter {
    fn paint(&self, w: &mut dyn Write, style: Style, text: &str) -> io::Result<()> {
        if self.enabled && !text.is_empty() {
            write!(w, "{}{}{}", style.code(), text, RESET)
        } else {
            w.write_all(text.as_bytes())
        }
    }
}

#[derive(Debug)]
struct Hint {
    loc: Loc,
    text: Option<String>,
    priority: i32,
}

/// A diagnostic under construction
#[derive(Debug)]
pub struct Diagnostic {
    level: Severity,
    msg: String,
    hints: Vec<Hint>,
    trace: Vec<Hint>,
    color: bool,
    source: bool,
}

impl Diagnostic {
    fn new(level: Severity, color: bool) -> Self {
        Self {
            level,
            msg: String::new(),
            hints: Vec::new(),
            trace: Vec::new(),
            color,
            source: true,
        }
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    /// Append text to the message
    pub fn printf(&mut self, text: &str) {
        self.msg.push_str(text);
    }

    /// The message accumulated so far
    pub fn text(&self) -> &str {
        &self.msg
    }

    /// Location of the primary hint, if any
    pub fn loc(&self) -> Option<Loc> {
        self.hints.first().map(|h| h.loc)
    }

    /// Number of secondary hints
    pub fn hint_count(&self) -> usize {
        self.hints.len().saturating_sub(1)
    }

    /// Attach a hint at `loc`
    ///
    /// A hint at an already-hinted location replaces that hint's text.
    /// Insertion order determines rendering order for hints on the same
    /// line, earliest first.
    pub fn hint(&mut self, loc: Loc, text: impl Into<String>) {
        let text = text.into();

        if !loc.is_invalid() {
            for hint in &mut self.hints {
                if hint.loc == loc {
                    hint.text = Some(text);
                    return;
                }
            }
        }

        let priority = -(self.hints.len() as i32);
        self.hints.push(Hint {
            loc,
            text: Some(text),
            priority,
        });
    }

    /// Append a stack-trace entry
    pub fn trace(&mut self, loc: Loc, text: impl Into<String>) {
        let priority = self.trace.len() as i32 + 1;
        self.trace.push(Hint {
            loc,
            text: Some(text.into()),
            priority,
        });
    }

    /// Control whether source excerpts are rendered
    pub fn show_source(&mut self, show: bool) {
        self.source = show;
    }
}

/// Configuration for diagnostic emission
#[derive(Debug, Clone)]
pub struct DiagConfig {
    /// Abort after this many errors; `None` disables the limit
    pub error_limit: Option<usize>,
    /// Count every emission, not just errors
    pub unit_test: bool,
    /// Emit `file:line:col: level: msg` single-line messages
    pub compact: bool,
    /// Use ANSI styling
    pub color: bool,
    /// Wrap width; `None` auto-detects the terminal
    pub width: Option<usize>,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            error_limit: Some(50),
            unit_test: false,
            compact: false,
            color: io::stderr().is_terminal(),
            width: None,
        }
    }
}

type Consumer = Box<dyn FnMut(Diagnostic)>;
type HintFn = Box<dyn FnMut(&mut Diagnostic)>;

/// Sink for diagnostics: error accounting, consumer hook, hint callback
///
/// Packages what the toolchain otherwise keeps as process globals, so a
/// driver threads exactly one of these through every phase.
pub struct Reporter {
    config: DiagConfig,
    consumer: Option<Consumer>,
    hint_fn: Option<HintFn>,
    n_errors: usize,
}

impl Reporter {
    pub fn new(config: DiagConfig) -> Self {
        Self {
            config,
            consumer: None,
            hint_fn: None,
            n_errors: 0,
        }
    }

    /// Begin a diagnostic; a valid `loc` seeds the primary hint
    pub fn diag(&mut self, level: Severity, loc: Loc) -> Diagnostic {
        let color = self.config.color && self.consumer.is_none();
        let mut d = Diagnostic::new(level, color);

        if !loc.is_invalid() {
            d.hints.push(Hint {
                loc,
                text: None,
                priority: 0,
            });
        }

        if let Some(hint_fn) = self.hint_fn.as_mut() {
            hint_fn(&mut d);
        }

        d
    }

    /// Shorthand: emit a warning with a one-line message
    pub fn warn_at(&mut self, smap: &SourceMap, loc: Loc, msg: &str) {
        let mut d = self.diag(Severity::Warning, loc);
        d.printf(msg);
        self.emit(smap, d);
    }

    /// Shorthand: emit an error with a one-line message
    pub fn error_at(&mut self, smap: &SourceMap, loc: Loc, msg: &str) {
        let mut d = self.diag(Severity::Error, loc);
        d.printf(msg);
        self.emit(smap, d);
    }

    /// Install a consumer that takes over rendering entirely
    pub fn set_consumer(&mut self, consumer: Option<Consumer>) {
        self.consumer = consumer;
    }

    /// Install a callback invoked on every new diagnostic to attach
    /// contextual hints
    pub fn set_hint_fn(&mut self, hint_fn: Option<HintFn>) {
        self.hint_fn = hint_fn;
    }

    pub fn error_count(&self) -> usize {
        self.n_errors
    }

    pub fn reset_error_count(&mut self) {
        self.n_errors = 0;
    }

    /// Emit to standard error
    pub fn emit(&mut self, smap: &SourceMap, d: Diagnostic) {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        self.femit(smap, d, &mut lock);
    }

    /// Emit to an arbitrary stream
    pub fn femit(&mut self, smap: &SourceMap, d: Diagnostic, w: &mut dyn Write) {
        let level = d.level;

        if let Some(consumer) = self.consumer.as_mut() {
            consumer(d);
        } else if self.config.compact {
            let _ = self.emit_compact(smap, &d, w);
        } else {
            let _ = self.emit_full(smap, &d, w);
        }

        if level >= Severity::Error || self.config.unit_test {
            self.n_errors += 1;
            if Some(self.n_errors) == self.config.error_limit {
                panic!("too many errors, giving up");
            }
        }
    }

    fn emit_compact(
        &self,
        smap: &SourceMap,
        d: &Diagnostic,
        w: &mut dyn Write,
    ) -> io::Result<()> {
        if let Some(loc) = d.loc() {
            if !loc.is_invalid() {
                if let Some(name) = smap.file_name(loc.file) {
                    write!(w, "{}:{}:{}: ", name, loc.first_line, loc.first_column + 1)?;
                }
            }
            writeln!(w, "{}: {}", d.level, d.msg)?;
        }
        Ok(())
    }

    fn emit_full(&self, smap: &SourceMap, d: &Diagnostic, w: &mut dyn Write) -> io::Result<()> {
        let painter = Painter { enabled: d.color };

        let (prefix, style) = match d.level {
            Severity::Note => ("** Note: ", None),
            Severity::Warning => ("** Warning: ", Some(Style::Yellow)),
            Severity::Error => ("** Error: ", Some(Style::Red)),
            Severity::Fatal => ("** Fatal: ", Some(Style::Red)),
        };
        match style {
            Some(s) => painter.paint(w, s, prefix)?,
            None => w.write_all(prefix.as_bytes())?,
        }

        self.paginate(&d.msg, prefix.len(), w)?;
        writeln!(w)?;

        if !d.hints.is_empty() {
            self.emit_hints(smap, d, &painter, w)?;
        }

        if !d.trace.is_empty() {
            self.emit_trace(smap, d, w)?;
        }

        w.flush()
    }

    fn width(&self) -> usize {
        match self.config.width {
            Some(n) => n,
            None => {
                if io::stderr().is_terminal() {
                    std::env::var("COLUMNS")
                        .ok()
                        .and_then(|c| c.parse().ok())
                        .unwrap_or(80)
                } else {
                    0
                }
            }
        }
    }

    /// Word-wrap `text` to the terminal width with a hanging indent
    fn paginate(&self, text: &str, left: usize, w: &mut dyn Write) -> io::Result<()> {
        let right = self.width();

        if right == 0 || left + text.chars().count() < right {
            return w.write_all(text.as_bytes());
        }

        let mut col = left;
        let mut first = true;
        for word in text.split_whitespace() {
            let len = word.chars().count();
            if !first && col + len + 1 >= right {
                write!(w, "\n{:left$}", "")?;
                col = left;
            } else if !first {
                w.write_all(b" ")?;
                col += 1;
            }
            w.write_all(word.as_bytes())?;
            col += len;
            first = false;
        }
        Ok(())
    }

    fn emit_hints(
        &self,
        smap: &SourceMap,
        d: &Diagnostic,
        painter: &Painter,
        w: &mut dyn Write,
    ) -> io::Result<()> {
        let loc0 = d.hints[0].loc;

        let mut sorted: Vec<&Hint> = d.hints.iter().collect();
        sorted.sort_by_key(|h| (h.loc.file.0, h.loc.first_line, h.priority));

        let mut fwidth = 0usize;
        let mut have_source = false;
        let mut need_gap = false;

        if !loc0.file.is_invalid() {
            let mut same_file = 0usize;
            let mut line_max = 0u32;
            for h in &d.hints {
                if h.loc.file == loc0.file {
                    same_file += 1;
                    line_max = line_max.max(h.loc.first_line);
                }
            }

            have_source = d.source && smap.source_line(loc0.file, loc0.first_line).is_some();

            fwidth = if have_source {
                let mut n = line_max;
                let mut width = 0;
                while n > 0 {
                    width += 1;
                    n /= 10;
                }
                width.max(1)
            } else {
                1
            };

            if have_source || d.trace.len() <= 1 {
                writeln!(
                    w,
                    "\tFile {}, Line {}",
                    smap.file_name(loc0.file).unwrap_or("<unknown>"),
                    loc0.first_line
                )?;
            }

            if have_source {
                write!(w, "{:fwidth$} ", "")?;
                painter.paint(w, Style::Blue, " |")?;
                writeln!(w)?;
                need_gap = true;

                let mut last_line = 0u32;
                for hint in &sorted {
                    if hint.loc.file != loc0.file || hint.loc.first_line == last_line {
                        continue;
                    }

                    if last_line != 0 && hint.loc.first_line > last_line + 2 {
                        write!(w, " ")?;
                        painter.paint(w, Style::Blue, "...")?;
                        writeln!(w)?;
                    } else if last_line != 0 {
                        for line in last_line + 1..hint.loc.first_line {
                            self.emit_source_line(smap, painter, fwidth, loc0.file, line, w)?;
                        }
                    }

                    let line = hint.loc.first_line;
                    self.emit_source_line(smap, painter, fwidth, loc0.file, line, w)?;
                    last_line = line;

                    // Only one hint per line is rendered
                    let primary = hint.priority == 0;
                    let red = same_file > 1 && primary && d.level >= Severity::Error;
                    let caret_style = if red { Style::Red } else { Style::Green };

                    write!(w, "{:fwidth$} ", "")?;
                    painter.paint(w, Style::Blue, " |")?;
                    write!(w, " {:width$}", "", width = hint.loc.first_column as usize)?;

                    let ncarets = if hint.loc.line_delta == 0 {
                        hint.loc.column_delta as usize + 1
                    } else {
                        1
                    };
                    let carets = "^".repeat(ncarets);
                    painter.paint(w, caret_style, &carets)?;

                    if let Some(text) = &hint.text {
                        painter.paint(w, caret_style, &format!(" {text}"))?;
                    }
                    writeln!(w)?;
                }
            }
        }

        // Hints in other files, or every hint when no source is available
        for hint in &sorted {
            if hint.loc.file == loc0.file && have_source {
                continue;
            }
            let Some(text) = &hint.text else { continue };

            if need_gap {
                write!(w, "{:fwidth$} ", "")?;
                painter.paint(w, Style::Blue, " |")?;
                writeln!(w)?;
                need_gap = false;
            }

            let mut col = fwidth;
            write!(w, "{:fwidth$}", "")?;
            if have_source {
                painter.paint(w, Style::Blue, "  = ")?;
                col += 4;
            }
            write!(w, "Note: ")?;
            col += 6;

            self.paginate(text, col, w)?;
            writeln!(w)?;

            if !hint.loc.is_invalid() {
                writeln!(
                    w,
                    "{:fwidth$}  \tFile {}, Line {}",
                    "",
                    smap.file_name(hint.loc.file).unwrap_or("<unknown>"),
                    hint.loc.first_line
                )?;
            }
        }

        Ok(())
    }

    fn emit_source_line(
        &self,
        smap: &SourceMap,
        painter: &Painter,
        fwidth: usize,
        file: crate::loc::FileRef,
        line: u32,
        w: &mut dyn Write,
    ) -> io::Result<()> {
        let text = smap.source_line(file, line).unwrap_or_default();

        painter.paint(w, Style::Blue, &format!(" {line:>fwidth$} |"))?;
        w.write_all(b" ")?;

        // Expand tabs and drop unprintable characters so caret columns line up
        let mut cleaned = String::with_capacity(text.len());
        let mut col = 0usize;
        for c in text.chars() {
            if c == '\r' {
                continue;
            } else if c == '\t' {
                loop {
                    cleaned.push(' ');
                    col += 1;
                    if col % 8 == 0 {
                        break;
                    }
                }
            } else if !c.is_control() {
                cleaned.push(c);
                col += 1;
            }
        }
        painter.paint(w, Style::Cyan, &cleaned)?;
        writeln!(w)
    }

    fn emit_trace(&self, smap: &SourceMap, d: &Diagnostic, w: &mut dyn Write) -> io::Result<()> {
        // A single-entry trace that repeats the primary location adds nothing
        if d.trace.len() == 1 {
            if let Some(hloc) = d.loc() {
                let tloc = d.trace[0].loc;
                if tloc.file == hloc.file || tloc.first_line == hloc.first_line {
                    return Ok(());
                }
            }
        }

        for hint in &d.trace {
            if let Some(text) = &hint.text {
                writeln!(w, "   {text}")?;
            }
            if !hint.loc.is_invalid() {
                writeln!(
                    w,
                    "\tFile {}, Line {}",
                    smap.file_name(hint.loc.file).unwrap_or("<unknown>"),
                    hint.loc.first_line
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_reporter() -> Reporter {
        Reporter::new(DiagConfig {
            error_limit: Some(50),
            unit_test: false,
            compact: false,
            color: false,
            width: Some(0),
        })
    }

    fn source_map() -> (SourceMap, crate::loc::FileRef) {
        let mut smap = SourceMap::new();
        let file = smap.intern_buffer(
            "adder.vhd",
            "entity adder is\n  port (a : in bit;\n        b : in bit);\nend entity;\n"
                .to_string(),
        );
        (smap, file)
    }

    fn render(r: &mut Reporter, smap: &SourceMap, d: Diagnostic) -> String {
        let mut out = Vec::new();
        r.femit(smap, d, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn message_with_source_and_caret() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let loc = Loc::new(2, 8, 2, 8, file);
        let mut d = r.diag(Severity::Error, loc);
        d.printf("signal a is not a generic");
        d.hint(loc, "declared here");

        let out = render(&mut r, &smap, d);
        assert!(out.contains("** Error: signal a is not a generic"));
        assert!(out.contains("File adder.vhd, Line 2"));
        assert!(out.contains("2 |   port (a : in bit;"));
        assert!(out.contains("^ declared here"));
        assert_eq!(r.error_count(), 1);
    }

    #[test]
    fn caret_run_spans_column_delta() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let loc = Loc::new(1, 7, 1, 11, file);
        let mut d = r.diag(Severity::Error, loc);
        d.printf("bad name");

        let out = render(&mut r, &smap, d);
        assert!(out.contains("^^^^^"));
    }

    #[test]
    fn hint_at_same_loc_replaces_text() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let loc = Loc::new(1, 0, 1, 5, file);
        let mut d = r.diag(Severity::Warning, loc);
        d.printf("msg");
        d.hint(loc, "first");
        d.hint(loc, "second");

        assert_eq!(d.hint_count(), 0);
        let out = render(&mut r, &smap, d);
        assert!(out.contains("second"));
        assert!(!out.contains("first"));
    }

    #[test]
    fn other_file_hint_is_freestanding_note() {
        let (mut smap, file) = source_map();
        let other = smap.intern_buffer("pkg.vhd", "package p is\nend package;\n".to_string());
        let mut r = test_reporter();

        let mut d = r.diag(Severity::Error, Loc::new(1, 0, 1, 5, file));
        d.printf("duplicate declaration");
        d.hint(Loc::new(1, 0, 1, 6, other), "previously declared here");

        let out = render(&mut r, &smap, d);
        assert!(out.contains("Note: previously declared here"));
        assert!(out.contains("File pkg.vhd, Line 1"));
    }

    #[test]
    fn compact_style() {
        let (smap, file) = source_map();
        let mut r = Reporter::new(DiagConfig {
            compact: true,
            color: false,
            width: Some(0),
            ..DiagConfig::default()
        });

        let mut d = r.diag(Severity::Error, Loc::new(3, 8, 3, 8, file));
        d.printf("b is undriven");

        let out = render(&mut r, &smap, d);
        assert_eq!(out, "adder.vhd:3:9: error: b is undriven\n");
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let mut d = r.diag(Severity::Warning, Loc::new(1, 0, 1, 0, file));
        d.printf("unused signal");
        let _ = render(&mut r, &smap, d);

        assert_eq!(r.error_count(), 0);
    }

    #[test]
    fn unit_test_mode_counts_everything() {
        let (smap, file) = source_map();
        let mut r = Reporter::new(DiagConfig {
            unit_test: true,
            color: false,
            width: Some(0),
            ..DiagConfig::default()
        });

        let mut d = r.diag(Severity::Note, Loc::new(1, 0, 1, 0, file));
        d.printf("note");
        let _ = render(&mut r, &smap, d);

        assert_eq!(r.error_count(), 1);
    }

    #[test]
    #[should_panic(expected = "too many errors")]
    fn error_limit_is_fatal() {
        let (smap, file) = source_map();
        let mut r = Reporter::new(DiagConfig {
            error_limit: Some(2),
            color: false,
            width: Some(0),
            ..DiagConfig::default()
        });

        for _ in 0..2 {
            let mut d = r.diag(Severity::Error, Loc::new(1, 0, 1, 0, file));
            d.printf("boom");
            let mut out = Vec::new();
            r.femit(&smap, d, &mut out);
        }
    }

    #[test]
    fn consumer_takes_over() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        use std::sync::{Arc, Mutex};
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        r.set_consumer(Some(Box::new(move |d: Diagnostic| {
            seen2.lock().unwrap().push(d.text().to_string());
        })));

        let mut d = r.diag(Severity::Error, Loc::new(1, 0, 1, 0, file));
        d.printf("captured");
        let out = render(&mut r, &smap, d);

        assert!(out.is_empty());
        assert_eq!(seen.lock().unwrap().as_slice(), &["captured".to_string()]);
    }

    #[test]
    fn hint_callback_runs_on_new_diagnostics() {
        let (smap, file) = source_map();
        let mut r = test_reporter();
        let extra = Loc::new(4, 0, 4, 3, file);

        r.set_hint_fn(Some(Box::new(move |d: &mut Diagnostic| {
            d.hint(extra, "while elaborating entity adder");
        })));

        let mut d = r.diag(Severity::Error, Loc::new(1, 0, 1, 5, file));
        d.printf("oops");
        assert_eq!(d.hint_count(), 1);

        let out = render(&mut r, &smap, d);
        assert!(out.contains("while elaborating entity adder"));
    }

    #[test]
    fn single_entry_trace_matching_primary_is_suppressed() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let loc = Loc::new(2, 0, 2, 4, file);
        let mut d = r.diag(Severity::Error, loc);
        d.printf("failed");
        d.trace(loc, "from process main");

        let out = render(&mut r, &smap, d);
        assert!(!out.contains("from process main"));
    }

    #[test]
    fn multi_entry_trace_is_rendered_in_order() {
        let (smap, file) = source_map();
        let mut r = test_reporter();

        let mut d = r.diag(Severity::Error, Loc::new(2, 0, 2, 4, file));
        d.printf("failed");
        d.trace(Loc::new(3, 0, 3, 1, file), "from function f");
        d.trace(Loc::new(4, 0, 4, 1, file), "from process main");

        let out = render(&mut r, &smap, d);
        let f_pos = out.find("from function f").unwrap();
        let p_pos = out.find("from process main").unwrap();
        assert!(f_pos < p_pos);
    }
}
