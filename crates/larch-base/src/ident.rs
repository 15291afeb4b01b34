//! Interned identifiers
//!
//! Identifiers are interned into a process-wide table; two idents compare
//! equal exactly when they intern the same spelling, so equality and
//! hashing are integer operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

/// An interned identifier
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(u32);

struct Interner {
    map: HashMap<&'static str, u32>,
    strs: Vec<&'static str>,
}

static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
static UNIQ_COUNTER: AtomicU32 = AtomicU32::new(0);

fn interner() -> &'static Mutex<Interner> {
    INTERNER.get_or_init(|| {
        Mutex::new(Interner {
            map: HashMap::new(),
            strs: Vec::new(),
        })
    })
}

impl Ident {
    /// Intern a string, returning its canonical identifier
    pub fn new(s: &str) -> Ident {
        let mut int = interner().lock().unwrap();
        if let Some(&id) = int.map.get(s) {
            return Ident(id);
        }

        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let id = int.strs.len() as u32;
        int.strs.push(leaked);
        int.map.insert(leaked, id);
        Ident(id)
    }

    /// The interned spelling
    pub fn as_str(self) -> &'static str {
        let int = interner().lock().unwrap();
        int.strs[self.0 as usize]
    }

    /// Intern a fresh identifier based on `prefix`
    ///
    /// If `prefix` itself has not been interned yet it is returned
    /// unchanged; otherwise a numeric suffix is appended until the name
    /// is unused.
    pub fn uniq(prefix: &str) -> Ident {
        {
            let int = interner().lock().unwrap();
            if !int.map.contains_key(prefix) {
                drop(int);
                return Ident::new(prefix);
            }
        }

        loop {
            let n = UNIQ_COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("{prefix}{n}");
            let int = interner().lock().unwrap();
            if !int.map.contains_key(candidate.as_str()) {
                drop(int);
                return Ident::new(&candidate);
            }
        }
    }

    /// Join two identifiers with a separator character
    pub fn prefix(self, suffix: Ident, sep: char) -> Ident {
        Ident::new(&format!("{}{}{}", self.as_str(), sep, suffix.as_str()))
    }

    /// The portion before the first occurrence of `sep`, or the whole
    /// identifier if `sep` does not occur
    pub fn until(self, sep: char) -> Ident {
        match self.as_str().split_once(sep) {
            Some((head, _)) => Ident::new(head),
            None => self,
        }
    }

    /// The portion after the first occurrence of `sep`
    pub fn from(self, sep: char) -> Option<Ident> {
        self.as_str().split_once(sep).map(|(_, tail)| Ident::new(tail))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_canonical() {
        let a = Ident::new("counter");
        let b = Ident::new("counter");
        let c = Ident::new("counter2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "counter");
    }

    #[test]
    fn uniq_avoids_collisions() {
        let base = Ident::new("delayed_clk");
        let u1 = Ident::uniq("delayed_clk");
        let u2 = Ident::uniq("delayed_clk");

        assert_ne!(u1, base);
        assert_ne!(u1, u2);
        assert!(u1.as_str().starts_with("delayed_clk"));
    }

    #[test]
    fn prefix_and_split() {
        let lib = Ident::new("ieee");
        let pack = Ident::new("std_logic_1164");
        let qual = lib.prefix(pack, '.');

        assert_eq!(qual.as_str(), "ieee.std_logic_1164");
        assert_eq!(qual.until('.'), lib);
        assert_eq!(qual.from('.'), Some(pack));
        assert_eq!(lib.until('.'), lib);
        assert_eq!(lib.from('.'), None);
    }
}
