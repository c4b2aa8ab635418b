//! Breakpoint registry
//!
//! Breakpoints live only on the bridge side: the debuggee never sees them.
//! Each source path owns an ordered list; ids come from one counter that
//! outlives every set/clear cycle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A line breakpoint (0-based line)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u64,
    pub source_path: String,
    pub line: u32,
    pub verified: bool,
}

/// Per-path breakpoint collections
#[derive(Debug)]
pub struct BreakpointRegistry {
    next_id: u64,
    by_path: HashMap<String, Vec<Breakpoint>>,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_path: HashMap::new(),
        }
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh, unverified breakpoint and return a copy of it
    pub fn add(&mut self, path: &str, line: u32) -> Breakpoint {
        let bp = Breakpoint {
            id: self.next_id,
            source_path: path.to_string(),
            line,
            verified: false,
        };
        self.next_id += 1;

        self.by_path
            .entry(path.to_string())
            .or_default()
            .push(bp.clone());
        bp
    }

    /// Remove the first breakpoint on `path` at `line`
    pub fn remove(&mut self, path: &str, line: u32) -> Option<Breakpoint> {
        let bps = self.by_path.get_mut(path)?;
        let index = bps.iter().position(|bp| bp.line == line)?;
        Some(bps.remove(index))
    }

    /// Drop every breakpoint on `path`
    pub fn clear(&mut self, path: &str) {
        self.by_path.remove(path);
    }

    /// Snapshot of `path`'s breakpoints in insertion order
    pub fn list(&self, path: &str) -> Vec<Breakpoint> {
        self.by_path.get(path).cloned().unwrap_or_default()
    }

    pub fn get(&self, path: &str, id: u64) -> Option<&Breakpoint> {
        self.by_path.get(path)?.iter().find(|bp| bp.id == id)
    }

    /// Mark every unverified in-range breakpoint on `path` as verified.
    ///
    /// Returns only the breakpoints that changed state, so callers emit one
    /// verification event per breakpoint over its lifetime.
    pub fn verify(&mut self, path: &str, line_count: usize) -> Vec<Breakpoint> {
        let Some(bps) = self.by_path.get_mut(path) else {
            return Vec::new();
        };

        let mut newly_verified = Vec::new();
        for bp in bps.iter_mut() {
            if (bp.line as usize) >= line_count || bp.verified {
                continue;
            }
            bp.verified = true;
            newly_verified.push(bp.clone());
        }
        newly_verified
    }
}

/// Candidate break columns on one source line: the first index of each run
/// of non-space characters.
pub fn break_columns(text: &str) -> Vec<usize> {
    let mut columns = Vec::new();
    let mut saw_space = true;

    for (i, c) in text.chars().enumerate() {
        if c == ' ' {
            saw_space = true;
        } else if saw_space {
            columns.push(i);
            saw_space = false;
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase_across_clears() {
        let mut registry = BreakpointRegistry::new();
        let mut last = 0;

        for round in 0..3 {
            let a = registry.add("a.nut", round);
            let b = registry.add("b.nut", round);
            assert!(a.id > last);
            assert!(b.id > a.id);
            last = b.id;

            registry.remove("a.nut", round);
            registry.clear("b.nut");
        }
        assert_eq!(last, 6);
    }

    #[test]
    fn test_set_then_clear_leaves_path_empty() {
        let mut registry = BreakpointRegistry::new();
        registry.add("main.nut", 3);
        let removed = registry.remove("main.nut", 3).unwrap();

        assert_eq!(removed.line, 3);
        assert!(registry.list("main.nut").is_empty());
    }

    #[test]
    fn test_remove_takes_first_match_only() {
        let mut registry = BreakpointRegistry::new();
        let first = registry.add("main.nut", 4);
        let second = registry.add("main.nut", 4);

        assert_eq!(registry.remove("main.nut", 4).unwrap().id, first.id);
        assert_eq!(registry.list("main.nut")[0].id, second.id);
        assert!(registry.remove("main.nut", 9).is_none());
        assert!(registry.remove("other.nut", 4).is_none());
    }

    #[test]
    fn test_verify_out_of_range_stays_unverified() {
        let mut registry = BreakpointRegistry::new();
        let far = registry.add("main.nut", 10);

        for _ in 0..3 {
            assert!(registry.verify("main.nut", 10).is_empty());
        }
        assert!(!registry.get("main.nut", far.id).unwrap().verified);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let mut registry = BreakpointRegistry::new();
        registry.add("main.nut", 0);
        registry.add("main.nut", 12);

        let verified = registry.verify("main.nut", 5);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].line, 0);
        assert!(verified[0].verified);

        assert!(registry.verify("main.nut", 5).is_empty());
    }

    #[test]
    fn test_verify_unknown_path() {
        let mut registry = BreakpointRegistry::new();
        assert!(registry.verify("nothing.nut", 100).is_empty());
    }

    #[test]
    fn test_break_columns() {
        assert_eq!(break_columns("  foo bar  baz"), vec![2, 6, 11]);
        assert_eq!(break_columns("x"), vec![0]);
        assert!(break_columns("    ").is_empty());
        assert!(break_columns("").is_empty());
        // Tabs are not separators
        assert_eq!(break_columns("\tfoo"), vec![0]);
    }
}
