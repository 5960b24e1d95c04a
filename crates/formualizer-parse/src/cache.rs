//! Parse-and-cache layer: identical formula templates (same structure, same
//! absolute operands, relative operands erased) are parsed once and shared
//! as an `Arc<ASTNode>` by every cell that uses that template. Because the
//! cached tree's own relative-reference coordinates belong to whichever
//! cell first produced that template, the cache hands back the *origin* it
//! was first parsed at alongside the `Arc`; callers rebase the template's
//! references from that origin onto their own cell's position (via
//! `RelativeCoord::rebase`) to get their own concrete dependency list — this
//! module only owns the parse-once-per-template cache, not absolutization.
//!
//! The cache keys on `text_template_hash`, the lexer-free regex-driven hash,
//! computed directly from `formula`'s raw text — a cache hit is therefore
//! resolved without tokenizing or parsing at all. Only a miss pays for a
//! full `parse`.

use std::sync::{Arc, RwLock};

use formualizer_common::RelativeCoord;
use rustc_hash::FxHashMap;

use crate::hasher::text_template_hash;
use crate::parser::{parse, ASTNode};
use crate::types::{FormulaDialect, ParsingError};

struct Entry {
    ast: Arc<ASTNode>,
    origin: RelativeCoord,
}

/// Parses formula text, caching by template hash so formulas that only
/// differ in relative operands reuse one `ASTNode` allocation.
pub struct ParseCache {
    dialect: FormulaDialect,
    entries: RwLock<FxHashMap<u64, Entry>>,
}

impl ParseCache {
    pub fn new(dialect: FormulaDialect) -> Self {
        Self {
            dialect,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns `(template, origin)` for `formula`'s template hash. `origin`
    /// is the position `formula` was parsed at on first insertion of that
    /// hash — on a cache hit this is *not* `at`, since the returned `Arc`'s
    /// literal coordinates were fixed by whichever call inserted the entry.
    ///
    /// The hash is computed before any parsing happens; a hit returns the
    /// shared `Arc` straight from the map. Only a miss calls `parse` and
    /// pays for a full tokenize.
    pub fn get_or_parse(
        &self,
        formula: &str,
        at: RelativeCoord,
    ) -> Result<(Arc<ASTNode>, RelativeCoord), ParsingError> {
        let hash = text_template_hash(formula);
        if let Some(existing) = self.entries.read().unwrap().get(&hash) {
            return Ok((existing.ast.clone(), existing.origin));
        }
        let ast = parse(formula, self.dialect)?;
        let mut guard = self.entries.write().unwrap();
        let entry = guard.entry(hash).or_insert_with(|| Entry {
            ast: Arc::new(ast),
            origin: at,
        });
        Ok((entry.ast.clone(), entry.origin))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(FormulaDialect::default())
    }
}
