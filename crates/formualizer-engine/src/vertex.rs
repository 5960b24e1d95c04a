//! Vertex arena: every cell, interned range, and matrix the graph knows about
//! is one slot in a `Vec<Vertex>`, addressed by a stable `VertexId`. A
//! structural op that "converts" a cell (e.g. value -> formula) replaces the
//! `kind` in place rather than allocating a new id, so incoming edges survive
//! the conversion untouched.

use std::sync::Arc;

use formualizer_common::{CellRef, LiteralValue, RangeRef, RelativeCoord};
use formualizer_parse::ASTNode;
use rustc_hash::FxHashSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

/// A reference a formula vertex carries after absolutization: either a
/// single concrete cell or a concrete range on one sheet. The parser only
/// gives us `ReferenceType::Name` too, but an unresolved named range becomes
/// an `Error(name)` literal at absolutization time, never reaches here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsRef {
    Cell(CellRef),
    Range(RangeRef),
}

#[derive(Debug, Clone)]
pub struct FormulaData {
    pub template: Arc<ASTNode>,
    /// The coordinate `template`'s relative references are currently
    /// expressed against. Starts as the parse cache's origin for the shared
    /// template; collapses to `install_anchor` the first time `catch_up`
    /// runs for this vertex, and stays there afterwards.
    pub origin: RelativeCoord,
    /// This vertex's own address at the moment the formula was installed,
    /// fixed for the vertex's lifetime (moved only by an explicit relocation
    /// of the cell itself, e.g. `move_cells`).
    pub install_anchor: RelativeCoord,
    pub deps: Vec<AbsRef>,
    pub volatile: bool,
    pub structural: bool,
    pub cached_value: LiteralValue,
    /// Version this vertex's `template` was last rewritten to by the lazy
    /// transform service; compared against the service's current version at
    /// evaluation time.
    pub version: u64,
}

#[derive(Debug, Clone)]
pub enum MatrixKind {
    Formula {
        template: Arc<ASTNode>,
        origin: RelativeCoord,
        install_anchor: RelativeCoord,
        deps: Vec<AbsRef>,
        cached: Vec<Vec<LiteralValue>>,
        version: u64,
    },
    Numeric(Vec<Vec<f64>>),
}

#[derive(Debug, Clone)]
pub struct MatrixData {
    pub rect: RangeRef,
    pub kind: MatrixKind,
}

#[derive(Debug, Clone)]
pub enum VertexKind {
    Empty,
    Value(LiteralValue),
    Formula(FormulaData),
    /// Interned range vertex: exists purely to bound fan-out (4.3 edge
    /// policy), carries no value of its own.
    Range(RangeRef),
    Matrix(MatrixData),
}

impl VertexKind {
    pub fn is_matrix(&self) -> bool {
        matches!(self, VertexKind::Matrix(_))
    }

    pub fn is_range(&self) -> bool {
        matches!(self, VertexKind::Range(_))
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    /// `None` for range/matrix vertices that aren't keyed by a single cell
    /// address in `AddressMapping` (ranges never are; matrices are keyed by
    /// their top-left cell only).
    pub addr: Option<CellRef>,
    pub kind: VertexKind,
    /// Vertices this one reads from (producers).
    pub depends_on: FxHashSet<VertexId>,
    /// Vertices that read from this one (consumers); the set walked when
    /// propagating dirtiness.
    pub dependents: FxHashSet<VertexId>,
}

impl Vertex {
    pub fn new_empty(id: VertexId, addr: CellRef) -> Self {
        Self {
            id,
            addr: Some(addr),
            kind: VertexKind::Empty,
            depends_on: FxHashSet::default(),
            dependents: FxHashSet::default(),
        }
    }

    pub fn new_range(id: VertexId, rect: RangeRef) -> Self {
        Self {
            id,
            addr: None,
            kind: VertexKind::Range(rect),
            depends_on: FxHashSet::default(),
            dependents: FxHashSet::default(),
        }
    }

    pub fn value(&self) -> LiteralValue {
        match &self.kind {
            VertexKind::Empty => LiteralValue::Empty,
            VertexKind::Value(v) => v.clone(),
            VertexKind::Formula(f) => f.cached_value.clone(),
            VertexKind::Range(_) => LiteralValue::Empty,
            VertexKind::Matrix(m) => match &m.kind {
                MatrixKind::Formula { cached, .. } => LiteralValue::Array(cached.clone()),
                MatrixKind::Numeric(rows) => LiteralValue::Array(
                    rows.iter()
                        .map(|row| row.iter().map(|n| LiteralValue::Number(*n)).collect())
                        .collect(),
                ),
            },
        }
    }
}
