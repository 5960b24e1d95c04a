//! C6: the dependency graph. Owns the vertex arena and every mapping (C1-C4),
//! the template cache and lazy transform queue (C5/C9), and implements the
//! public mutation/query surface that drives everything else in this crate.
//! Structural operations run an *eager* bookkeeping pass here (address/range/
//! matrix mappings, edges keyed by stable `VertexId` so they survive it
//! untouched) and leave AST rewriting to the lazy queue, replayed per vertex
//! the next time it is actually evaluated.

use std::sync::Arc;

use formualizer_common::{CellRef, ExcelError, ExcelErrorKind, LiteralValue, RangeRef, SheetId};
use formualizer_parse::parser::{ASTNode, ASTNodeType};
use formualizer_parse::{FormulaDialect, ParseCache};
use rustc_hash::FxHashSet;

use crate::absolutize::{absolutize_dependencies, anchor_of};
use crate::error::{GraphError, TransformError};
use crate::evaluator::{eval_node, CellResolver};
use crate::function_library::FunctionLibrary;
use crate::lazy_transform::LazyTransformService;
use crate::matrix_mapping::MatrixMapping;
use crate::range_mapping::RangeMapping;
use crate::scheduler::{build_schedule, Schedule};
use crate::sheet_mapping::SheetMapping;
use crate::transform::TransformKind;
use crate::vertex::{AbsRef, FormulaData, MatrixData, MatrixKind, Vertex, VertexId, VertexKind};
use crate::address_mapping::AddressMapping;

/// The dependency graph: every cell, interned range, and matrix the engine
/// knows about, plus the template cache and structural-change queue that
/// bind formula vertices to their source text.
pub struct DependencyGraph {
    cache: ParseCache,
    transforms: LazyTransformService,
    vertices: Vec<Vertex>,
    address: AddressMapping,
    ranges: RangeMapping,
    matrices: MatrixMapping,
    pub sheets: SheetMapping,
    /// Vertices a mutation directly touched; `recompute` expands this to the
    /// full transitive consumer closure via the scheduler. Volatile formulas
    /// are added to every recompute's seed set regardless of dirtiness.
    dirty: FxHashSet<VertexId>,
}

impl DependencyGraph {
    pub fn new(dialect: FormulaDialect) -> Self {
        Self {
            cache: ParseCache::new(dialect),
            transforms: LazyTransformService::new(),
            vertices: Vec::new(),
            address: AddressMapping::new(),
            ranges: RangeMapping::new(),
            matrices: MatrixMapping::new(),
            sheets: SheetMapping::new(),
            dirty: FxHashSet::default(),
        }
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0 as usize)
    }

    fn alloc(&mut self, vertex: Vertex) -> VertexId {
        let id = VertexId(self.vertices.len() as u32);
        self.vertices.push(vertex);
        id
    }

    fn add_edge(&mut self, consumer: VertexId, producer: VertexId) {
        self.vertices[producer.0 as usize].dependents.insert(consumer);
        self.vertices[consumer.0 as usize].depends_on.insert(producer);
    }

    // ---- vertex lookup / creation -----------------------------------

    fn get_or_create_cell_vertex(&mut self, addr: CellRef) -> VertexId {
        if let Some(id) = self.address.get(addr) {
            return id;
        }
        let id = self.alloc(Vertex::new_empty(VertexId(0), addr));
        self.vertices[id.0 as usize].id = id;
        self.address.set(addr, id);
        id
    }

    /// The producer for a single-cell dependency: a covering matrix if one
    /// exists, otherwise the cell's own (possibly freshly created) vertex.
    fn producer_for_cell(&mut self, cell: CellRef) -> VertexId {
        if let Some(mid) = self.matrices.covering(cell) {
            return mid;
        }
        self.get_or_create_cell_vertex(cell)
    }

    fn get_or_create_range_vertex(&mut self, range: RangeRef) -> VertexId {
        if let Some(id) = self.ranges.get(&range) {
            return id;
        }
        let id = self.alloc(Vertex::new_range(VertexId(0), range));
        self.vertices[id.0 as usize].id = id;
        self.ranges.intern(range, id);
        let producers: Vec<VertexId> = range.cells().map(|c| self.producer_for_cell(c)).collect();
        for p in producers {
            self.add_edge(id, p);
        }
        id
    }

    fn producer_for(&self, dep: &AbsRef) -> Option<VertexId> {
        match dep {
            AbsRef::Cell(c) => self.matrices.covering(*c).or_else(|| self.address.get(*c)),
            AbsRef::Range(r) => self.ranges.get(r),
        }
    }

    /// Wires `consumer`'s edges to every dependency in `deps`, creating
    /// producer vertices (cell or interned range) as needed. Idempotent:
    /// an already-wired dependency is a no-op.
    fn process_cell_dependencies(&mut self, deps: &[AbsRef], consumer: VertexId) {
        for dep in deps {
            let producer = match dep {
                AbsRef::Cell(c) => self.producer_for_cell(*c),
                AbsRef::Range(r) => self.get_or_create_range_vertex(*r),
            };
            self.add_edge(consumer, producer);
        }
    }

    /// Removes every outgoing edge from `id` (used when a vertex is
    /// converted to a kind with different or no dependencies).
    fn clear_out_edges(&mut self, id: VertexId) {
        let producers: Vec<VertexId> = self.vertices[id.0 as usize].depends_on.iter().copied().collect();
        for p in producers {
            if let Some(pv) = self.vertices.get_mut(p.0 as usize) {
                pv.dependents.remove(&id);
            }
        }
        self.vertices[id.0 as usize].depends_on.clear();
    }

    /// Drops every incoming and outgoing edge from `id` and converts it to
    /// `Empty`; every former dependent is marked dirty since its producer is
    /// now gone (its own AST will resolve to `Error(ref)` the next time it's
    /// caught up).
    fn detach_vertex(&mut self, id: VertexId) {
        self.clear_out_edges(id);
        let dependents: Vec<VertexId> = self.vertices[id.0 as usize].dependents.iter().copied().collect();
        self.vertices[id.0 as usize].kind = VertexKind::Empty;
        self.vertices[id.0 as usize].addr = None;
        for d in dependents {
            self.dirty.insert(d);
        }
    }

    fn matrix_guard(&self, addr: CellRef) -> Result<(), GraphError> {
        if self.matrices.covering(addr).is_some() {
            return Err(GraphError::MatrixOverlapsOccupiedCell);
        }
        Ok(())
    }

    // ---- single-cell mutations ----------------------------------------

    pub fn set_value_to_cell(&mut self, addr: CellRef, value: LiteralValue) -> Result<VertexId, GraphError> {
        self.matrix_guard(addr)?;
        let id = self.get_or_create_cell_vertex(addr);
        self.clear_out_edges(id);
        self.vertices[id.0 as usize].kind = VertexKind::Value(value);
        self.dirty.insert(id);
        Ok(id)
    }

    pub fn set_cell_empty(&mut self, addr: CellRef) -> Result<VertexId, GraphError> {
        self.matrix_guard(addr)?;
        let id = self.get_or_create_cell_vertex(addr);
        self.clear_out_edges(id);
        self.vertices[id.0 as usize].kind = VertexKind::Empty;
        self.dirty.insert(id);
        Ok(id)
    }

    /// Parses (or reuses a cached template for) `formula_text`, installs it
    /// at `addr`, and wires its dependency edges. A formula that fails to
    /// parse still installs — as a literal `Error(parse)` vertex with no
    /// dependencies, matching the rule that a bad formula is a legal (if
    /// useless) cell value, not a rejected mutation.
    pub fn set_formula_to_cell(
        &mut self,
        addr: CellRef,
        formula_text: &str,
        library: &dyn FunctionLibrary,
    ) -> Result<VertexId, GraphError> {
        self.matrix_guard(addr)?;
        let own_anchor = anchor_of(addr);
        let (template, cache_origin) = match self.cache.get_or_parse(formula_text, own_anchor) {
            Ok(pair) => pair,
            Err(_) => {
                let err_ast = Arc::new(ASTNode {
                    node_type: ASTNodeType::Literal(LiteralValue::Error(ExcelError::new(ExcelErrorKind::Parse))),
                    start: 0,
                    end: 0,
                });
                (err_ast, own_anchor)
            }
        };
        let deps = absolutize_dependencies(&template, cache_origin, addr, &mut self.sheets);
        let mut volatile = false;
        let mut structural = false;
        for name in function_call_names(&template) {
            let traits = library.traits(&name);
            volatile |= traits.volatile;
            structural |= traits.structural;
        }

        let id = self.get_or_create_cell_vertex(addr);
        self.clear_out_edges(id);
        self.vertices[id.0 as usize].kind = VertexKind::Formula(FormulaData {
            template,
            origin: cache_origin,
            install_anchor: own_anchor,
            deps: deps.clone(),
            volatile,
            structural,
            cached_value: LiteralValue::Empty,
            version: self.transforms.current_version(),
        });
        self.process_cell_dependencies(&deps, id);
        self.dirty.insert(id);
        Ok(id)
    }

    // ---- matrices -------------------------------------------------------

    pub fn add_new_matrix_vertex(&mut self, rect: RangeRef, kind: MatrixKind) -> Result<VertexId, GraphError> {
        if self.matrices.overlaps(&rect) {
            return Err(GraphError::MatrixOverlap);
        }
        for cell in rect.cells() {
            if let Some(existing) = self.address.get(cell) {
                if !matches!(self.vertices[existing.0 as usize].kind, VertexKind::Empty) {
                    return Err(GraphError::MatrixOverlapsOccupiedCell);
                }
            }
        }
        let deps = match &kind {
            MatrixKind::Formula { deps, .. } => deps.clone(),
            MatrixKind::Numeric(_) => Vec::new(),
        };
        let top_left = rect.top_left();
        let id = self.alloc(Vertex {
            id: VertexId(0),
            addr: Some(top_left),
            kind: VertexKind::Matrix(MatrixData { rect, kind }),
            depends_on: FxHashSet::default(),
            dependents: FxHashSet::default(),
        });
        self.vertices[id.0 as usize].id = id;
        for cell in rect.cells().skip(1) {
            if let Some(old) = self.address.remove(cell) {
                self.detach_vertex(old);
            }
        }
        self.address.set(top_left, id);
        self.matrices.insert(rect, id);
        self.process_cell_dependencies(&deps, id);
        self.dirty.insert(id);
        Ok(id)
    }

    pub fn set_matrix_formula(
        &mut self,
        rect: RangeRef,
        formula_text: &str,
        library: &dyn FunctionLibrary,
    ) -> Result<VertexId, GraphError> {
        let own_anchor = anchor_of(rect.top_left());
        let (template, cache_origin) = self
            .cache
            .get_or_parse(formula_text, own_anchor)
            .map_err(|_| GraphError::EmptyMatrixRectangle)?;
        let deps = absolutize_dependencies(&template, cache_origin, rect.top_left(), &mut self.sheets);
        let _ = library;
        self.add_new_matrix_vertex(
            rect,
            MatrixKind::Formula {
                template,
                origin: cache_origin,
                install_anchor: own_anchor,
                deps,
                cached: Vec::new(),
                version: self.transforms.current_version(),
            },
        )
    }

    pub fn set_matrix_numeric(&mut self, rect: RangeRef, values: Vec<Vec<f64>>) -> Result<VertexId, GraphError> {
        self.add_new_matrix_vertex(rect, MatrixKind::Numeric(values))
    }

    // ---- structural ops: rows/columns -----------------------------------

    fn matrix_blocks_row_insert(&self, sheet: SheetId, row_start: u32) -> bool {
        self.matrices
            .on_sheet(sheet)
            .any(|(r, _)| r.start.row() < row_start && row_start <= r.end.row())
    }

    fn matrix_blocks_row_remove(&self, sheet: SheetId, row_start: u32, row_end: u32) -> bool {
        self.matrices
            .on_sheet(sheet)
            .any(|(r, _)| r.start.row() <= row_end && row_start <= r.end.row())
    }

    fn matrix_blocks_col_insert(&self, sheet: SheetId, col_start: u32) -> bool {
        self.matrices
            .on_sheet(sheet)
            .any(|(r, _)| r.start.col() < col_start && col_start <= r.end.col())
    }

    fn matrix_blocks_col_remove(&self, sheet: SheetId, col_start: u32, col_end: u32) -> bool {
        self.matrices
            .on_sheet(sheet)
            .any(|(r, _)| r.start.col() <= col_end && col_start <= r.end.col())
    }

    /// Re-keys every interned range on `sheet` whose rectangle the transform
    /// touches, and rebuilds that range vertex's producer edges from scratch
    /// against its new rectangle (simpler, and just as correct in the final
    /// state, as diffing the cell set that entered or left).
    fn rekey_ranges(&mut self, sheet: SheetId, kind: &TransformKind) {
        let affected: Vec<(RangeRef, VertexId)> = self
            .ranges
            .iter()
            .filter(|(r, _)| r.sheet == sheet)
            .map(|(r, id)| (*r, *id))
            .collect();
        for (old, id) in affected {
            match crate::transform::transform_rect(old, kind) {
                Some(new) if new != old => {
                    self.ranges.rekey(&old, new);
                    self.rebuild_range_edges(id, new);
                }
                Some(_) => {}
                None => {
                    self.ranges.remove(&old);
                }
            }
        }
    }

    fn rebuild_range_edges(&mut self, id: VertexId, rect: RangeRef) {
        self.clear_out_edges(id);
        let producers: Vec<VertexId> = rect.cells().map(|c| self.producer_for_cell(c)).collect();
        for p in producers {
            self.add_edge(id, p);
        }
    }

    /// Matrices whose rect the eager pass moved; only their `MatrixData.rect`
    /// needs updating (the top-left's `AddressMapping` slot already moved
    /// along with every other vertex via `shift_rows`/`shift_columns`).
    fn rekey_matrices(&mut self, sheet: SheetId, kind: &TransformKind) {
        let affected: Vec<(RangeRef, VertexId)> = self.matrices.on_sheet(sheet).map(|(r, id)| (*r, *id)).collect();
        for (old, id) in affected {
            if let Some(new) = crate::transform::transform_rect(old, kind) {
                if new != old {
                    self.matrices.rekey(&old, new, id);
                    if let VertexKind::Matrix(m) = &mut self.vertices[id.0 as usize].kind {
                        m.rect = new;
                    }
                }
            }
        }
    }

    fn mark_structural_dirty(&mut self, sheet: SheetId) {
        let ids: Vec<VertexId> = self
            .vertices
            .iter()
            .filter(|v| v.addr.map(|a| a.sheet) == Some(sheet))
            .filter(|v| match &v.kind {
                VertexKind::Formula(f) => f.structural,
                VertexKind::Matrix(m) => matches!(&m.kind, MatrixKind::Formula { .. }),
                _ => false,
            })
            .map(|v| v.id)
            .collect();
        for id in ids {
            self.dirty.insert(id);
        }
    }

    pub fn add_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) -> Result<(), TransformError> {
        if count == 0 {
            return Err(TransformError::EmptySpan);
        }
        if self.matrix_blocks_row_insert(sheet, row_start) {
            return Err(TransformError::WouldSplitMatrix);
        }
        let kind = TransformKind::AddRows { sheet, row_start, count };
        self.address.shift_rows(sheet, row_start, count as i64);
        self.rekey_ranges(sheet, &kind);
        self.rekey_matrices(sheet, &kind);
        self.mark_structural_dirty(sheet);
        self.transforms.enqueue(kind);
        Ok(())
    }

    pub fn remove_rows(&mut self, sheet: SheetId, row_start: u32, row_end: u32) -> Result<(), TransformError> {
        if row_end < row_start {
            return Err(TransformError::EmptySpan);
        }
        if self.matrix_blocks_row_remove(sheet, row_start, row_end) {
            return Err(TransformError::WouldSplitMatrix);
        }
        let count = row_end - row_start + 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(sheet, row_start, row_end, "remove_rows");
        let kind = TransformKind::RemoveRows { sheet, row_start, row_end };
        let victims = self.address.cells_in_row_span(sheet, row_start, row_end);
        for (cell, id) in victims {
            self.address.remove(cell);
            self.detach_vertex(id);
        }
        self.address.shift_rows(sheet, row_end + 1, -(count as i64));
        self.rekey_ranges(sheet, &kind);
        self.rekey_matrices(sheet, &kind);
        self.mark_structural_dirty(sheet);
        self.transforms.enqueue(kind);
        Ok(())
    }

    pub fn add_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) -> Result<(), TransformError> {
        if count == 0 {
            return Err(TransformError::EmptySpan);
        }
        if self.matrix_blocks_col_insert(sheet, col_start) {
            return Err(TransformError::WouldSplitMatrix);
        }
        let kind = TransformKind::AddColumns { sheet, col_start, count };
        self.address.shift_columns(sheet, col_start, count as i64);
        self.rekey_ranges(sheet, &kind);
        self.rekey_matrices(sheet, &kind);
        self.mark_structural_dirty(sheet);
        self.transforms.enqueue(kind);
        Ok(())
    }

    pub fn remove_columns(&mut self, sheet: SheetId, col_start: u32, col_end: u32) -> Result<(), TransformError> {
        if col_end < col_start {
            return Err(TransformError::EmptySpan);
        }
        if self.matrix_blocks_col_remove(sheet, col_start, col_end) {
            return Err(TransformError::WouldSplitMatrix);
        }
        let count = col_end - col_start + 1;
        let kind = TransformKind::RemoveColumns { sheet, col_start, col_end };
        let victims = self.address.cells_in_col_span(sheet, col_start, col_end);
        for (cell, id) in victims {
            self.address.remove(cell);
            self.detach_vertex(id);
        }
        self.address.shift_columns(sheet, col_end + 1, -(count as i64));
        self.rekey_ranges(sheet, &kind);
        self.rekey_matrices(sheet, &kind);
        self.mark_structural_dirty(sheet);
        self.transforms.enqueue(kind);
        Ok(())
    }

    // ---- structural ops: move -------------------------------------------

    pub fn move_cells(
        &mut self,
        source: RangeRef,
        d_row: i64,
        d_col: i64,
        d_sheet: SheetId,
    ) -> Result<(), TransformError> {
        if d_row == 0 && d_col == 0 && d_sheet == source.sheet {
            return Ok(());
        }
        if self.matrices.overlaps(&source) {
            return Err(TransformError::WouldSplitMatrix);
        }
        let dest = RangeRef::new(
            d_sheet,
            source.start.translate(d_row, d_col),
            source.end.translate(d_row, d_col),
        );
        if self.matrices.overlaps(&dest) {
            return Err(TransformError::WouldSplitMatrix);
        }

        let moves: Vec<(CellRef, CellRef, Option<VertexId>)> = source
            .cells()
            .map(|src| {
                let dst = CellRef::new(d_sheet, src.coord.translate(d_row, d_col));
                (src, dst, self.address.get(src))
            })
            .collect();

        // Phase 1: clear every mapping this op touches before writing
        // anything, so overlapping source/destination rectangles can't
        // clobber a not-yet-moved vertex.
        for (src, dst, maybe_id) in &moves {
            if let Some(old) = self.address.remove(*dst) {
                if Some(old) != *maybe_id {
                    self.detach_vertex(old);
                }
            }
            self.address.remove(*src);
        }
        // Phase 2: write the moved vertices into their destinations.
        for (src, dst, maybe_id) in moves {
            if let Some(id) = maybe_id {
                let src_anchor = anchor_of(src);
                let dst_anchor = anchor_of(dst);
                if let VertexKind::Formula(f) = &mut self.vertices[id.0 as usize].kind {
                    // Re-open the rebase requirement: the next catch_up will
                    // rebase relative references from the old anchor onto
                    // the new one, exactly like a first-install rebase.
                    f.origin = src_anchor;
                    f.install_anchor = dst_anchor;
                }
                self.vertices[id.0 as usize].addr = Some(dst);
                self.address.set(dst, id);
                self.dirty.insert(id);
            }
        }

        let kind = TransformKind::Move {
            source,
            d_row,
            d_col,
            d_sheet,
        };
        self.rekey_ranges(source.sheet, &kind);
        self.transforms.enqueue(kind);
        Ok(())
    }

    // ---- queries ----------------------------------------------------------

    pub fn get_cell_value(&self, addr: CellRef) -> LiteralValue {
        if let Some(mid) = self.matrices.covering(addr) {
            if let Some(VertexKind::Matrix(m)) = self.vertices.get(mid.0 as usize).map(|v| &v.kind) {
                let row = (addr.row() - m.rect.start.row()) as usize;
                let col = (addr.col() - m.rect.start.col()) as usize;
                return match &m.kind {
                    MatrixKind::Formula { cached, .. } => {
                        cached.get(row).and_then(|r| r.get(col)).cloned().unwrap_or(LiteralValue::Empty)
                    }
                    MatrixKind::Numeric(rows) => rows
                        .get(row)
                        .and_then(|r| r.get(col))
                        .map(|n| LiteralValue::Number(*n))
                        .unwrap_or(LiteralValue::Empty),
                };
            }
        }
        match self.address.get(addr) {
            Some(id) => self.vertices[id.0 as usize].value(),
            None => LiteralValue::Empty,
        }
    }

    /// `(rows, cols)` a sheet's occupied cells span, counting matrix
    /// rectangles even though their interior cells aren't individually
    /// addressed. `(0, 0)` for an empty or unknown sheet.
    pub fn sheet_extent(&self, sheet: SheetId) -> (u32, u32) {
        let mut rows = 0u32;
        let mut cols = 0u32;
        for (cell, _) in self.address.all_cells(sheet) {
            rows = rows.max(cell.row() + 1);
            cols = cols.max(cell.col() + 1);
        }
        for (rect, _) in self.matrices.on_sheet(sheet) {
            rows = rows.max(rect.end.row() + 1);
            cols = cols.max(rect.end.col() + 1);
        }
        (rows, cols)
    }

    pub fn vertices_to_recompute(&self) -> Vec<VertexId> {
        let mut v: Vec<VertexId> = self.dirty.iter().copied().collect();
        v.sort();
        v
    }

    /// Idempotent: clearing an already-empty dirty set is a no-op, not an
    /// error (section 8's resolved open question).
    pub fn clear_recently_changed_vertices(&mut self) {
        self.dirty.clear();
    }

    // ---- recompute ----------------------------------------------------------

    /// Brings every dirty (or volatile) vertex's formula template up to date
    /// and re-evaluates the transitive closure of their consumers, in
    /// topological order. Vertices caught in a cycle get `Error(Cycle)`
    /// instead of being evaluated.
    pub fn recompute(&mut self, library: &dyn FunctionLibrary) -> Schedule {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("recompute", dirty = self.dirty.len()).entered();
        let mut seeds = self.vertices_to_recompute();
        for v in &self.vertices {
            if let VertexKind::Formula(f) = &v.kind {
                if f.volatile {
                    seeds.push(v.id);
                }
            }
        }
        seeds.sort();
        seeds.dedup();
        if seeds.is_empty() {
            return Schedule {
                layers: Vec::new(),
                cycles: Vec::new(),
            };
        }
        let schedule = build_schedule(self, &seeds);
        #[cfg(feature = "tracing")]
        if !schedule.cycles.is_empty() {
            tracing::warn!(cycles = schedule.cycles.len(), "dependency cycle detected");
        }
        for cycle in &schedule.cycles {
            for &id in cycle {
                self.write_cycle_error(id);
            }
        }
        for layer in &schedule.layers {
            for &id in &layer.vertices {
                self.catch_up_and_eval(id, library);
            }
        }
        self.dirty.clear();
        schedule
    }

    fn write_cycle_error(&mut self, id: VertexId) {
        let err = LiteralValue::Error(ExcelError::new(ExcelErrorKind::Cycle));
        match &mut self.vertices[id.0 as usize].kind {
            VertexKind::Formula(f) => f.cached_value = err,
            VertexKind::Matrix(m) => {
                if let MatrixKind::Formula { cached, .. } = &mut m.kind {
                    let (h, w) = (m.rect.height() as usize, m.rect.width() as usize);
                    *cached = vec![vec![err.clone(); w]; h];
                }
            }
            _ => {}
        }
    }

    fn rebind_formula_edges(&mut self, id: VertexId, old_deps: &[AbsRef], new_deps: &[AbsRef]) {
        if old_deps == new_deps {
            return;
        }
        for dep in old_deps {
            if !new_deps.contains(dep) {
                if let Some(producer) = self.producer_for(dep) {
                    if let Some(pv) = self.vertices.get_mut(producer.0 as usize) {
                        pv.dependents.remove(&id);
                    }
                    self.vertices[id.0 as usize].depends_on.remove(&producer);
                }
            }
        }
        let fresh: Vec<AbsRef> = new_deps.iter().filter(|d| !old_deps.contains(d)).copied().collect();
        self.process_cell_dependencies(&fresh, id);
    }

    fn catch_up_and_eval(&mut self, id: VertexId, library: &dyn FunctionLibrary) {
        let Some(vertex) = self.vertices.get(id.0 as usize) else {
            return;
        };
        match &vertex.kind {
            VertexKind::Formula(f) => {
                let own_cell = vertex.addr.expect("formula vertex is always addressed");
                let (template, origin, version) = self.transforms.catch_up(
                    &f.template,
                    f.origin,
                    f.install_anchor,
                    f.version,
                    own_cell.sheet,
                    &self.sheets,
                );
                let old_deps = f.deps.clone();
                let new_deps = absolutize_dependencies(&template, origin, own_cell, &mut self.sheets);
                self.rebind_formula_edges(id, &old_deps, &new_deps);
                let value = {
                    let resolver = GraphResolver(self);
                    eval_node(&template, own_cell.sheet, &resolver, library)
                };
                if let VertexKind::Formula(f) = &mut self.vertices[id.0 as usize].kind {
                    f.template = template;
                    f.origin = origin;
                    f.version = version;
                    f.deps = new_deps;
                    f.cached_value = value;
                }
            }
            VertexKind::Matrix(_) => self.eval_matrix_vertex(id, library),
            _ => {}
        }
    }

    fn eval_matrix_vertex(&mut self, id: VertexId, library: &dyn FunctionLibrary) {
        let Some(vertex) = self.vertices.get(id.0 as usize) else {
            return;
        };
        let VertexKind::Matrix(m) = &vertex.kind else {
            return;
        };
        let MatrixKind::Formula {
            template,
            origin,
            install_anchor,
            deps,
            version,
            ..
        } = &m.kind
        else {
            return;
        };
        let own_cell = m.rect.top_left();
        let (template, new_origin, new_version) = self.transforms.catch_up(
            template,
            *origin,
            *install_anchor,
            *version,
            own_cell.sheet,
            &self.sheets,
        );
        let old_deps = deps.clone();
        let new_deps = absolutize_dependencies(&template, new_origin, own_cell, &mut self.sheets);
        self.rebind_formula_edges(id, &old_deps, &new_deps);
        let value = {
            let resolver = GraphResolver(self);
            eval_node(&template, own_cell.sheet, &resolver, library)
        };
        let (height, width) = (m.rect.height() as usize, m.rect.width() as usize);
        let grid = match value {
            LiteralValue::Array(rows) => rows,
            other => vec![vec![other; width]; height],
        };
        if let VertexKind::Matrix(m) = &mut self.vertices[id.0 as usize].kind {
            if let MatrixKind::Formula {
                template: t,
                origin: o,
                version: v,
                deps: d,
                cached,
                ..
            } = &mut m.kind
            {
                *t = template;
                *o = new_origin;
                *v = new_version;
                *d = new_deps;
                *cached = grid;
            }
        }
    }
}

fn function_call_names(node: &ASTNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_function_call_names(node, &mut out);
    out
}

fn collect_function_call_names(node: &ASTNode, out: &mut Vec<String>) {
    match &node.node_type {
        ASTNodeType::FunctionCall { name, args } => {
            out.push(name.clone());
            for a in args {
                collect_function_call_names(a, out);
            }
        }
        ASTNodeType::UnaryOp { expr, .. } => collect_function_call_names(expr, out),
        ASTNodeType::BinaryOp { left, right, .. } => {
            collect_function_call_names(left, out);
            collect_function_call_names(right, out);
        }
        _ => {}
    }
}

/// Read-only view of the graph handed to the evaluator while a vertex's new
/// value is being computed; borrowed immutably and dropped before the
/// caller writes the result back.
struct GraphResolver<'g>(&'g DependencyGraph);

impl<'g> CellResolver for GraphResolver<'g> {
    fn cell_value(&self, cell: CellRef) -> LiteralValue {
        self.0.get_cell_value(cell)
    }

    fn range_values(&self, range: RangeRef) -> Vec<Vec<LiteralValue>> {
        (range.start.row()..=range.end.row())
            .map(|row| {
                (range.start.col()..=range.end.col())
                    .map(|col| self.0.get_cell_value(CellRef::from_rc(range.sheet, row, col)))
                    .collect()
            })
            .collect()
    }

    fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        self.0.sheets.resolve(name)
    }
}
