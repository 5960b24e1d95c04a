//! C9: queue of pending structural transformations, applied to a formula
//! vertex's AST only when that vertex is next evaluated (not eagerly to
//! every formula in the workbook). Each vertex remembers the version it was
//! last brought current to; catching up means replaying every record newer
//! than that version, in order.

use std::sync::Arc;

use formualizer_common::{RelativeCoord, SheetId};
use formualizer_parse::parser::ASTNode;

use crate::sheet_mapping::SheetMapping;
use crate::transform::{transform_ast, TransformKind};

pub struct TransformRecord {
    pub version: u64,
    pub kind: TransformKind,
}

#[derive(Default)]
pub struct LazyTransformService {
    records: Vec<TransformRecord>,
    next_version: u64,
}

impl LazyTransformService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a transformation, returning the version it was stamped
    /// with. Vertices recorded at or above this version are already
    /// current; everything below needs to catch up before evaluation.
    pub fn enqueue(&mut self, kind: TransformKind) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        self.records.push(TransformRecord { version, kind });
        version
    }

    pub fn current_version(&self) -> u64 {
        self.next_version
    }

    fn pending_since(&self, version: u64) -> impl Iterator<Item = &TransformRecord> {
        self.records.iter().filter(move |r| r.version >= version)
    }

    /// Brings `template`/`origin` (a formula vertex's AST, at `vertex_version`)
    /// up to `current_version()`, rewriting every reference the pending
    /// records touch. `install_anchor` is the vertex's own address *at the
    /// moment its formula was installed* — a fixed point used once to
    /// rebase the (possibly shared) cached template onto this vertex's own
    /// coordinates; every following structural change is then applied on
    /// top via `transform_ast`, which works in absolute coordinates.
    ///
    /// Returns the possibly-forked tree, its new origin (`install_anchor`,
    /// since post-rebase coordinates are no longer relative to the
    /// template's original authoring cell), and the version the vertex is
    /// now current to. Returns the inputs unchanged if there was nothing to
    /// apply.
    ///
    /// `own_sheet` is the sheet the vertex itself lives on, used to resolve
    /// unqualified references when checking a pending record's sheet scope;
    /// `sheets` resolves an explicit `Sheet!` qualifier to the same id
    /// space. A record only rewrites references that resolve to its own
    /// target sheet — formulas on every other sheet pass through untouched.
    pub fn catch_up(
        &self,
        template: &Arc<ASTNode>,
        origin: RelativeCoord,
        install_anchor: RelativeCoord,
        vertex_version: u64,
        own_sheet: SheetId,
        sheets: &SheetMapping,
    ) -> (Arc<ASTNode>, RelativeCoord, u64) {
        let mut pending = self.pending_since(vertex_version).peekable();
        if pending.peek().is_none() && origin == install_anchor {
            return (template.clone(), origin, vertex_version);
        }
        // Rebase once onto the vertex's install-time address (a no-op if
        // already done by a prior catch_up), then replay pending structural
        // rewrites, which operate directly on absolute coordinates.
        let mut current = if origin == install_anchor {
            (**template).clone()
        } else {
            rebase_tree(template, origin, install_anchor)
        };
        for record in pending {
            current = transform_ast(&current, own_sheet, sheets, &record.kind);
        }
        (Arc::new(current), install_anchor, self.current_version())
    }
}

fn rebase_tree(node: &ASTNode, origin: RelativeCoord, target: RelativeCoord) -> ASTNode {
    use formualizer_parse::parser::{ASTNodeType, ReferenceType};
    let node_type = match &node.node_type {
        ASTNodeType::Reference(ReferenceType::Cell { sheet, coord }) => {
            ASTNodeType::Reference(ReferenceType::Cell {
                sheet: sheet.clone(),
                coord: coord.rebase(origin, target),
            })
        }
        ASTNodeType::Reference(ReferenceType::Range { sheet, start, end }) => {
            ASTNodeType::Reference(ReferenceType::Range {
                sheet: sheet.clone(),
                start: start.rebase(origin, target),
                end: end.rebase(origin, target),
            })
        }
        ASTNodeType::Reference(ReferenceType::Name(n)) => {
            ASTNodeType::Reference(ReferenceType::Name(n.clone()))
        }
        ASTNodeType::Literal(v) => ASTNodeType::Literal(v.clone()),
        ASTNodeType::EmptyArg => ASTNodeType::EmptyArg,
        ASTNodeType::UnaryOp { op, expr } => ASTNodeType::UnaryOp {
            op: op.clone(),
            expr: Box::new(rebase_tree(expr, origin, target)),
        },
        ASTNodeType::BinaryOp { op, left, right } => ASTNodeType::BinaryOp {
            op: op.clone(),
            left: Box::new(rebase_tree(left, origin, target)),
            right: Box::new(rebase_tree(right, origin, target)),
        },
        ASTNodeType::FunctionCall { name, args } => ASTNodeType::FunctionCall {
            name: name.clone(),
            args: args.iter().map(|a| rebase_tree(a, origin, target)).collect(),
        },
    };
    ASTNode {
        node_type,
        start: node.start,
        end: node.end,
    }
}
