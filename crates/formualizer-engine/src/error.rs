//! Programmer-facing failures from mutating engine calls. These are distinct
//! from `ExcelError` (section 7): a `GraphError`/`TransformError` means the
//! caller's request was malformed and nothing was mutated, whereas an
//! `ExcelError` is a perfectly legal outcome living inside a cell.

use formualizer_common::SheetId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("sheet {0} does not exist")]
    UnknownSheet(SheetId),
    #[error("matrix rectangle overlaps an existing matrix")]
    MatrixOverlap,
    #[error("matrix rectangle overlaps a non-empty cell")]
    MatrixOverlapsOccupiedCell,
    #[error("matrix vertex must cover at least one cell")]
    EmptyMatrixRectangle,
    #[error("range corners are not well-ordered")]
    InvalidRangeOrder,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("operation would split a matrix vertex")]
    WouldSplitMatrix,
    #[error("span is empty")]
    EmptySpan,
    #[error("source and destination rectangles differ in size")]
    SizeMismatch,
}
