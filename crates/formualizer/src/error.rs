use formualizer_engine::{GraphError, TransformError};
use thiserror::Error;

use crate::address_text::AddressError;

/// Everything a caller against the public surface can get back; wraps the
/// lower-level graph/transform errors and the address-text parser's.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("'{0}' names a range, not a single cell")]
    NotASingleCell(String),
}
