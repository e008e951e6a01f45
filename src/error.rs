use crate::grid::{Axis, CellAddress};
use std::fmt;

#[derive(Debug)]
pub enum GridFlowError {
    InvalidSpan {
        address: CellAddress,
        col_span: usize,
        row_span: usize,
        reason: &'static str,
    },
    OutOfBounds {
        axis: Axis,
        index: usize,
        len: usize,
    },
    IncrementalBuildNotStarted {
        axis: Axis,
    },
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for GridFlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridFlowError::InvalidSpan {
                address,
                col_span,
                row_span,
                reason,
            } => write!(
                f,
                "invalid span {}x{} at {}: {}",
                col_span, row_span, address, reason
            ),
            GridFlowError::OutOfBounds { axis, index, len } => {
                write!(f, "{} index {} out of bounds (len {})", axis.name(), index, len)
            }
            GridFlowError::IncrementalBuildNotStarted { axis } => write!(
                f,
                "incremental build not started: emit a {} before printing the other axis",
                axis.item_name()
            ),
            GridFlowError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            GridFlowError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for GridFlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GridFlowError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GridFlowError {
    fn from(value: std::io::Error) -> Self {
        GridFlowError::Io(value)
    }
}
