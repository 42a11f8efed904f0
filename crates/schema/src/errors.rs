use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Image dimensions must be non-zero (got {width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Grid must be {expected}x{expected}, got {rows}x{cols}")]
    GridShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Grid value {value} at ({row}, {col}) is outside [0, 1]")]
    GridValue { row: usize, col: usize, value: f32 },

    #[error("Probability {0} is outside [0, 1]")]
    Probability(f32),

    #[error("Invalid color '{0}': expected #rrggbb")]
    InvalidColor(String),
}
