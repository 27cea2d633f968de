/// Errors raised while building or querying a [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// A catalog must hold at least one scenario.
    #[error("catalog contains no scenarios")]
    Empty,

    /// Two entries share the same scenario id.
    #[error("scenario '{id}' is defined more than once")]
    DuplicateId { id: String },

    /// The rating scale is empty or inverted.
    #[error("scenario '{id}' has an invalid scale: min {min} must be below max {max}")]
    InvalidScale { id: String, min: i32, max: i32 },

    /// A raw id did not name any known scenario.
    #[error("unknown scenario '{raw}'")]
    UnknownScenario { raw: String },
}
