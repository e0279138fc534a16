/// Errors raised by the document model core.
///
/// Every variant signals misuse by the caller (wrong arguments, use after
/// destroy). None of these are caught internally; they propagate straight to
/// the call site. Transforming a dangling position is *not* an error; the
/// deletion transform returns `None` for "this anchor no longer exists".
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("position root must be an element or document fragment")]
    PositionRootInvalid,
    #[error("position path must be a non-empty list of offsets")]
    PositionPathIncorrectFormat,
    #[error("position path does not resolve to an element parent: {path:?}")]
    PositionPathIncorrect { path: Vec<usize> },
    #[error("an offset or placement is required to create a position at a node")]
    PositionCreateAtOffsetRequired,
    #[error("position parent must be an element or document fragment")]
    PositionParentIncorrect,
    #[error("cannot create a position before a root")]
    PositionBeforeRoot,
    #[error("cannot create a position after a root")]
    PositionAfterRoot,
    #[error("cannot deserialize position: unknown root '{root}'")]
    PositionFromJsonNoRoot { root: String },
    #[error("tree walker requires boundaries or a start position")]
    NoStartPosition,
    #[error("unknown tree walker direction '{direction}', expected 'forward' or 'backward'")]
    UnknownDirection { direction: String },
    #[error("marker name cannot contain a comma: '{name}'")]
    IncorrectMarkerName { name: String },
    #[error("cannot refresh marker '{name}': no such marker")]
    RefreshMarkerNotExists { name: String },
    #[error("marker '{name}' was destroyed and cannot be used")]
    MarkerDestroyed { name: String },
    #[error("offset {offset} is out of bounds, parent max offset is {max}")]
    OffsetOutOfBounds { offset: usize, max: usize },
    #[error("move target lies inside the moved range")]
    MoveTargetInsideMovedRange,
    #[error("range must start and end in the same parent")]
    RangeNotFlat,
    #[error("operation positions must be anchored in this document's tree")]
    OperationRootMissing,
    #[error("cannot split or merge at the root level")]
    OperationAtRootLevel,
}
