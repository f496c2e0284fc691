use thiserror::Error;

/// Rejected [`LayoutOptions`](crate::LayoutOptions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An additional field has an empty key.
    #[error("additional field #{index} has an empty key")]
    EmptyAdditionalFieldKey {
        /// Position of the field in `additional_fields`.
        index: usize,
    },
    /// A top-level label name is empty.
    #[error("top-level label #{index} is empty")]
    EmptyTopLevelLabel {
        /// Position of the label in `top_level_labels`.
        index: usize,
    },
}

/// Failure to hand a finished document to its destination.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The destination writer failed.
    #[error("failed to write ECS document")]
    Io(#[from] std::io::Error),
}
