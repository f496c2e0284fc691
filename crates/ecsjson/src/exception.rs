//! Error details serialized as the ECS `error.*` fields.
use std::{borrow::Cow, error::Error, fmt::Write as _};

/// How `error.stack_trace` is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Deserialize))]
#[cfg_attr(any(test, feature = "serde"), serde(rename_all = "snake_case"))]
pub enum StackTraceFormat {
    /// One JSON string, lines separated by `\n`.
    #[default]
    String,
    /// A JSON array with one string per line.
    Array,
}

/// The parts of an error that end up in the document.
///
/// Any part may be borrowed from the caller or owned; see
/// [`ExceptionInfo::from_error`] for building one from a Rust error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionInfo<'a> {
    /// Written as `error.type`; omitted when `None`.
    pub type_name: Option<Cow<'a, str>>,
    /// Written as `error.message`; omitted when `None`.
    pub message: Option<Cow<'a, str>>,
    /// Written as `error.stack_trace`; omitted when empty.
    pub stack_trace: Cow<'a, str>,
}

impl<'a> ExceptionInfo<'a> {
    /// Creates error details from already-extracted parts.
    pub fn new(
        type_name: impl Into<Cow<'a, str>>,
        message: Option<impl Into<Cow<'a, str>>>,
        stack_trace: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self {
            type_name: Some(type_name.into()),
            message: message.map(Into::into),
            stack_trace: stack_trace.into(),
        }
    }
}

impl ExceptionInfo<'static> {
    /// Describes `error`: its type name, its `Display` output as the message,
    /// and its chain of [`Error::source`]s as the stack trace.
    ///
    /// ```rust
    /// let err = std::fs::read("/definitely/not/here").unwrap_err();
    /// let info = ecsjson::ExceptionInfo::from_error(&err);
    /// assert!(info.type_name.is_some());
    /// assert_eq!(info.message.as_deref(), Some(err.to_string().as_str()));
    /// ```
    pub fn from_error<E: Error>(error: &E) -> Self {
        Self {
            type_name: Some(Cow::Borrowed(core::any::type_name::<E>())),
            ..Self::from_dyn_error(error)
        }
    }

    /// Like [`ExceptionInfo::from_error`] for a type-erased error, whose type
    /// name is unknown and therefore omitted.
    pub fn from_dyn_error(error: &dyn Error) -> Self {
        let message = error.to_string();
        let mut stack_trace = message.clone();
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(stack_trace, "\nCaused by: {cause}");
            source = cause.source();
        }
        Self {
            type_name: None,
            message: Some(Cow::Owned(message)),
            stack_trace: Cow::Owned(stack_trace),
        }
    }
}
