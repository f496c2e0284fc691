//! Streaming serializer for Elastic Common Schema (ECS) JSON log documents.
//!
//! Each log event becomes one flat JSON object with dotted keys, written in a
//! single pass into a caller-owned `String`:
//!
//! ```text
//! {"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","message":"hello","service.name":"svc"}
//! ```
//!
//! The crate is layered:
//!
//! - [`escape_into`] escapes string content using a per-thread scratch buffer.
//! - [`EcsWriter`] appends the fields of one document in call order.
//! - [`EcsLayout`] owns application settings and formats whole [`LogEvent`]s.
//! - `EcsLayer` (feature `tracing`, on by default) plugs the layout into
//!   `tracing-subscriber`.
//!
//! ```rust
//! use ecsjson::{EcsLayout, LayoutOptions, LogEvent};
//!
//! let layout = EcsLayout::new(LayoutOptions {
//!     service_name: Some("svc".into()),
//!     ..Default::default()
//! })
//! .unwrap();
//! let json = layout.to_json(&LogEvent::new(1_577_836_800_000, "INFO", "hello"));
//! assert_eq!(
//!     json,
//!     r#"{"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","message":"hello","service.name":"svc","event.dataset":"svc.log"}"#
//! );
//! ```

mod pool;

mod error;
mod escape;
mod exception;
mod layout;
mod marker;
mod message;
mod timestamp;
mod writer;

#[cfg(feature = "tracing")]
mod layer;


pub use error::{ConfigError, EncodeError};
pub use escape::{FLUSH_INTERVAL, MAX_ESCAPED_LEN, SCRATCH_CAPACITY, ScratchBuffer, escape, escape_into};
pub use exception::{ExceptionInfo, StackTraceFormat};
#[cfg(feature = "tracing")]
pub use layer::EcsLayer;
pub use layout::{
    AdditionalField, DOCUMENT_BUFFER_CAPACITY, ECS_VERSION, EcsLayout, KeyValues, LayoutOptions, LogEvent, Lookup,
};
pub use marker::{Iter as MarkerIter, Marker};
pub use message::{MAX_REUSABLE_CAPACITY, MESSAGE_BUFFER_CAPACITY, Message};
pub use timestamp::write_iso8601_millis;
pub use writer::{DEFAULT_TOP_LEVEL_LABELS, EcsWriter, Origin, TopLevelLabels};
