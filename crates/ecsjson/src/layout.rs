//! Configured, event-level document assembly.
//!
//! [`EcsLayout`] owns the per-application settings (service name, extra
//! fields, which optional field groups to include) and turns one [`LogEvent`]
//! into one document by driving an [`EcsWriter`] in a fixed field order:
//!
//! `@timestamp`, `log.level`, `ecs.version`, `message`, `error.*`,
//! `service.*`, `event.dataset`, `data_stream.namespace`,
//! `process.thread.name`, `log.logger`, labels (additional fields first,
//! then context data), `tags`, `log.origin`.
use core::{cell::Cell, fmt};
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
    io,
};

use crate::{
    error::{ConfigError, EncodeError},
    exception::{ExceptionInfo, StackTraceFormat},
    marker::Marker,
    message::{Message, message_buffer},
    pool::PooledString,
    writer::{EcsWriter, Origin, TopLevelLabels},
};

/// Value written as `ecs.version` when [`LayoutOptions::include_ecs_version`]
/// is set.
pub const ECS_VERSION: &str = "1.2.0";

/// Bytes reserved for the per-thread document buffer used by
/// [`EcsLayout::encode`].
pub const DOCUMENT_BUFFER_CAPACITY: usize = 1024;

const MAX_RETAINED_DOCUMENT_CAPACITY: usize = 64 * 1024;

std::thread_local! {
    static DOCUMENT_BUFFER: Cell<String> = const { Cell::new(String::new()) };
}

/// A key/value pair added to every event.
///
/// A value containing `${` is a template resolved by the layout's
/// [`Lookup`] for each event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Deserialize))]
pub struct AdditionalField {
    /// Label key.
    pub key: String,
    /// Label value or template.
    pub value: String,
}

impl AdditionalField {
    /// Creates an additional field.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn needs_lookup(&self) -> bool {
        self.value.contains("${")
    }
}

/// Settings for an [`EcsLayout`].
///
/// # Examples
///
/// ```rust
/// use ecsjson::{EcsLayout, LayoutOptions};
///
/// let layout = EcsLayout::new(LayoutOptions {
///     service_name: Some("checkout".into()),
///     include_origin: true,
///     ..Default::default()
/// })
/// .unwrap();
/// assert_eq!(layout.options().event_dataset.as_deref(), Some("checkout.log"));
/// ```
///
/// # Default
///
/// All names unset, all flags `false`, no extra labels.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct LayoutOptions {
    /// `service.name`.
    pub service_name: Option<String>,
    /// `service.version`.
    pub service_version: Option<String>,
    /// `service.environment`.
    pub service_environment: Option<String>,
    /// `service.node.name`.
    pub service_node_name: Option<String>,
    /// `event.dataset`. Defaults to `<service_name>.log` when a service name
    /// is set.
    pub event_dataset: Option<String>,
    /// `data_stream.namespace`.
    pub data_stream_namespace: Option<String>,
    /// Whether the event's marker hierarchy is written to `tags`.
    pub include_markers: bool,
    /// Whether the event's source location is written to `log.origin`.
    pub include_origin: bool,
    /// Whether `error.stack_trace` is written as an array of lines.
    pub stack_trace_as_array: bool,
    /// Whether [`ECS_VERSION`] is written as `ecs.version`.
    pub include_ecs_version: bool,
    /// Label keys written without the `labels.` prefix, in addition to
    /// `trace.id` and `transaction.id`.
    pub top_level_labels: Vec<String>,
    /// Labels added to every event.
    pub additional_fields: Vec<AdditionalField>,
}

/// Resolves `${...}` templates in [`AdditionalField`] values.
///
/// Closures `Fn(&str, &mut String) -> bool` implement this trait.
pub trait Lookup: Send + Sync {
    /// Writes `template` with its placeholders substituted to `out`.
    ///
    /// Returns `false` if the template has no value, in which case the field
    /// is left out of the document.
    fn resolve(&self, template: &str, out: &mut String) -> bool;
}

impl<F> Lookup for F
where
    F: Fn(&str, &mut String) -> bool + Send + Sync,
{
    fn resolve(&self, template: &str, out: &mut String) -> bool {
        self(template, out)
    }
}

/// Ordered key/value context attached to an event (MDC-style data), written
/// as labels.
pub trait KeyValues {
    /// Calls `f` once per pair, in the order they should be written.
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str));
}

impl<K: AsRef<str>, V: AsRef<str>> KeyValues for [(K, V)] {
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self {
            f(key.as_ref(), value.as_ref());
        }
    }
}

impl<K: AsRef<str>, V: AsRef<str>> KeyValues for Vec<(K, V)> {
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str)) {
        self.as_slice().for_each_pair(f);
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> KeyValues for [(K, V); N] {
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str)) {
        self.as_slice().for_each_pair(f);
    }
}

impl<K: AsRef<str>, V: AsRef<str>> KeyValues for BTreeMap<K, V> {
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self {
            f(key.as_ref(), value.as_ref());
        }
    }
}

impl<K: AsRef<str>, V: AsRef<str>, S: BuildHasher> KeyValues for HashMap<K, V, S> {
    fn for_each_pair(&self, f: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self {
            f(key.as_ref(), value.as_ref());
        }
    }
}

/// Everything a logging framework extracted from one event.
///
/// Build with [`LogEvent::new`] and struct update syntax:
///
/// ```rust
/// use ecsjson::LogEvent;
///
/// let event = LogEvent {
///     thread_name: Some("main"),
///     ..LogEvent::new(1_577_836_800_000, "INFO", "hello")
/// };
/// # let _ = event;
/// ```
#[derive(Clone, Copy)]
pub struct LogEvent<'a> {
    /// Milliseconds since the Unix epoch, UTC.
    pub epoch_millis: i64,
    /// Level label, e.g. `INFO`.
    pub level: &'a str,
    /// The log message.
    pub message: Message<'a>,
    /// Name of the thread that logged the event.
    pub thread_name: Option<&'a str>,
    /// Name of the logger (or target) the event was logged through.
    pub logger_name: Option<&'a str>,
    /// Context data written as labels.
    pub context_data: Option<&'a dyn KeyValues>,
    /// Nested context entries written as tags, outermost first.
    pub tag_stack: &'a [&'a str],
    /// Marker written as tags when markers are included.
    pub marker: Option<&'a Marker>,
    /// Error attached to the event.
    pub exception: Option<&'a ExceptionInfo<'a>>,
    /// Source location, written when origins are included.
    pub origin: Option<Origin<'a>>,
}

impl<'a> LogEvent<'a> {
    /// An event with only the always-present fields set.
    pub fn new(epoch_millis: i64, level: &'a str, message: impl Into<Message<'a>>) -> Self {
        Self {
            epoch_millis,
            level,
            message: message.into(),
            thread_name: None,
            logger_name: None,
            context_data: None,
            tag_stack: &[],
            marker: None,
            exception: None,
            origin: None,
        }
    }
}

impl fmt::Debug for LogEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("epoch_millis", &self.epoch_millis)
            .field("level", &self.level)
            .field("message", &self.message)
            .field("thread_name", &self.thread_name)
            .field("logger_name", &self.logger_name)
            .field("tag_stack", &self.tag_stack)
            .field("marker", &self.marker)
            .field("exception", &self.exception)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Turns [`LogEvent`]s into ECS documents.
pub struct EcsLayout {
    options: LayoutOptions,
    top_level_labels: TopLevelLabels,
    stack_trace_format: StackTraceFormat,
    lookup: Option<Box<dyn Lookup>>,
}

impl fmt::Debug for EcsLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcsLayout")
            .field("options", &self.options)
            .field("has_lookup", &self.lookup.is_some())
            .finish_non_exhaustive()
    }
}

impl EcsLayout {
    /// Validates `options` and fills in derived defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an additional field with an empty key or
    /// an empty top-level label name.
    pub fn new(mut options: LayoutOptions) -> Result<Self, ConfigError> {
        if let Some(index) = options.additional_fields.iter().position(|f| f.key.is_empty()) {
            return Err(ConfigError::EmptyAdditionalFieldKey { index });
        }
        if let Some(index) = options.top_level_labels.iter().position(String::is_empty) {
            return Err(ConfigError::EmptyTopLevelLabel { index });
        }
        if options.event_dataset.is_none() {
            options.event_dataset = options
                .service_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(|name| format!("{name}.log"));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            service_name = ?options.service_name,
            event_dataset = ?options.event_dataset,
            additional_fields = options.additional_fields.len(),
            "configured ECS layout"
        );

        Ok(Self {
            top_level_labels: TopLevelLabels::new(options.top_level_labels.iter().cloned()),
            stack_trace_format: if options.stack_trace_as_array {
                StackTraceFormat::Array
            } else {
                StackTraceFormat::String
            },
            options,
            lookup: None,
        })
    }

    /// Uses `lookup` to resolve templated additional field values.
    ///
    /// Without a lookup, templates are written verbatim.
    #[must_use]
    pub fn with_lookup(mut self, lookup: impl Lookup + 'static) -> Self {
        self.lookup = Some(Box::new(lookup));
        self
    }

    /// The effective options, including derived defaults.
    #[must_use]
    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Appends the document for `event` to `dst`.
    pub fn format_into(&self, event: &LogEvent<'_>, dst: &mut String) {
        let options = &self.options;
        let mut writer = EcsWriter::open(dst, event.epoch_millis, event.level);
        if options.include_ecs_version {
            writer.ecs_version(ECS_VERSION);
        }
        writer
            .message(event.message)
            .exception(event.exception, self.stack_trace_format)
            .service_name(options.service_name.as_deref())
            .service_version(options.service_version.as_deref())
            .service_environment(options.service_environment.as_deref())
            .service_node_name(options.service_node_name.as_deref())
            .event_dataset(options.event_dataset.as_deref())
            .data_stream_namespace(options.data_stream_namespace.as_deref())
            .thread_name(event.thread_name)
            .logger_name(event.logger_name);
        self.write_additional_fields(&mut writer);
        if let Some(context_data) = event.context_data {
            context_data.for_each_pair(&mut |key, value| {
                writer.label(key, value, &self.top_level_labels);
            });
        }
        writer.tags(event.tag_stack, event.marker.filter(|_| options.include_markers));
        if options.include_origin {
            writer.origin(event.origin.as_ref());
        }
        writer.close();
    }

    fn write_additional_fields(&self, writer: &mut EcsWriter<'_>) {
        for field in &self.options.additional_fields {
            match &self.lookup {
                Some(lookup) if field.needs_lookup() => {
                    let mut resolved = message_buffer();
                    if lookup.resolve(&field.value, &mut resolved) {
                        writer.label(&field.key, &resolved, &self.top_level_labels);
                    }
                }
                _ => {
                    writer.label(&field.key, &field.value, &self.top_level_labels);
                }
            }
        }
    }

    /// Returns the document for `event` as a new `String`.
    #[must_use]
    pub fn to_json(&self, event: &LogEvent<'_>) -> String {
        let mut out = String::with_capacity(DOCUMENT_BUFFER_CAPACITY);
        self.format_into(event, &mut out);
        out
    }

    /// Returns the document for `event` as UTF-8 bytes.
    #[must_use]
    pub fn to_bytes(&self, event: &LogEvent<'_>) -> Vec<u8> {
        self.to_json(event).into_bytes()
    }

    /// Writes the document for `event` to `out` with a single `write_all`,
    /// staging it in a per-thread reusable buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Io`] if `out` fails.
    pub fn encode<W: io::Write + ?Sized>(&self, event: &LogEvent<'_>, out: &mut W) -> Result<(), EncodeError> {
        self.encode_with_terminator(event, "", out)
    }

    /// Like [`encode`](Self::encode), followed by a newline, for
    /// line-delimited outputs.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Io`] if `out` fails.
    pub fn encode_line<W: io::Write + ?Sized>(&self, event: &LogEvent<'_>, out: &mut W) -> Result<(), EncodeError> {
        self.encode_with_terminator(event, "\n", out)
    }

    fn encode_with_terminator<W: io::Write + ?Sized>(
        &self,
        event: &LogEvent<'_>,
        terminator: &str,
        out: &mut W,
    ) -> Result<(), EncodeError> {
        let mut buf = PooledString::acquire(&DOCUMENT_BUFFER, DOCUMENT_BUFFER_CAPACITY, MAX_RETAINED_DOCUMENT_CAPACITY);
        self.format_into(event, &mut buf);
        buf.push_str(terminator);
        out.write_all(buf.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io, sync::Arc};

    use super::{AdditionalField, DOCUMENT_BUFFER, EcsLayout, LayoutOptions, LogEvent};
    use crate::{ConfigError, EncodeError, ExceptionInfo, Marker, Origin, pool::idle_buffer};

    const TS: i64 = 1_577_836_800_000;

    fn layout(options: LayoutOptions) -> EcsLayout {
        EcsLayout::new(options).unwrap()
    }

    #[test]
    fn minimal_event() {
        let json = layout(LayoutOptions::default()).to_json(&LogEvent::new(TS, "INFO", "hello"));
        assert_eq!(
            json,
            r#"{"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","message":"hello"}"#
        );
    }

    #[test]
    fn dataset_defaults_from_service_name() {
        let layout = layout(LayoutOptions {
            service_name: Some("svc".into()),
            ..Default::default()
        });
        assert_eq!(layout.options().event_dataset.as_deref(), Some("svc.log"));

        let explicit = super::EcsLayout::new(LayoutOptions {
            service_name: Some("svc".into()),
            event_dataset: Some("custom".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(explicit.options().event_dataset.as_deref(), Some("custom"));
    }

    #[test]
    fn empty_service_name_has_no_dataset() {
        let layout = layout(LayoutOptions {
            service_name: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(layout.options().event_dataset, None);
    }

    #[test]
    fn rejects_empty_keys() {
        let err = EcsLayout::new(LayoutOptions {
            additional_fields: vec![AdditionalField::new("ok", "1"), AdditionalField::new("", "2")],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyAdditionalFieldKey { index: 1 });
        assert_eq!(err.to_string(), "additional field #1 has an empty key");

        let err = EcsLayout::new(LayoutOptions {
            top_level_labels: vec![String::new()],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyTopLevelLabel { index: 0 });
    }

    #[test]
    fn exception_follows_message() {
        let exception = ExceptionInfo::new("E", Some("boom"), "trace");
        let json = layout(LayoutOptions {
            service_name: Some("svc".into()),
            ..Default::default()
        })
        .to_json(&LogEvent {
            exception: Some(&exception),
            ..LogEvent::new(TS, "ERROR", "failed")
        });
        assert!(
            json.contains(r#""message":"failed","error.type":"E","error.message":"boom","error.stack_trace":"trace","service.name":"svc""#),
            "{json}"
        );
    }

    #[test]
    fn markers_and_origin_are_opt_in() {
        let marker = Marker::with_parents("CHILD", [Arc::new(Marker::new("PARENT"))]);
        let event = LogEvent {
            marker: Some(&marker),
            origin: Some(Origin {
                file_name: "lib.rs",
                line: Some(7),
                function: None,
            }),
            ..LogEvent::new(TS, "INFO", "m")
        };

        let plain = layout(LayoutOptions::default()).to_json(&event);
        assert!(!plain.contains("tags"), "{plain}");
        assert!(!plain.contains("log.origin"), "{plain}");

        let full = layout(LayoutOptions {
            include_markers: true,
            include_origin: true,
            ..Default::default()
        })
        .to_json(&event);
        assert!(
            full.ends_with(r#""tags":["CHILD","PARENT"],"log.origin":{"file.name":"lib.rs","file.line":7}}"#),
            "{full}"
        );
    }

    #[test]
    fn tag_stack_is_written_without_markers() {
        let json = layout(LayoutOptions::default()).to_json(&LogEvent {
            tag_stack: &["outer", "inner"],
            ..LogEvent::new(TS, "INFO", "m")
        });
        assert!(json.ends_with(r#""message":"m","tags":["outer","inner"]}"#), "{json}");
    }

    #[test]
    fn additional_fields_then_context_data() {
        let context: BTreeMap<&str, &str> = [("trace.id", "t-1"), ("user", "bob")].into();
        let json = layout(LayoutOptions {
            additional_fields: vec![AdditionalField::new("region", "eu-1")],
            top_level_labels: vec!["region".into()],
            ..Default::default()
        })
        .to_json(&LogEvent {
            context_data: Some(&context),
            ..LogEvent::new(TS, "INFO", "m")
        });
        assert!(
            json.ends_with(r#""message":"m","region":"eu-1","trace.id":"t-1","labels.user":"bob"}"#),
            "{json}"
        );
    }

    #[test]
    fn templated_fields_use_lookup() {
        let layout = layout(LayoutOptions {
            additional_fields: vec![
                AdditionalField::new("host", "${hostName}"),
                AdditionalField::new("missing", "${nope}"),
                AdditionalField::new("plain", "as-is"),
            ],
            ..Default::default()
        })
        .with_lookup(|template: &str, out: &mut String| {
            if template == "${hostName}" {
                out.push_str("web-01");
                true
            } else {
                false
            }
        });
        let json = layout.to_json(&LogEvent::new(TS, "INFO", "m"));
        assert!(json.ends_with(r#""labels.host":"web-01","labels.plain":"as-is"}"#), "{json}");
    }

    #[test]
    fn templates_are_verbatim_without_lookup() {
        let json = layout(LayoutOptions {
            additional_fields: vec![AdditionalField::new("host", "${hostName}")],
            ..Default::default()
        })
        .to_json(&LogEvent::new(TS, "INFO", "m"));
        assert!(json.ends_with(r#""labels.host":"${hostName}"}"#), "{json}");
    }

    #[test]
    fn encode_writes_utf8_and_reuses_buffer() {
        let layout = layout(LayoutOptions::default());
        let event = LogEvent::new(TS, "INFO", "grüße");
        let mut out = Vec::new();
        layout.encode(&event, &mut out).unwrap();
        layout.encode_line(&event, &mut out).unwrap();
        let expected = layout.to_json(&event);
        assert_eq!(out, format!("{expected}{expected}\n").into_bytes());
        assert_eq!(layout.to_bytes(&event), expected.as_bytes());
        assert_eq!(idle_buffer(&DOCUMENT_BUFFER).0, 0);
    }

    #[test]
    fn encode_reports_io_errors() {
        struct Broken;

        impl io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = layout(LayoutOptions::default())
            .encode(&LogEvent::new(TS, "INFO", "m"), &mut Broken)
            .unwrap_err();
        assert!(matches!(err, EncodeError::Io(_)));
        assert_eq!(idle_buffer(&DOCUMENT_BUFFER).0, 0);
    }
}
