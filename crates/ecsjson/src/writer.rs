//! Single-pass ECS document writer.
//!
//! [`EcsWriter`] appends one JSON object to a caller-owned `String` without
//! building an intermediate tree. Every field is written as
//! `"key":value,`; the trailing comma is speculative and is removed by
//! [`EcsWriter::close`], which is the only step (together with the tag list
//! and exception splice) that rewrites text already in the buffer.
//!
//! Field order is the order in which the methods are called. Absent values
//! never produce a `null`: the whole field is left out.
//!
//! # Examples
//!
//! ```rust
//! use ecsjson::EcsWriter;
//!
//! let mut out = String::new();
//! let mut writer = EcsWriter::open(&mut out, 1_577_836_800_000, "INFO");
//! writer.message("hello").logger_name(None);
//! writer.close();
//! assert_eq!(
//!     out,
//!     r#"{"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","message":"hello"}"#
//! );
//! ```
use std::{collections::HashSet, fmt::Write as _};

use crate::{
    escape::escape_into,
    exception::{ExceptionInfo, StackTraceFormat},
    marker::Marker,
    message::{Message, with_rendered},
    timestamp::write_iso8601_millis,
};

/// Label keys that are always written without the `labels.` prefix.
pub const DEFAULT_TOP_LEVEL_LABELS: [&str; 2] = ["trace.id", "transaction.id"];

/// Label keys written as top-level fields instead of under `labels.`.
///
/// Always contains [`DEFAULT_TOP_LEVEL_LABELS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelLabels(HashSet<String>);

impl TopLevelLabels {
    /// The default set extended with `extra`.
    pub fn new<I>(extra: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut set: HashSet<String> = extra.into_iter().map(Into::into).collect();
        set.extend(DEFAULT_TOP_LEVEL_LABELS.map(String::from));
        Self(set)
    }

    /// Whether `key` is written without a prefix.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl Default for TopLevelLabels {
    fn default() -> Self {
        Self::new(core::iter::empty::<String>())
    }
}

/// Source location of the statement that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin<'a> {
    /// Written as `log.origin.file.name`.
    pub file_name: &'a str,
    /// Written as `log.origin.file.line` when known.
    pub line: Option<u32>,
    /// Written as `log.origin.function` when known.
    pub function: Option<&'a str>,
}

/// Appends one ECS document to a borrowed buffer.
///
/// Created by [`EcsWriter::open`], finished by [`EcsWriter::close`]. Every
/// method returns `&mut Self` so that fields can be chained in document order.
#[derive(Debug)]
pub struct EcsWriter<'a> {
    dst: &'a mut String,
}

impl<'a> EcsWriter<'a> {
    /// Starts a document with `@timestamp` and `log.level`.
    ///
    /// Text already in `dst` is left alone; the document is appended after it.
    pub fn open(dst: &'a mut String, epoch_millis: i64, level: &str) -> Self {
        dst.push_str("{\"@timestamp\":\"");
        write_iso8601_millis(dst, epoch_millis);
        dst.push_str("\",\"log.level\":\"");
        escape_into(level, dst);
        dst.push_str("\",");
        Self { dst }
    }

    /// The document written so far, including speculative separators.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.dst.as_str()
    }

    /// Writes `ecs.version`.
    pub fn ecs_version(&mut self, version: &str) -> &mut Self {
        self.string_field("ecs.version", Some(version))
    }

    /// Writes `message`. Always present, even when empty.
    pub fn message<'m>(&mut self, message: impl Into<Message<'m>>) -> &mut Self {
        let dst = &mut *self.dst;
        dst.push_str("\"message\":\"");
        with_rendered(message.into(), |text| escape_into(text, dst));
        dst.push_str("\",");
        self
    }

    /// Writes `"key":"value",`, or nothing if `value` is `None` or empty.
    pub fn string_field(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|value| !value.is_empty()) {
            self.raw_string_field(None, key, value);
        }
        self
    }

    /// Writes `service.name`.
    pub fn service_name(&mut self, name: Option<&str>) -> &mut Self {
        self.string_field("service.name", name)
    }

    /// Writes `service.version`.
    pub fn service_version(&mut self, version: Option<&str>) -> &mut Self {
        self.string_field("service.version", version)
    }

    /// Writes `service.environment`.
    pub fn service_environment(&mut self, environment: Option<&str>) -> &mut Self {
        self.string_field("service.environment", environment)
    }

    /// Writes `service.node.name`.
    pub fn service_node_name(&mut self, node_name: Option<&str>) -> &mut Self {
        self.string_field("service.node.name", node_name)
    }

    /// Writes `event.dataset`.
    pub fn event_dataset(&mut self, dataset: Option<&str>) -> &mut Self {
        self.string_field("event.dataset", dataset)
    }

    /// Writes `data_stream.namespace`.
    pub fn data_stream_namespace(&mut self, namespace: Option<&str>) -> &mut Self {
        self.string_field("data_stream.namespace", namespace)
    }

    /// Writes `process.thread.name`.
    pub fn thread_name(&mut self, name: Option<&str>) -> &mut Self {
        self.string_field("process.thread.name", name)
    }

    /// Writes `log.logger`.
    pub fn logger_name(&mut self, name: Option<&str>) -> &mut Self {
        self.string_field("log.logger", name)
    }

    /// Writes one label: `"labels.<key>":"<value>",`, or `"<key>":"<value>",`
    /// if `key` is in `top_level`. Empty values are kept.
    pub fn label(&mut self, key: &str, value: &str, top_level: &TopLevelLabels) -> &mut Self {
        let prefix = (!top_level.contains(key)).then_some("labels.");
        self.raw_string_field(prefix, key, value);
        self
    }

    /// Writes every pair as a [`label`](Self::label), in iteration order.
    pub fn labels<I, K, V>(&mut self, labels: I, top_level: &TopLevelLabels) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in labels {
            self.label(key.as_ref(), value.as_ref(), top_level);
        }
        self
    }

    /// Writes `tags`: every entry of `stack` followed by `marker` and its
    /// ancestors (see [`Marker::iter`]). Nothing is written when there are no
    /// tags at all.
    pub fn tags<I, S>(&mut self, stack: I, marker: Option<&Marker>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stack = stack.into_iter().peekable();
        if stack.peek().is_none() && marker.is_none() {
            return self;
        }
        self.dst.push_str("\"tags\":[");
        for tag in stack {
            self.array_item(tag.as_ref());
        }
        for marker in marker.into_iter().flat_map(Marker::iter) {
            self.array_item(marker.name());
        }
        // Replace the comma after the last tag.
        self.dst.pop();
        self.dst.push_str("],");
        self
    }

    fn array_item(&mut self, item: &str) {
        self.dst.push('"');
        escape_into(item, self.dst);
        self.dst.push_str("\",");
    }

    /// Writes `log.origin`, or nothing if `origin` is `None`.
    pub fn origin(&mut self, origin: Option<&Origin<'_>>) -> &mut Self {
        let Some(origin) = origin else {
            return self;
        };
        let dst = &mut *self.dst;
        dst.push_str("\"log.origin\":{\"file.name\":\"");
        escape_into(origin.file_name, dst);
        dst.push('"');
        if let Some(line) = origin.line {
            let _ = write!(dst, ",\"file.line\":{line}");
        }
        if let Some(function) = origin.function {
            dst.push_str(",\"function\":\"");
            escape_into(function, dst);
            dst.push('"');
        }
        dst.push_str("},");
        self
    }

    /// Writes `error.type`, `error.message` and `error.stack_trace`, or
    /// nothing if `exception` is `None`.
    ///
    /// The error fields are spliced onto whatever separator the previous field
    /// left behind, so they may directly follow a message written by other
    /// means (for instance text ending in `", `).
    pub fn exception(&mut self, exception: Option<&ExceptionInfo<'_>>, format: StackTraceFormat) -> &mut Self {
        let Some(exception) = exception else {
            return self;
        };
        self.splice();
        if let Some(type_name) = &exception.type_name {
            self.raw_string_field(None, "error.type", type_name);
        }
        if let Some(message) = &exception.message {
            self.raw_string_field(None, "error.message", message);
        }
        if exception.stack_trace.is_empty() {
            return self;
        }
        match format {
            StackTraceFormat::String => {
                self.raw_string_field(None, "error.stack_trace", &exception.stack_trace);
            }
            StackTraceFormat::Array => {
                self.dst.push_str("\"error.stack_trace\":[");
                for line in exception.stack_trace.lines() {
                    self.array_item(line);
                }
                self.dst.pop();
                self.dst.push_str("],");
            }
        }
        self
    }

    /// Removes the speculative separator after the last field, closes the
    /// object, and returns the buffer's full contents.
    pub fn close(self) -> &'a str {
        let dst = self.dst;
        if dst.ends_with(',') {
            dst.pop();
        }
        dst.push('}');
        dst
    }

    /// Normalizes whatever separator ends the buffer (`,` or `, `) to `,`.
    fn splice(&mut self) {
        let end = self.dst.trim_end_matches([',', ' ']).len();
        self.dst.truncate(end);
        self.dst.push(',');
    }

    fn raw_string_field(&mut self, prefix: Option<&str>, key: &str, value: &str) {
        let dst = &mut *self.dst;
        dst.push('"');
        if let Some(prefix) = prefix {
            dst.push_str(prefix);
        }
        escape_into(key, dst);
        dst.push_str("\":\"");
        escape_into(value, dst);
        dst.push_str("\",");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EcsWriter, Origin, TopLevelLabels};
    use crate::{ExceptionInfo, Marker, Message, StackTraceFormat};

    const TS: i64 = 1_577_836_800_000;
    const HEAD: &str = r#"{"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","#;

    fn document(build: impl FnOnce(&mut EcsWriter<'_>)) -> String {
        let mut out = String::new();
        let mut writer = EcsWriter::open(&mut out, TS, "INFO");
        build(&mut writer);
        writer.close();
        serde_json::from_str::<serde_json::Value>(&out)
            .unwrap_or_else(|e| panic!("invalid JSON ({e}): {out}"));
        out
    }

    fn body(doc: &str) -> &str {
        doc.strip_prefix(HEAD).expect("document header")
    }

    #[test]
    fn minimal_document() {
        assert_eq!(
            document(|w| {
                w.message("hello");
            }),
            r#"{"@timestamp":"2020-01-01T00:00:00.000Z","log.level":"INFO","message":"hello"}"#
        );
    }

    #[test]
    fn open_and_close_only() {
        let mut out = String::new();
        EcsWriter::open(&mut out, 0, "WARN").close();
        assert_eq!(out, r#"{"@timestamp":"1970-01-01T00:00:00.000Z","log.level":"WARN"}"#);
    }

    #[test]
    fn appends_after_existing_text() {
        let mut out = String::from("prefix ");
        let doc = EcsWriter::open(&mut out, TS, "INFO").close().to_owned();
        assert!(doc.starts_with("prefix {"));
        assert!(doc.ends_with("\"INFO\"}"));
    }

    #[test]
    fn absent_and_empty_values_are_omitted() {
        let doc = document(|w| {
            w.message("m")
                .service_name(None)
                .service_version(Some(""))
                .thread_name(None)
                .logger_name(Some("app.db"))
                .event_dataset(None)
                .data_stream_namespace(None)
                .origin(None)
                .exception(None, StackTraceFormat::String)
                .tags(core::iter::empty::<&str>(), None);
        });
        assert_eq!(body(&doc), r#""message":"m","log.logger":"app.db"}"#);
    }

    #[test]
    fn empty_message_is_kept() {
        let doc = document(|w| {
            w.message("");
        });
        assert_eq!(body(&doc), r#""message":""}"#);
    }

    #[test]
    fn message_is_escaped() {
        let doc = document(|w| {
            w.message("line one\nsays \"hi\"");
        });
        assert_eq!(body(&doc), r#""message":"line one\nsays \"hi\""}"#);
    }

    #[test]
    fn formatted_message() {
        let user = "al\"ice";
        let doc = document(|w| {
            w.message(&format_args!("user {user} logged in {} times", 3));
        });
        assert_eq!(body(&doc), r#""message":"user al\"ice logged in 3 times"}"#);
    }

    #[test]
    fn display_message() {
        let value = 1.5f64;
        let doc = document(|w| {
            w.message(Message::display(&value));
        });
        assert_eq!(body(&doc), r#""message":"1.5"}"#);
    }

    #[test]
    fn service_fields() {
        let doc = document(|w| {
            w.message("m")
                .service_name(Some("checkout"))
                .service_version(Some("1.2.3"))
                .service_environment(Some("prod"))
                .service_node_name(Some("node-1"))
                .event_dataset(Some("checkout.log"))
                .data_stream_namespace(Some("default"))
                .thread_name(Some("main"));
        });
        assert_eq!(
            body(&doc),
            concat!(
                r#""message":"m","service.name":"checkout","service.version":"1.2.3","#,
                r#""service.environment":"prod","service.node.name":"node-1","#,
                r#""event.dataset":"checkout.log","data_stream.namespace":"default","#,
                r#""process.thread.name":"main"}"#
            )
        );
    }

    #[test]
    fn labels_are_prefixed_unless_top_level() {
        let top_level = TopLevelLabels::new(["request.id"]);
        let doc = document(|w| {
            w.labels(
                [
                    ("trace.id", "abc"),
                    ("transaction.id", "def"),
                    ("request.id", "r-1"),
                    ("user", "bob"),
                    ("empty", ""),
                    ("quote\"key", "line\nvalue"),
                ],
                &top_level,
            );
        });
        assert_eq!(
            body(&doc),
            concat!(
                r#""trace.id":"abc","transaction.id":"def","request.id":"r-1","#,
                r#""labels.user":"bob","labels.empty":"","labels.quote\"key":"line\nvalue"}"#
            )
        );
    }

    #[test]
    fn default_top_level_labels() {
        let labels = TopLevelLabels::default();
        assert!(labels.contains("trace.id"));
        assert!(labels.contains("transaction.id"));
        assert!(!labels.contains("span.id"));
    }

    #[test]
    fn tags_from_stack_and_marker() {
        let parent = Arc::new(Marker::new("PARENT"));
        let marker = Marker::with_parents("CHILD", [parent]);
        let doc = document(|w| {
            w.tags(["ctx\t1", "ctx2"], Some(&marker));
        });
        assert_eq!(body(&doc), r#""tags":["ctx\t1","ctx2","CHILD","PARENT"]}"#);
    }

    #[test]
    fn tags_from_marker_only() {
        let marker = Marker::new("AUDIT");
        let doc = document(|w| {
            w.tags(core::iter::empty::<String>(), Some(&marker)).message("m");
        });
        assert_eq!(body(&doc), r#""tags":["AUDIT"],"message":"m"}"#);
    }

    #[test]
    fn origin_with_all_parts() {
        let origin = Origin {
            file_name: "src/main.rs",
            line: Some(42),
            function: Some("app::main"),
        };
        let doc = document(|w| {
            w.origin(Some(&origin));
        });
        assert_eq!(
            body(&doc),
            r#""log.origin":{"file.name":"src/main.rs","file.line":42,"function":"app::main"}}"#
        );
    }

    #[test]
    fn origin_with_file_only() {
        let origin = Origin {
            file_name: "C:\\src\\lib.rs",
            line: None,
            function: None,
        };
        let doc = document(|w| {
            w.origin(Some(&origin));
        });
        assert_eq!(body(&doc), r#""log.origin":{"file.name":"C:\\src\\lib.rs"}}"#);
    }

    #[test]
    fn exception_as_string() {
        let exception = ExceptionInfo::new("io::Error", Some("disk \"full\""), "first\n\tat second");
        let doc = document(|w| {
            w.message("failed").exception(Some(&exception), StackTraceFormat::String);
        });
        assert_eq!(
            body(&doc),
            concat!(
                r#""message":"failed","error.type":"io::Error","error.message":"disk \"full\"","#,
                r#""error.stack_trace":"first\n\tat second"}"#
            )
        );
    }

    #[test]
    fn exception_as_array() {
        let exception = ExceptionInfo::new("E", None::<&str>, "first\n\tat second\n");
        let doc = document(|w| {
            w.message("failed").exception(Some(&exception), StackTraceFormat::Array);
        });
        assert_eq!(
            body(&doc),
            r#""message":"failed","error.type":"E","error.stack_trace":["first","\tat second"]}"#
        );
    }

    #[test]
    fn exception_without_trace() {
        let exception = ExceptionInfo {
            message: Some("boom".into()),
            ..ExceptionInfo::default()
        };
        let doc = document(|w| {
            w.exception(Some(&exception), StackTraceFormat::Array);
        });
        assert_eq!(body(&doc), r#""error.message":"boom"}"#);
    }

    #[test]
    fn exception_splices_after_spaced_separator() {
        let mut out = String::new();
        let mut writer = EcsWriter::open(&mut out, TS, "ERROR");
        writer.message("failed");
        // A message field closed with the `", ` suffix by another producer.
        writer.dst.truncate(writer.dst.len() - 1);
        writer.dst.push_str(", ");
        assert!(writer.as_str().ends_with("\"failed\", "));

        let exception = ExceptionInfo::new("E", Some("m"), "t");
        writer.exception(Some(&exception), StackTraceFormat::String);
        assert!(writer.as_str().contains(r#""message":"failed","error.type":"E""#));
        let doc = writer.close();
        serde_json::from_str::<serde_json::Value>(doc).unwrap();
    }

    #[test]
    fn close_leaves_no_trailing_comma() {
        let mut out = String::new();
        let mut writer = EcsWriter::open(&mut out, TS, "INFO");
        writer.message("x").thread_name(Some("t"));
        assert!(writer.as_str().ends_with(','));
        let doc = writer.close();
        assert!(doc.ends_with("\"t\"}"));
        assert!(!doc.contains(",}"));
    }
}
