//! A `tracing-subscriber` layer writing one ECS document per event.
use core::fmt::{self, Write as _};
use std::{
    borrow::Cow,
    error::Error,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span,
};
use tracing_subscriber::{Layer, fmt::MakeWriter, layer::Context, registry::LookupSpan};

use crate::{
    exception::ExceptionInfo,
    layout::{EcsLayout, LogEvent},
    writer::Origin,
};

type Fields = Vec<(&'static str, String)>;

// Stored in span extensions.
struct SpanFields(Fields);

/// Formats `tracing` events with an [`EcsLayout`], one line per event.
///
/// Mapping:
///
/// - the `message` field becomes `message`,
/// - other event fields and the fields of every enclosing span become labels,
///   span fields first,
/// - enclosing span names become `tags`, outermost first,
/// - the target becomes `log.logger` and the current thread's name
///   `process.thread.name`,
/// - file, line and module path become `log.origin` when the layout includes
///   origins,
/// - a field recorded as a `dyn Error` becomes the `error.*` fields; on a
///   span it becomes a label holding the error's message, as does a span
///   field named `message`.
///
/// ```rust
/// use ecsjson::{EcsLayer, EcsLayout, LayoutOptions};
/// use tracing_subscriber::layer::SubscriberExt as _;
///
/// let layout = EcsLayout::new(LayoutOptions::default()).unwrap();
/// let subscriber = tracing_subscriber::registry().with(EcsLayer::new(layout, std::io::stdout));
/// tracing::subscriber::with_default(subscriber, || tracing::info!("hello"));
/// ```
pub struct EcsLayer<W> {
    layout: EcsLayout,
    make_writer: W,
}

impl<W> fmt::Debug for EcsLayer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcsLayer").field("layout", &self.layout).finish_non_exhaustive()
    }
}

impl<W> EcsLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    /// Creates a layer writing through `make_writer`.
    pub fn new(layout: EcsLayout, make_writer: W) -> Self {
        Self { layout, make_writer }
    }

    /// The layout used to format events.
    #[must_use]
    pub fn layout(&self) -> &EcsLayout {
        &self.layout
    }
}

impl<S, W> Layer<S> for EcsLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.into_span_fields()));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() else {
            return;
        };
        for (key, value) in visitor.into_span_fields() {
            match fields.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, existing)) => *existing = value,
                None => fields.push((key, value)),
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut tags = Vec::new();
        let mut labels = Fields::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                tags.push(span.name());
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    labels.extend(fields.iter().cloned());
                }
            }
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        labels.append(&mut visitor.fields);

        let thread = std::thread::current();
        let origin = metadata.file().map(|file_name| Origin {
            file_name,
            line: metadata.line(),
            function: metadata.module_path(),
        });
        let log_event = LogEvent {
            thread_name: thread.name(),
            logger_name: Some(metadata.target()),
            context_data: Some(&labels),
            tag_stack: &tags,
            exception: visitor.error.as_ref().map(|(_, error)| error),
            origin,
            ..LogEvent::new(now_millis(), metadata.level().as_str(), visitor.message.as_str())
        };

        let mut writer = self.make_writer.make_writer_for(metadata);
        // Logging the failure from inside the subscriber would recurse.
        let _ = self.layout.encode_line(&log_event, &mut writer);
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Fields,
    error: Option<(&'static str, ExceptionInfo<'static>)>,
}

impl FieldVisitor {
    /// Spans have no message or error of their own; keep both as labels.
    fn into_span_fields(mut self) -> Fields {
        if !self.message.is_empty() {
            self.fields.push(("message", self.message));
        }
        if let Some((name, error)) = self.error {
            self.fields.push((name, error.message.map(Cow::into_owned).unwrap_or_default()));
        }
        self.fields
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields.push((field.name(), value.to_owned()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.error = Some((field.name(), ExceptionInfo::from_dyn_error(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}
