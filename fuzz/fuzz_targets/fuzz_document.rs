#![no_main]
use std::sync::Arc;

use arbitrary::Arbitrary;
use ecsjson::{EcsLayout, ExceptionInfo, LayoutOptions, LogEvent, Marker, Origin};
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    epoch_millis: i64,
    level: &'a str,
    message: &'a str,
    thread_name: Option<&'a str>,
    labels: Vec<(&'a str, &'a str)>,
    tags: Vec<&'a str>,
    markers: Vec<&'a str>,
    exception: Option<(&'a str, Option<&'a str>, &'a str)>,
    origin: Option<(&'a str, Option<u32>)>,
    stack_trace_as_array: bool,
}

fn document(input: &Input<'_>) {
    let layout = EcsLayout::new(LayoutOptions {
        service_name: Some("fuzz".into()),
        include_markers: true,
        include_origin: true,
        stack_trace_as_array: input.stack_trace_as_array,
        ..Default::default()
    })
    .expect("static options are valid");

    // Chain the markers so that each one is the parent of the previous.
    let marker = input
        .markers
        .iter()
        .rev()
        .fold(None::<Arc<Marker>>, |parent, name| {
            Some(Arc::new(Marker::with_parents(*name, parent)))
        });
    let exception = input
        .exception
        .map(|(type_name, message, trace)| ExceptionInfo::new(type_name, message, trace));
    let event = LogEvent {
        thread_name: input.thread_name,
        context_data: Some(&input.labels),
        tag_stack: &input.tags,
        marker: marker.as_deref(),
        exception: exception.as_ref(),
        origin: input.origin.map(|(file_name, line)| Origin {
            file_name,
            line,
            function: None,
        }),
        ..LogEvent::new(input.epoch_millis, input.level, input.message)
    };

    let json = layout.to_json(&event);
    let Value::Object(doc) = serde_json::from_str(&json).expect("document must be valid JSON") else {
        panic!("document must be an object: {json}");
    };
    assert_eq!(doc["message"], input.message);
    assert_eq!(doc["log.level"], input.level);
    assert_eq!(doc.contains_key("tags"), !input.tags.is_empty() || !input.markers.is_empty());
}

fuzz_target!(|input: Input<'_>| document(&input));
