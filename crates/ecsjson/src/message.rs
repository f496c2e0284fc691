//! Log message sources and the per-thread buffer used to render them.
use core::{cell::Cell, fmt};

use crate::pool::PooledString;

/// Bytes reserved for the message buffer on first use.
pub const MESSAGE_BUFFER_CAPACITY: usize = 512;

/// Capacity above which a released buffer is shrunk, so that one huge message
/// does not pin memory for the rest of the thread's life.
pub const MAX_REUSABLE_CAPACITY: usize = 8 * 1024;

std::thread_local! {
    static MESSAGE_BUFFER: Cell<String> = const { Cell::new(String::new()) };
}

/// The text of a log message.
///
/// Plain text is escaped straight into the document. Anything else is
/// rendered into a per-thread reusable buffer first, so formatting a message
/// does not allocate once the buffer has warmed up.
#[derive(Clone, Copy)]
pub enum Message<'a> {
    /// Already-rendered message text.
    Text(&'a str),
    /// A value that renders itself through [`fmt::Display`].
    Display(&'a dyn fmt::Display),
}

impl<'a> Message<'a> {
    /// Wraps any [`fmt::Display`] value.
    #[must_use]
    pub fn display(value: &'a dyn fmt::Display) -> Self {
        Self::Display(value)
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Display(value) => f.debug_tuple("Display").field(&format_args!("{value}")).finish(),
        }
    }
}

impl<'a> From<&'a str> for Message<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for Message<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a fmt::Arguments<'a>> for Message<'a> {
    fn from(args: &'a fmt::Arguments<'a>) -> Self {
        match args.as_str() {
            Some(text) => Self::Text(text),
            None => Self::Display(args),
        }
    }
}

/// Borrows the calling thread's message buffer.
///
/// The buffer starts empty, and it is cleared (and shrunk to
/// [`MAX_REUSABLE_CAPACITY`] if it grew past it) when the guard is dropped,
/// including when formatting panics.
pub(crate) fn message_buffer() -> PooledString {
    PooledString::acquire(&MESSAGE_BUFFER, MESSAGE_BUFFER_CAPACITY, MAX_REUSABLE_CAPACITY)
}

/// Hands the rendered text of `message` to `f`.
///
/// A `Display` implementation that returns an error keeps whatever text it
/// wrote before failing.
pub(crate) fn with_rendered<R>(message: Message<'_>, f: impl FnOnce(&str) -> R) -> R {
    match message {
        Message::Text(text) => f(text),
        Message::Display(value) => {
            let mut buf = message_buffer();
            let _ = fmt::Write::write_fmt(&mut *buf, format_args!("{value}"));
            f(&buf)
        }
    }
}
