//! JSON string escaping.
//!
//! [`escape_into`] appends the escaped form of a string to a destination
//! buffer, without the surrounding quotes. Characters are staged in a scratch
//! buffer that is flushed to the destination every [`FLUSH_INTERVAL`] input
//! characters. Since one character expands to at most [`MAX_ESCAPED_LEN`]
//! bytes, the scratch buffer never grows past [`SCRATCH_CAPACITY`], and the
//! destination is extended once per chunk instead of once per character.
//!
//! Only the quote, the backslash and the C0 control characters are escaped.
//! Everything else, including `/`, `U+007F` and all non-ASCII text, is copied
//! verbatim.
use core::cell::Cell;

use crate::pool::PooledString;

/// Number of input characters staged before the scratch buffer is flushed.
pub const FLUSH_INTERVAL: usize = 512;

/// Longest escaped form of a single character (`\u00XX`).
pub const MAX_ESCAPED_LEN: usize = 6;

/// Scratch bytes needed to stage one full chunk of worst-case input.
pub const SCRATCH_CAPACITY: usize = FLUSH_INTERVAL * MAX_ESCAPED_LEN;

const _: () = assert!(FLUSH_INTERVAL.is_power_of_two());

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    Pass,
    /// Backslash followed by the given character.
    Named(u8),
    /// `\u00XX`.
    Generic,
}

static ESCAPES: [Escape; 128] = escape_table();

const fn escape_table() -> [Escape; 128] {
    let mut table = [Escape::Pass; 128];
    let mut i = 0;
    while i < 0x20 {
        table[i] = Escape::Generic;
        i += 1;
    }
    table[b'"' as usize] = Escape::Named(b'"');
    table[b'\\' as usize] = Escape::Named(b'\\');
    table[0x08] = Escape::Named(b'b');
    table[0x09] = Escape::Named(b't');
    table[0x0A] = Escape::Named(b'n');
    table[0x0C] = Escape::Named(b'f');
    table[0x0D] = Escape::Named(b'r');
    table
}

#[inline]
fn escape_for(c: char) -> Escape {
    ESCAPES.get(c as usize).copied().unwrap_or(Escape::Pass)
}

/// `true` if any byte of `input` has an escape. Non-ASCII UTF-8 bytes are all
/// `>= 0x80` and never need escaping.
#[inline]
fn needs_escaping(input: &str) -> bool {
    input
        .bytes()
        .any(|b| b < 0x80 && ESCAPES[b as usize] != Escape::Pass)
}

std::thread_local! {
    static SCRATCH: Cell<String> = const { Cell::new(String::new()) };
}

/// Appends the JSON-escaped form of `input` to `dst`, using the calling
/// thread's scratch buffer.
///
/// The scratch buffer is allocated on the first escape that needs it and kept
/// for the lifetime of the thread.
///
/// # Examples
///
/// ```rust
/// let mut out = String::from("\"");
/// ecsjson::escape_into("foo\nbar", &mut out);
/// out.push('"');
/// assert_eq!(out, r#""foo\nbar""#);
/// ```
pub fn escape_into(input: &str, dst: &mut String) {
    if !needs_escaping(input) {
        dst.push_str(input);
        return;
    }
    let mut scratch = PooledString::acquire(&SCRATCH, SCRATCH_CAPACITY, SCRATCH_CAPACITY);
    escape_chunked(input, &mut scratch, dst);
}

/// Returns the JSON-escaped form of `input` as a new `String`.
#[must_use]
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    escape_into(input, &mut out);
    out
}

/// An explicitly owned scratch buffer.
///
/// [`escape_into`] keeps one of these per thread. Callers that multiplex many
/// logical execution contexts over few threads can hold their own instead and
/// pass it to [`ScratchBuffer::escape_into`]. A scratch buffer must not be
/// shared between concurrent writers, which `&mut self` enforces.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: String,
}

impl ScratchBuffer {
    /// Creates a scratch buffer with [`SCRATCH_CAPACITY`] bytes reserved.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(SCRATCH_CAPACITY),
        }
    }

    /// Bytes currently reserved by the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Appends the JSON-escaped form of `input` to `dst`.
    pub fn escape_into(&mut self, input: &str, dst: &mut String) {
        self.buf.clear();
        self.buf.reserve(SCRATCH_CAPACITY);
        escape_chunked(input, &mut self.buf, dst);
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_chunked(input: &str, scratch: &mut String, dst: &mut String) {
    for (i, c) in input.chars().enumerate() {
        // At most FLUSH_INTERVAL chars are staged, so at most SCRATCH_CAPACITY bytes.
        if i > 0 && i & (FLUSH_INTERVAL - 1) == 0 {
            dst.push_str(scratch);
            scratch.clear();
        }
        match escape_for(c) {
            Escape::Pass => scratch.push(c),
            Escape::Named(code) => {
                scratch.push('\\');
                scratch.push(char::from(code));
            }
            Escape::Generic => {
                let value = c as usize;
                scratch.push_str("\\u00");
                scratch.push(char::from(HEX_DIGITS[value >> 4]));
                scratch.push(char::from(HEX_DIGITS[value & 0xF]));
            }
        }
    }
    dst.push_str(scratch);
    scratch.clear();
}
