#![no_main]
use ecsjson::{ScratchBuffer, escape};
use libfuzzer_sys::fuzz_target;

fn check(input: &str) {
    let escaped = escape(input);
    let decoded: String = serde_json::from_str(&format!("\"{escaped}\"")).expect("escaped text must be a valid JSON string body");
    assert_eq!(decoded, input);

    let mut scratch = ScratchBuffer::new();
    let mut owned = String::new();
    scratch.escape_into(input, &mut owned);
    assert_eq!(owned, escaped);
}

fuzz_target!(|input: &str| check(input));
