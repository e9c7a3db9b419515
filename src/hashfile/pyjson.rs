//! hashfile::pyjson
//!
//! JSON encoding byte-compatible with the default Python encoder
//! (`json.dumps(obj, sort_keys=True)`).
//!
//! Tree object ids are digests of their serialized listing, so the exact
//! bytes matter: `", "` and `": "` separators, and every character outside
//! printable ASCII escaped as lowercase `\uXXXX` (UTF-16 surrogate pairs for
//! astral characters). Key order comes from `serde_json::Map`, which sorts.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::Formatter;

#[derive(Debug, Default, Clone, Copy)]
pub struct PyFormatter;

impl Formatter for PyFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` the way Python's `json.dumps(..., sort_keys=True)` does.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PyFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// [`to_vec`] as a `String`.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let bytes = to_vec(value)?;
    // Output is pure ASCII
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn separators_and_sorting() {
        let value = json!([{"relpath": "foo", "md5": "abc"}, {"b": 1, "a": [1, 2]}]);
        assert_eq!(
            to_string(&value).unwrap(),
            r#"[{"md5": "abc", "relpath": "foo"}, {"a": [1, 2], "b": 1}]"#
        );
    }

    #[test]
    fn non_ascii_escaped() {
        assert_eq!(to_string("caf\u{e9}").unwrap(), r#""caf\u00e9""#);
        assert_eq!(to_string("\u{7f}").unwrap(), r#""\u007f""#);
        assert_eq!(to_string("\u{1f600}").unwrap(), r#""\ud83d\ude00""#);
    }

    #[test]
    fn control_chars_escaped_like_python() {
        assert_eq!(to_string("a\nb\t\u{1}").unwrap(), r#""a\nb\t\u0001""#);
        assert_eq!(to_string("q\"b\\").unwrap(), r#""q\"b\\""#);
    }

    #[test]
    fn empty_containers() {
        assert_eq!(to_string(&json!([])).unwrap(), "[]");
        assert_eq!(to_string(&json!({})).unwrap(), "{}");
    }
}
