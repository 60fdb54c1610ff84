//! A `serde_json` formatter that emits canonical JSON: no insignificant
//! whitespace, object members sorted by their key bytes, minimal string
//! escaping, and shortest round-trip numbers. Signature computations in
//! `trustframe` are only meaningful over this encoding.
//!
//! Usage mirrors any other `serde_json::ser::Formatter`:
//!
//! ```
//! use trustframe_cjson::CanonicalFormatter;
//! use serde_json::json;
//!
//! let value = json!({"b": 1, "a": 2});
//! let mut buf = Vec::new();
//! let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
//! serde::Serialize::serialize(&value, &mut ser).unwrap();
//! assert_eq!(buf, br#"{"a":2,"b":1}"#);
//! ```

use serde::Serialize;
use serde_json::ser::{CharEscape, Formatter};
use std::fmt;
use std::io;

mod normalize;

pub use normalize::normalize_nfc;

/// Marker text stashed inside an `io::Error` so the top-level entry points
/// can tell a deliberate canonicalization failure apart from a genuine I/O
/// error bubbling up through the `Write` impl (there is none in practice,
/// since we only ever write into an in-memory `Vec<u8>`, but the formatter
/// trait doesn't know that).
const NON_FINITE_MARKER: &str = "trustframe-cjson: non-finite number";

/// Errors produced while encoding a value as canonical JSON.
#[derive(Debug)]
pub enum Error {
    /// A float was NaN or +/-infinity; canonical JSON has no representation
    /// for either.
    NonFiniteNumber,
    /// A map was serialized whose keys are not strings.
    NonStringKey,
    /// Any other `serde_json` failure (a `Serialize` impl returned an error,
    /// or the value contains data `serde_json` itself rejects).
    Serde(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NonFiniteNumber => write!(f, "cannot canonicalize a non-finite number"),
            Error::NonStringKey => write!(f, "cannot canonicalize a map with non-string keys"),
            Error::Serde(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    fn from_serde(err: serde_json::Error) -> Self {
        let text = err.to_string();
        if text.contains(NON_FINITE_MARKER) {
            Error::NonFiniteNumber
        } else if text.contains("key must be a string") {
            Error::NonStringKey
        } else {
            Error::Serde(err)
        }
    }
}

/// Serialize `value` as canonical JSON bytes.
pub fn to_canonical_vec<T>(value: &T) -> Result<Vec<u8>, Error>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
    value.serialize(&mut ser).map_err(Error::from_serde)?;
    Ok(buf)
}

/// Serialize `value` as a canonical JSON `String`. The output is ASCII-safe
/// UTF-8 by construction (canonical JSON never emits raw non-ASCII bytes
/// unescaped... actually it does for printable non-ASCII text, since only
/// control characters, `"`, and `\` are escaped), so this is just a
/// `String::from_utf8` that cannot fail.
pub fn to_canonical_string<T>(value: &T) -> Result<String, Error>
where
    T: Serialize + ?Sized,
{
    let bytes = to_canonical_vec(value)?;
    Ok(String::from_utf8(bytes).expect("canonical JSON output is always valid UTF-8"))
}

/// One level of nested container state the formatter is currently buffering.
/// Top-level scalars (no enclosing array or object) bypass this stack
/// entirely and are written straight to the underlying writer.
enum Frame {
    Array {
        buf: Vec<u8>,
    },
    Object {
        in_value: bool,
        key: Vec<u8>,
        value: Vec<u8>,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    },
}

/// A [`Formatter`] that defers every in-progress array or object into its
/// own buffer so object members can be re-sorted by key before they are
/// written out. `serde_json::Serializer` mediates all output through a
/// `Formatter`, so every byte of the final document passes through here.
#[derive(Default)]
pub struct CanonicalFormatter {
    stack: Vec<Frame>,
}

impl CanonicalFormatter {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Route `bytes` into whatever the current top-of-stack frame is
    /// collecting (an array's tail, an object's in-progress key, or an
    /// object's in-progress value), or straight to `writer` if there is no
    /// enclosing container.
    fn push_bytes<W: ?Sized + io::Write>(&mut self, writer: &mut W, bytes: &[u8]) -> io::Result<()> {
        match self.stack.last_mut() {
            None => writer.write_all(bytes),
            Some(Frame::Array { buf }) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Some(Frame::Object { in_value, key, value, .. }) => {
                if *in_value {
                    value.extend_from_slice(bytes);
                } else {
                    key.extend_from_slice(bytes);
                }
                Ok(())
            }
        }
    }
}

macro_rules! write_int {
    ($name:ident, $ty:ty) => {
        fn $name<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: $ty) -> io::Result<()> {
            self.push_bytes(writer, value.to_string().as_bytes())
        }
    };
}

impl Formatter for CanonicalFormatter {
    fn write_null<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.push_bytes(writer, b"null")
    }

    fn write_bool<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: bool) -> io::Result<()> {
        self.push_bytes(writer, if value { b"true" } else { b"false" })
    }

    write_int!(write_i8, i8);
    write_int!(write_i16, i16);
    write_int!(write_i32, i32);
    write_int!(write_i64, i64);
    write_int!(write_i128, i128);
    write_int!(write_u8, u8);
    write_int!(write_u16, u16);
    write_int!(write_u32, u32);
    write_int!(write_u64, u64);
    write_int!(write_u128, u128);

    fn write_f32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f32) -> io::Result<()> {
        self.write_f64(writer, f64::from(value))
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        if !value.is_finite() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, NON_FINITE_MARKER));
        }
        // Whole numbers in integer range are written without a trailing
        // ".0" or exponent; everything else gets ryu's shortest
        // round-trip decimal.
        let text = if value.fract() == 0.0 && value.abs() < 1e18 {
            format!("{}", value as i64)
        } else {
            let mut buf = ryu::Buffer::new();
            buf.format_finite(value).to_string()
        };
        self.push_bytes(writer, text.as_bytes())
    }

    fn begin_string<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.push_bytes(writer, b"\"")
    }

    fn end_string<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.push_bytes(writer, b"\"")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        self.push_bytes(writer, fragment.as_bytes())
    }

    fn write_char_escape<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        char_escape: CharEscape,
    ) -> io::Result<()> {
        // Canonical JSON escapes only `"`, `\`, and control characters
        // (as \u00XX, never the short forms \n \t \r \b \f).
        match char_escape {
            CharEscape::Quote => self.push_bytes(writer, b"\\\""),
            CharEscape::ReverseSolidus => self.push_bytes(writer, b"\\\\"),
            CharEscape::Solidus => self.push_bytes(writer, b"/"),
            CharEscape::Backspace => self.push_bytes(writer, b"\\u0008"),
            CharEscape::FormFeed => self.push_bytes(writer, b"\\u000c"),
            CharEscape::LineFeed => self.push_bytes(writer, b"\\u000a"),
            CharEscape::CarriageReturn => self.push_bytes(writer, b"\\u000d"),
            CharEscape::Tab => self.push_bytes(writer, b"\\u0009"),
            CharEscape::AsciiControl(byte) => {
                let escaped = format!("\\u{byte:04x}");
                self.push_bytes(writer, escaped.as_bytes())
            }
        }
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.stack.push(Frame::Array { buf: vec![b'['] });
        Ok(())
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        match self.stack.pop() {
            Some(Frame::Array { mut buf }) => {
                buf.push(b']');
                self.push_bytes(writer, &buf)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "canonical formatter: end_array without matching begin_array",
            )),
        }
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            self.push_bytes(writer, b",")?;
        }
        Ok(())
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.stack.push(Frame::Object {
            in_value: false,
            key: Vec::new(),
            value: Vec::new(),
            entries: Vec::new(),
        });
        Ok(())
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        match self.stack.pop() {
            Some(Frame::Object { mut entries, .. }) => {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                let mut out = Vec::with_capacity(
                    entries.iter().map(|(k, v)| k.len() + v.len() + 2).sum::<usize>() + 2,
                );
                out.push(b'{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend_from_slice(k);
                    out.push(b':');
                    out.extend_from_slice(v);
                }
                out.push(b'}');
                self.push_bytes(writer, &out)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "canonical formatter: end_object without matching begin_object",
            )),
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        _writer: &mut W,
        _first: bool,
    ) -> io::Result<()> {
        if let Some(Frame::Object { in_value, .. }) = self.stack.last_mut() {
            *in_value = false;
        }
        Ok(())
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        if let Some(Frame::Object { in_value, .. }) = self.stack.last_mut() {
            *in_value = true;
        }
        Ok(())
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        if let Some(Frame::Object { in_value, key, value, entries }) = self.stack.last_mut() {
            entries.push((std::mem::take(key), std::mem::take(value)));
            *in_value = false;
        }
        Ok(())
    }
}
