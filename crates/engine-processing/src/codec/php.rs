//! Codec for the host language's native serialization format.
//!
//! ```text
//! N;                      null
//! b:1;                    bool
//! i:42;                   int
//! d:0.5;                  float (raw text kept verbatim)
//! s:5:"hello";            byte string, length in bytes
//! a:1:{i:0;s:1:"x";}      ordered map with int or string keys
//! O:8:"stdClass":1:{...}  object with members
//! C:3:"Foo":4:{....}      object with custom payload
//! E:7:"Foo:Bar";          enum case
//! r:1; R:1;               back references
//! ```
//!
//! Strings are kept as bytes because declared lengths count bytes, not
//! characters. Decoding must consume the whole input.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PhpValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Raw textual form, so untouched floats re-encode byte for byte.
    Float(String),
    Str(Vec<u8>),
    Array(Vec<(PhpKey, PhpValue)>),
    Object {
        class: Vec<u8>,
        members: Vec<(PhpKey, PhpValue)>,
    },
    Custom {
        class: Vec<u8>,
        data: Vec<u8>,
    },
    Enum(Vec<u8>),
    Ref(i64),
    RefStrong(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhpKey {
    Int(i64),
    Str(Vec<u8>),
}

impl PhpKey {
    pub fn matches(&self, name: &str) -> bool {
        matches!(self, PhpKey::Str(s) if s == name.as_bytes())
    }
}

impl PhpValue {
    /// Looks up a string-keyed entry of an array or object.
    pub fn get(&self, name: &str) -> Option<&PhpValue> {
        let entries = match self {
            PhpValue::Array(entries) => entries,
            PhpValue::Object { members, .. } => members,
            _ => return None,
        };
        entries
            .iter()
            .find(|(key, _)| key.matches(name))
            .map(|(_, value)| value)
    }

    /// Inserts or replaces a string-keyed entry of an array.
    pub fn set(&mut self, name: &str, value: PhpValue) -> bool {
        let PhpValue::Array(entries) = self else {
            return false;
        };
        match entries.iter_mut().find(|(key, _)| key.matches(name)) {
            Some((_, slot)) => *slot = value,
            None => entries.push((PhpKey::Str(name.as_bytes().to_vec()), value)),
        }
        true
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PhpValue::Str(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[(PhpKey, PhpValue)] {
        match self {
            PhpValue::Array(entries) => entries,
            PhpValue::Object { members, .. } => members,
            _ => &[],
        }
    }

    pub fn string(value: &str) -> Self {
        PhpValue::Str(value.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub position: usize,
    pub reason: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.reason, self.position)
    }
}

impl std::error::Error for DecodeError {}

/// Cheap pre-check before attempting a full decode.
pub fn looks_serialized(value: &str) -> bool {
    let value = value.trim();
    if value == "N;" {
        return true;
    }
    let bytes = value.as_bytes();
    if bytes.len() < 4 || bytes[1] != b':' {
        return false;
    }
    match bytes[0] {
        b'a' | b'O' | b'C' => bytes[bytes.len() - 1] == b'}',
        b's' | b'E' => bytes.ends_with(b"\";"),
        b'b' | b'i' | b'd' | b'r' | b'R' => bytes[bytes.len() - 1] == b';',
        _ => false,
    }
}

/// Deepest array or object nesting accepted by [`decode`].
pub const MAX_DEPTH: usize = 128;

pub fn decode(input: &[u8]) -> Result<PhpValue, DecodeError> {
    decode_within(input, false, MAX_DEPTH)
}

/// Like [`decode`], but tolerates string lengths that do not match their
/// contents, as left behind by earlier naive search-and-replace passes.
pub fn decode_lenient(input: &[u8]) -> Result<PhpValue, DecodeError> {
    decode_within(input, true, MAX_DEPTH)
}

/// Decodes with at most `max_depth` levels of container nesting.
pub fn decode_within(
    input: &[u8],
    lenient: bool,
    max_depth: usize,
) -> Result<PhpValue, DecodeError> {
    Parser::new(input, lenient, max_depth).parse_document()
}

pub fn encode(value: &PhpValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_str(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(format!("s:{}:\"", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\";");
}

fn write_key(out: &mut Vec<u8>, key: &PhpKey) {
    match key {
        PhpKey::Int(i) => out.extend_from_slice(format!("i:{i};").as_bytes()),
        PhpKey::Str(s) => write_str(out, s),
    }
}

fn write_entries(out: &mut Vec<u8>, entries: &[(PhpKey, PhpValue)]) {
    out.extend_from_slice(format!("{}:{{", entries.len()).as_bytes());
    for (key, value) in entries {
        write_key(out, key);
        write_value(out, value);
    }
    out.push(b'}');
}

fn write_value(out: &mut Vec<u8>, value: &PhpValue) {
    match value {
        PhpValue::Null => out.extend_from_slice(b"N;"),
        PhpValue::Bool(b) => out.extend_from_slice(if *b { b"b:1;" } else { b"b:0;" }),
        PhpValue::Int(i) => out.extend_from_slice(format!("i:{i};").as_bytes()),
        PhpValue::Float(raw) => out.extend_from_slice(format!("d:{raw};").as_bytes()),
        PhpValue::Str(s) => write_str(out, s),
        PhpValue::Array(entries) => {
            out.extend_from_slice(b"a:");
            write_entries(out, entries);
        }
        PhpValue::Object { class, members } => {
            out.extend_from_slice(format!("O:{}:\"", class.len()).as_bytes());
            out.extend_from_slice(class);
            out.extend_from_slice(b"\":");
            write_entries(out, members);
        }
        PhpValue::Custom { class, data } => {
            out.extend_from_slice(format!("C:{}:\"", class.len()).as_bytes());
            out.extend_from_slice(class);
            out.extend_from_slice(format!("\":{}:{{", data.len()).as_bytes());
            out.extend_from_slice(data);
            out.push(b'}');
        }
        PhpValue::Enum(name) => {
            out.extend_from_slice(format!("E:{}:\"", name.len()).as_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(b"\";");
        }
        PhpValue::Ref(i) => out.extend_from_slice(format!("r:{i};").as_bytes()),
        PhpValue::RefStrong(i) => out.extend_from_slice(format!("R:{i};").as_bytes()),
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    lenient: bool,
    depth_left: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8], lenient: bool, max_depth: usize) -> Self {
        Parser {
            input,
            pos: 0,
            lenient,
            depth_left: max_depth,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn parse_document(mut self) -> Result<PhpValue, DecodeError> {
        let value = self.parse_value()?;
        if self.pos != self.input.len() {
            return Err(self.error("trailing data"));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), DecodeError> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}'", byte as char))),
        }
    }

    /// Reads bytes up to (not including) `terminator` and consumes the terminator.
    fn read_until(&mut self, terminator: u8) -> Result<&'a [u8], DecodeError> {
        let input: &'a [u8] = self.input;
        let rest = &input[self.pos..];
        let Some(len) = rest.iter().position(|&b| b == terminator) else {
            return Err(self.error(format!("missing '{}'", terminator as char)));
        };
        self.pos += len + 1;
        Ok(&rest[..len])
    }

    fn read_int(&mut self, terminator: u8) -> Result<i64, DecodeError> {
        let start = self.pos;
        let raw = self.read_until(terminator)?;
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(DecodeError {
                position: start,
                reason: "invalid integer".into(),
            })
    }

    fn read_len(&mut self) -> Result<usize, DecodeError> {
        let start = self.pos;
        let value = self.read_int(b':')?;
        usize::try_from(value).map_err(|_| DecodeError {
            position: start,
            reason: "negative length".into(),
        })
    }

    fn read_quoted(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.expect(b'"')?;
        let end = self.pos + len;
        if end > self.input.len() {
            return Err(self.error("length exceeds input"));
        }
        let input: &'a [u8] = self.input;
        let bytes = &input[self.pos..end];
        self.pos = end;
        self.expect(b'"')?;
        Ok(bytes)
    }

    fn parse_string_body(&mut self, declared: usize) -> Result<Vec<u8>, DecodeError> {
        self.expect(b'"')?;
        let start = self.pos;
        let end = start + declared;
        if self.input.get(end..end + 2) == Some(&b"\";"[..]) {
            self.pos = end + 2;
            return Ok(self.input[start..end].to_vec());
        }
        if !self.lenient {
            return Err(self.error("string length mismatch"));
        }

        // Take the first `";` that is followed by something a value can be followed by.
        let mut search = start;
        while let Some(offset) = self.input[search..].windows(2).position(|w| w == b"\";") {
            let candidate = search + offset;
            if self.plausible_continuation(candidate + 2) {
                self.pos = candidate + 2;
                return Ok(self.input[start..candidate].to_vec());
            }
            search = candidate + 1;
        }
        Err(self.error("unterminated string"))
    }

    fn plausible_continuation(&self, at: usize) -> bool {
        match self.input.get(at..) {
            None | Some([]) => true,
            Some([b'}', ..]) => true,
            Some([b'N', b';', ..]) => true,
            Some([tag, b':', ..]) => b"sabiOdCErR".contains(tag),
            _ => false,
        }
    }

    fn parse_entries(&mut self) -> Result<Vec<(PhpKey, PhpValue)>, DecodeError> {
        let Some(left) = self.depth_left.checked_sub(1) else {
            return Err(self.error("nesting too deep"));
        };
        self.depth_left = left;
        let count = self.read_len()?;
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = match self.parse_value()? {
                PhpValue::Int(i) => PhpKey::Int(i),
                PhpValue::Str(s) => PhpKey::Str(s),
                _ => return Err(self.error("invalid key type")),
            };
            let value = self.parse_value()?;
            entries.push((key, value));
        }
        self.expect(b'}')?;
        self.depth_left += 1;
        Ok(entries)
    }

    fn parse_value(&mut self) -> Result<PhpValue, DecodeError> {
        let Some(tag) = self.peek() else {
            return Err(self.error("unexpected end of input"));
        };
        self.pos += 1;

        if tag == b'N' {
            self.expect(b';')?;
            return Ok(PhpValue::Null);
        }
        self.expect(b':')?;

        match tag {
            b'b' => match self.read_until(b';')? {
                b"0" => Ok(PhpValue::Bool(false)),
                b"1" => Ok(PhpValue::Bool(true)),
                _ => Err(self.error("invalid boolean")),
            },
            b'i' => Ok(PhpValue::Int(self.read_int(b';')?)),
            b'd' => {
                let raw = self.read_until(b';')?;
                let text = std::str::from_utf8(raw).map_err(|_| self.error("invalid float"))?;
                let valid = matches!(text, "INF" | "-INF" | "NAN") || text.parse::<f64>().is_ok();
                if !valid {
                    return Err(self.error("invalid float"));
                }
                Ok(PhpValue::Float(text.to_string()))
            }
            b's' => {
                let len = self.read_len()?;
                Ok(PhpValue::Str(self.parse_string_body(len)?))
            }
            b'a' => Ok(PhpValue::Array(self.parse_entries()?)),
            b'O' => {
                let len = self.read_len()?;
                let class = self.read_quoted(len)?.to_vec();
                self.expect(b':')?;
                let members = self.parse_entries()?;
                Ok(PhpValue::Object { class, members })
            }
            b'C' => {
                let len = self.read_len()?;
                let class = self.read_quoted(len)?.to_vec();
                self.expect(b':')?;
                let data_len = self.read_len()?;
                self.expect(b'{')?;
                let end = self.pos + data_len;
                if end > self.input.len() {
                    return Err(self.error("length exceeds input"));
                }
                let data = self.input[self.pos..end].to_vec();
                self.pos = end;
                self.expect(b'}')?;
                Ok(PhpValue::Custom { class, data })
            }
            b'E' => {
                let len = self.read_len()?;
                let name = self.read_quoted(len)?.to_vec();
                self.expect(b';')?;
                Ok(PhpValue::Enum(name))
            }
            b'r' => Ok(PhpValue::Ref(self.read_int(b';')?)),
            b'R' => Ok(PhpValue::RefStrong(self.read_int(b';')?)),
            other => Err(DecodeError {
                position: self.pos - 2,
                reason: format!("unknown type tag '{}'", other as char),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_is_a_successful_decode() {
        assert_eq!(decode(b"b:0;"), Ok(PhpValue::Bool(false)));
        assert_eq!(decode(b"a:0:{}"), Ok(PhpValue::Array(vec![])));
        assert!(decode(b"b:0").is_err());
    }

    #[test]
    fn decodes_nested_arrays() {
        let raw = br#"a:2:{s:4:"file";s:14:"2024/05/a.jpg";s:5:"sizes";a:1:{s:5:"thumb";a:1:{s:4:"file";s:11:"a-50x50.jpg";}}}"#;
        let value = decode(raw);
        assert!(value.is_err(), "declared length 14 does not match 13 bytes");

        let raw = br#"a:2:{s:4:"file";s:13:"2024/05/a.jpg";s:5:"sizes";a:1:{s:5:"thumb";a:1:{s:4:"file";s:11:"a-50x50.jpg";}}}"#;
        let value = decode(raw).unwrap();
        assert_eq!(value.get("file").and_then(PhpValue::as_str), Some("2024/05/a.jpg"));
        let thumb = value.get("sizes").and_then(|s| s.get("thumb")).unwrap();
        assert_eq!(thumb.get("file").and_then(PhpValue::as_str), Some("a-50x50.jpg"));
        assert_eq!(encode(&value), raw.to_vec());
    }

    #[test]
    fn keeps_float_text_and_objects_byte_identical() {
        let raw = br#"O:8:"stdClass":3:{s:1:"a";d:0.1000;s:1:"b";E:7:"Foo:Bar";s:1:"c";r:1;}"#;
        let value = decode(raw).unwrap();
        assert_eq!(encode(&value), raw.to_vec());
    }

    #[test]
    fn counts_string_length_in_bytes() {
        let raw = "s:5:\"héllo\";".replace("5", "6");
        let value = decode(raw.as_bytes()).unwrap();
        assert_eq!(value.as_str(), Some("héllo"));
    }

    #[test]
    fn rejects_trailing_data() {
        assert!(decode(b"i:1;i:2;").is_err());
        assert!(decode(b"").is_err());
    }

    #[test]
    fn lenient_decode_repairs_lengths() {
        let raw = br#"a:1:{s:3:"url";s:20:"http://old/img.jpg";}"#;
        assert!(decode(raw).is_err());

        let value = decode_lenient(raw).unwrap();
        assert_eq!(
            value.get("url").and_then(PhpValue::as_str),
            Some("http://old/img.jpg")
        );
        assert_eq!(
            encode(&value),
            br#"a:1:{s:3:"url";s:18:"http://old/img.jpg";}"#.to_vec()
        );
    }

    #[test]
    fn set_replaces_or_appends() {
        let mut value = decode(br#"a:1:{s:1:"k";i:1;}"#).unwrap();
        assert!(value.set("k", PhpValue::Int(2)));
        assert!(value.set("n", PhpValue::Null));
        assert_eq!(encode(&value), br#"a:2:{s:1:"k";i:2;s:1:"n";N;}"#.to_vec());
    }

    #[test]
    fn serialized_heuristic() {
        assert!(looks_serialized("a:1:{i:0;s:1:\"x\";}"));
        assert!(looks_serialized("b:0;"));
        assert!(looks_serialized("N;"));
        assert!(!looks_serialized("{\"a\":1}"));
        assert!(!looks_serialized("http://old/img.jpg"));
    }

    fn nested(levels: usize) -> String {
        format!(
            "{}s:16:\"http://old/x.jpg\";{}",
            "a:1:{i:0;".repeat(levels),
            "}".repeat(levels)
        )
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = nested(MAX_DEPTH * 4);
        for result in [decode(deep.as_bytes()), decode_lenient(deep.as_bytes())] {
            assert_eq!(result.unwrap_err().reason, "nesting too deep");
        }
    }

    #[test]
    fn accepts_nesting_up_to_the_limit() {
        assert!(decode(nested(MAX_DEPTH).as_bytes()).is_ok());
        assert!(decode(nested(MAX_DEPTH + 1).as_bytes()).is_err());
        assert!(decode_within(nested(3).as_bytes(), false, 2).is_err());
    }
}
