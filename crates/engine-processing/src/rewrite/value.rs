use crate::codec::php::{self, PhpValue};
use model::rewrite::RewriteJob;
use tracing::trace;

/// Which representation produced a rewritten value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Serialized,
    Json,
    Plain,
}

/// Replaces `old` with `new` inside one cell value, keeping serialized and
/// JSON containers valid.
///
/// Untouched leaves of a serialized container re-encode byte for byte. JSON
/// is re-emitted by `serde_json`, so numbers and escapes elsewhere in a
/// rewritten document come out normalised (`1e5` as `100000.0`, `\u00e9`
/// as `é`).
#[derive(Debug, Clone, Copy)]
pub struct ValueRewriter<'a> {
    old: &'a str,
    new: &'a str,
}

impl<'a> ValueRewriter<'a> {
    pub fn new(old: &'a str, new: &'a str) -> Self {
        ValueRewriter { old, new }
    }

    pub fn for_job(job: &'a RewriteJob) -> Self {
        Self::new(&job.old, &job.new)
    }

    pub fn rewrite(&self, value: &str) -> String {
        self.rewrite_with_encoding(value).0
    }

    pub fn rewrite_with_encoding(&self, value: &str) -> (String, Encoding) {
        if self.old.is_empty() {
            return (value.to_string(), Encoding::Plain);
        }

        let plain = value.replace(self.old, self.new);

        if let Some(rewritten) = self.rewrite_serialized(value, php::MAX_DEPTH) {
            return (rewritten, Encoding::Serialized);
        }

        if let Some(rewritten) = self.rewrite_json(value) {
            return (rewritten, Encoding::Json);
        }

        (plain, Encoding::Plain)
    }

    /// `depth_left` is shared with serialized strings nested in leaves, so
    /// the whole chain stays within [`php::MAX_DEPTH`].
    fn rewrite_serialized(&self, value: &str, depth_left: usize) -> Option<String> {
        if depth_left == 0 || !php::looks_serialized(value) {
            return None;
        }
        let mut decoded = php::decode_within(value.as_bytes(), false, depth_left)
            .or_else(|_| php::decode_within(value.as_bytes(), true, depth_left))
            .map_err(|err| trace!(%err, "Not a serialized container"))
            .ok()?;

        if !self.replace_php(&mut decoded, depth_left) {
            return None;
        }
        let encoded = String::from_utf8(php::encode(&decoded)).ok()?;
        (encoded != value).then_some(encoded)
    }

    fn replace_php(&self, value: &mut PhpValue, depth_left: usize) -> bool {
        let depth_left = depth_left.saturating_sub(1);
        match value {
            PhpValue::Str(bytes) => self.replace_leaf(bytes, depth_left),
            PhpValue::Array(entries) | PhpValue::Object { members: entries, .. } => {
                let mut changed = false;
                for (_, entry) in entries.iter_mut() {
                    changed |= self.replace_php(entry, depth_left);
                }
                changed
            }
            _ => false,
        }
    }

    /// String leaves may themselves hold a serialized container.
    fn replace_leaf(&self, bytes: &mut Vec<u8>, depth_left: usize) -> bool {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if let Some(rewritten) = self.rewrite_serialized(text, depth_left) {
                *bytes = rewritten.into_bytes();
                return true;
            }
        }
        match replace_bytes(bytes, self.old.as_bytes(), self.new.as_bytes()) {
            Some(replaced) => {
                *bytes = replaced;
                true
            }
            None => false,
        }
    }

    fn rewrite_json(&self, value: &str) -> Option<String> {
        let trimmed = value.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return None;
        }
        let mut decoded: serde_json::Value = serde_json::from_str(value).ok()?;
        if !self.replace_json(&mut decoded) {
            return None;
        }
        let encoded = serde_json::to_string(&decoded).ok()?;
        (encoded != value).then_some(encoded)
    }

    fn replace_json(&self, value: &mut serde_json::Value) -> bool {
        match value {
            serde_json::Value::String(s) if s.contains(self.old) => {
                *s = s.replace(self.old, self.new);
                true
            }
            serde_json::Value::Array(items) => {
                let mut changed = false;
                for item in items.iter_mut() {
                    changed |= self.replace_json(item);
                }
                changed
            }
            serde_json::Value::Object(map) => {
                let mut changed = false;
                for (_, item) in map.iter_mut() {
                    changed |= self.replace_json(item);
                }
                changed
            }
            _ => false,
        }
    }
}

/// Replaces every occurrence of `needle`, or `None` when there is none.
fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut found = false;
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
            found = true;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    found.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = "http://old/x.jpg";
    const NEW: &str = "https://cdn.example.com/media/x.jpg";

    fn rewriter() -> ValueRewriter<'static> {
        ValueRewriter::new(OLD, NEW)
    }

    #[test]
    fn plain_strings_are_substring_replaced() {
        let (out, encoding) =
            rewriter().rewrite_with_encoding(r#"<img src="http://old/x.jpg"> and http://old/x.jpg"#);
        assert_eq!(encoding, Encoding::Plain);
        assert_eq!(out.matches(NEW).count(), 2);
    }

    #[test]
    fn serialized_leaf_is_rewritten_and_lengths_fixed() {
        let value = r#"a:3:{s:4:"path";s:16:"http://old/x.jpg";s:5:"width";i:300;s:5:"ratio";d:1.50;}"#;
        let (out, encoding) = rewriter().rewrite_with_encoding(value);
        assert_eq!(encoding, Encoding::Serialized);

        let decoded = php::decode(out.as_bytes()).unwrap();
        assert_eq!(decoded.get("path").and_then(PhpValue::as_str), Some(NEW));
        assert!(out.contains(r#"s:5:"width";i:300;"#));
        assert!(out.contains(r#"s:5:"ratio";d:1.50;"#));
    }

    #[test]
    fn nested_serialized_strings_are_rewritten() {
        let inner = r#"a:1:{i:0;s:16:"http://old/x.jpg";}"#;
        let value = format!(r#"a:1:{{s:5:"inner";s:{}:"{inner}";}}"#, inner.len());
        let out = rewriter().rewrite(&value);

        let outer = php::decode(out.as_bytes()).unwrap();
        let inner_raw = outer.get("inner").and_then(PhpValue::as_str).unwrap();
        let inner = php::decode(inner_raw.as_bytes()).unwrap();
        assert_eq!(inner.entries()[0].1.as_str(), Some(NEW));
    }

    #[test]
    fn json_leaves_are_rewritten_in_order() {
        let value = r#"{"z":"http://old/x.jpg","a":[1,"keep",{"u":"http://old/x.jpg"}]}"#;
        let (out, encoding) = rewriter().rewrite_with_encoding(value);
        assert_eq!(encoding, Encoding::Json);
        assert_eq!(
            out,
            format!(r#"{{"z":"{NEW}","a":[1,"keep",{{"u":"{NEW}"}}]}}"#)
        );
    }

    #[test]
    fn malformed_containers_fall_back_to_plain() {
        let value = r#"{"broken": "http://old/x.jpg""#;
        let (out, encoding) = rewriter().rewrite_with_encoding(value);
        assert_eq!(encoding, Encoding::Plain);
        assert_eq!(out, value.replace(OLD, NEW));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        for value in [
            r#"a:1:{s:4:"path";s:16:"http://old/x.jpg";}"#,
            r#"["http://old/x.jpg"]"#,
            "see http://old/x.jpg",
        ] {
            let once = rewriter().rewrite(value);
            assert_eq!(rewriter().rewrite(&once), once);
        }
    }

    #[test]
    fn serialized_false_without_match_is_unchanged() {
        assert_eq!(rewriter().rewrite("b:0;"), "b:0;");
    }

    #[test]
    fn deeply_nested_serialized_values_fall_back_to_plain() {
        let levels = php::MAX_DEPTH * 4;
        let value = format!(
            r#"{}s:16:"http://old/x.jpg";{}"#,
            "a:1:{i:0;".repeat(levels),
            "}".repeat(levels)
        );
        let (out, encoding) = rewriter().rewrite_with_encoding(&value);
        assert_eq!(encoding, Encoding::Plain);
        assert_eq!(out, value.replace(OLD, NEW));
    }

    #[test]
    fn long_chains_of_serialized_strings_stay_bounded() {
        let mut value = format!(r#"s:16:"{OLD}";"#);
        for _ in 0..php::MAX_DEPTH * 4 {
            value = format!(r#"s:{}:"{value}";"#, value.len());
        }
        let (out, encoding) = rewriter().rewrite_with_encoding(&value);
        assert_eq!(encoding, Encoding::Serialized);
        assert!(out.contains(NEW));
        assert!(!out.contains(OLD));
        assert!(php::decode(out.as_bytes()).is_ok());
    }

    #[test]
    fn json_rewrite_normalises_untouched_escapes() {
        let value = r#"{"u":"http://old/x.jpg","name":"caf\u00e9"}"#;
        let (out, encoding) = rewriter().rewrite_with_encoding(value);
        assert_eq!(encoding, Encoding::Json);
        assert_eq!(out, format!(r#"{{"u":"{NEW}","name":"café"}}"#));
    }
}
