//! Formatter contract: the two caller-supplied rendering functions.
//!
//! `format` renders one decoded record; `finish` renders the trailer once at
//! close, against a record that was never decoded into. Both return
//! `Option<Vec<u8>>`, where `None` means "could not render" and is always
//! fatal to the sink. Neither can keep the record borrow past the call,
//! which matters because the worker overwrites the record on the next frame.

use crate::record::JsonRecord;

/// Renders one decoded record to output bytes.
///
/// Plain closures implement this through the blanket impl:
///
/// ```
/// use textsink_core::{format::TextFormatter, JsonRecord};
///
/// let f = |rec: &JsonRecord| Some(format!("{}\n", rec.value()).into_bytes());
/// assert!(f.format(&JsonRecord::default()).is_some());
/// ```
pub trait TextFormatter<R>: Send + Sync {
    fn format(&self, record: &R) -> Option<Vec<u8>>;
}

impl<R, F> TextFormatter<R> for F
where
    F: Fn(&R) -> Option<Vec<u8>> + Send + Sync,
{
    fn format(&self, record: &R) -> Option<Vec<u8>> {
        self(record)
    }
}

/// Renders the trailer written once when the sink closes.
pub trait TextFinisher<R>: Send + Sync {
    fn finish(&self, empty: &R) -> Option<Vec<u8>>;
}

impl<R, F> TextFinisher<R> for F
where
    F: Fn(&R) -> Option<Vec<u8>> + Send + Sync,
{
    fn finish(&self, empty: &R) -> Option<Vec<u8>> {
        self(empty)
    }
}

/// Finisher for formats that need no trailer.
pub fn no_trailer<R>(_empty: &R) -> Option<Vec<u8>> {
    Some(Vec::new())
}

/// One compact JSON document per line.
pub fn json_lines(rec: &JsonRecord) -> Option<Vec<u8>> {
    let mut out = serde_json::to_vec(rec.value()).ok()?;
    out.push(b'\n');
    Some(out)
}

/// Each record as its own `---` prefixed YAML document.
pub fn yaml_documents(rec: &JsonRecord) -> Option<Vec<u8>> {
    let body = serde_yaml::to_string(rec.value()).ok()?;
    let mut out = String::with_capacity(body.len() + 4);
    out.push_str("---\n");
    out.push_str(&body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Some(out.into_bytes())
}

/// YAML end-of-stream marker, paired with [`yaml_documents`].
pub fn yaml_end(_empty: &JsonRecord) -> Option<Vec<u8>> {
    Some(b"...\n".to_vec())
}
