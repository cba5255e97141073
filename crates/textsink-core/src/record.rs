//! The reusable decode target fed to the text formatter.

use serde_json::Value;

use crate::error::DecodeError;

/// A decode target that is reused for every frame the worker sees.
///
/// The worker owns exactly one instance for its whole lifetime and calls
/// [`decode_in_place`](Record::decode_in_place) for each frame, so every
/// field must be overwritten on each decode. `Default` must produce the
/// "never decoded into" record handed to the finish function at close.
pub trait Record: Default + Send + 'static {
    fn decode_in_place(&mut self, frame: &[u8]) -> Result<(), DecodeError>;
}

/// Reference [`Record`] holding one JSON document per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRecord {
    value: Value,
}

impl JsonRecord {
    /// The most recently decoded document. `Value::Null` until the first decode.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// `true` if nothing has been decoded into this record yet.
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }
}

impl Record for JsonRecord {
    fn decode_in_place(&mut self, frame: &[u8]) -> Result<(), DecodeError> {
        if frame.is_empty() {
            return Err(DecodeError::Malformed {
                reason: "empty frame".into(),
            });
        }
        // Parse before assigning so a failed decode never leaves a half-written value.
        self.value = serde_json::from_slice(frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_overwrites_previous_value() {
        let mut rec = JsonRecord::default();
        assert!(rec.is_empty());

        rec.decode_in_place(br#"{"qname":"example.com.","qtype":"A"}"#)
            .unwrap();
        assert_eq!(rec.value()["qname"], "example.com.");

        rec.decode_in_place(br#"{"rcode":"NXDOMAIN"}"#).unwrap();
        assert_eq!(rec.value(), &json!({"rcode": "NXDOMAIN"}));
    }

    #[test]
    fn bad_json_is_a_decode_error() {
        let mut rec = JsonRecord::default();
        rec.decode_in_place(b"[1,2]").unwrap();
        let err = rec.decode_in_place(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert_eq!(rec.value(), &json!([1, 2]));
    }

    #[test]
    fn empty_frame_is_malformed() {
        let mut rec = JsonRecord::default();
        assert!(matches!(
            rec.decode_in_place(b""),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
