//! Purpose: Convert native values to the wire representation and back.
//! Exports: `marshal_value`, `unmarshal_value`, `marshal_document`, `unmarshal_document`.
//! Role: The only place that knows about tagged records and the Latin-9 text policy.
//! Invariants: Timestamps travel as `{"__type__": "datetime", "value": <RFC 3339>}`.
//! Invariants: Binary payloads travel as `{"__type__": "binary", "value": <base64>}`.
//! Invariants: Text (values and keys) is restricted to Latin-9 on the way out and
//! left alone on the way in; the outbound loss is not undone.
//! Invariants: Attachments marshal as plain binary; their id and filename stay local.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Map, Number, Value as Json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::error::{Error, ErrorKind};
use super::latin9;
use super::value::{Document, Value};

pub const TYPE_KEY: &str = "__type__";
pub const VALUE_KEY: &str = "value";
pub const DATETIME_TAG: &str = "datetime";
pub const BINARY_TAG: &str = "binary";

pub type WireDocument = Map<String, Json>;

pub fn marshal_value(value: &Value) -> Result<Json, Error> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(value) => Ok(Json::Bool(*value)),
        Value::Int(value) => Ok(Json::Number(Number::from(*value))),
        Value::Float(value) => Number::from_f64(*value).map(Json::Number).ok_or_else(|| {
            Error::new(ErrorKind::Marshalling)
                .with_message(format!("non-finite float {value} cannot be sent"))
        }),
        Value::Text(text) => Ok(Json::String(latin9::to_latin9(text))),
        Value::Bytes(data) => Ok(binary_record(data)),
        Value::File(attachment) => Ok(binary_record(&attachment.data)),
        Value::Timestamp(ts) => datetime_record(ts),
        Value::List(items) => items
            .iter()
            .map(marshal_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Value::Map(map) => marshal_document(map).map(Json::Object),
    }
}

pub fn marshal_document(doc: &Document) -> Result<WireDocument, Error> {
    let mut out = Map::new();
    for (key, value) in doc {
        let key = latin9::to_latin9(key);
        if key == TYPE_KEY {
            return Err(Error::new(ErrorKind::Marshalling)
                .with_message(format!("`{TYPE_KEY}` is reserved for tagged records")));
        }
        out.insert(key, marshal_value(value)?);
    }
    Ok(out)
}

pub fn marshal_args(args: &[Value]) -> Result<Vec<Json>, Error> {
    args.iter().map(marshal_value).collect()
}

pub fn unmarshal_value(wire: &Json) -> Result<Value, Error> {
    match wire {
        Json::Null => Ok(Value::Null),
        Json::Bool(value) => Ok(Value::Bool(*value)),
        Json::Number(number) => Ok(number_value(number)),
        Json::String(text) => Ok(Value::Text(text.clone())),
        Json::Array(items) => items
            .iter()
            .map(unmarshal_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Json::Object(map) => {
            if map.contains_key(TYPE_KEY) {
                unmarshal_tagged(map)
            } else {
                unmarshal_document(map).map(Value::Map)
            }
        }
    }
}

pub fn unmarshal_document(wire: &WireDocument) -> Result<Document, Error> {
    let mut out = Document::new();
    for (key, value) in wire {
        out.insert(key.clone(), unmarshal_value(value)?);
    }
    Ok(out)
}

fn binary_record(data: &[u8]) -> Json {
    let mut record = Map::new();
    record.insert(TYPE_KEY.to_string(), Json::String(BINARY_TAG.to_string()));
    record.insert(
        VALUE_KEY.to_string(),
        Json::String(BASE64_STANDARD.encode(data)),
    );
    Json::Object(record)
}

fn datetime_record(ts: &OffsetDateTime) -> Result<Json, Error> {
    let formatted = ts.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Marshalling)
            .with_message("timestamp cannot be formatted as RFC 3339")
            .with_source(err)
    })?;
    let mut record = Map::new();
    record.insert(TYPE_KEY.to_string(), Json::String(DATETIME_TAG.to_string()));
    record.insert(VALUE_KEY.to_string(), Json::String(formatted));
    Ok(Json::Object(record))
}

fn unmarshal_tagged(map: &WireDocument) -> Result<Value, Error> {
    let tag = map
        .get(TYPE_KEY)
        .and_then(Json::as_str)
        .ok_or_else(|| invalid_record("`__type__` must be a string"))?;
    if map.len() != 2 {
        return Err(invalid_record(format!(
            "tagged record `{tag}` must have exactly `{TYPE_KEY}` and `{VALUE_KEY}`"
        )));
    }
    let payload = map
        .get(VALUE_KEY)
        .and_then(Json::as_str)
        .ok_or_else(|| invalid_record(format!("tagged record `{tag}` has no string value")))?;
    match tag {
        DATETIME_TAG => OffsetDateTime::parse(payload, &Rfc3339)
            .map(Value::Timestamp)
            .map_err(|err| invalid_record("invalid datetime value").with_source(err)),
        BINARY_TAG => BASE64_STANDARD
            .decode(payload)
            .map(Value::Bytes)
            .map_err(|err| invalid_record("invalid base64 in binary value").with_source(err)),
        other => Err(invalid_record(format!("unknown tagged record type `{other}`"))),
    }
}

fn number_value(number: &Number) -> Value {
    if let Some(value) = number.as_i64() {
        Value::Int(value)
    } else {
        Value::Float(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn invalid_record(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Marshalling).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::{marshal_document, marshal_value, unmarshal_document, unmarshal_value};
    use crate::core::error::ErrorKind;
    use crate::core::value::{Attachment, Document, Value};
    use serde_json::json;
    use time::macros::datetime;

    fn round_trip(value: Value) -> Value {
        let wire = marshal_value(&value).expect("marshal");
        unmarshal_value(&wire).expect("unmarshal")
    }

    #[test]
    fn scalars_round_trip() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(0),
            Value::Int(-42),
            Value::Int(i64::MAX),
            Value::Float(1.5),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn nested_ascii_maps_round_trip() {
        let mut inner = Document::new();
        inner.insert("Title".to_string(), Value::text("Monday report"));
        inner.insert("Subject".to_string(), vec![Value::text("Arts")].into());
        let mut outer = Document::new();
        outer.insert("doc".to_string(), Value::Map(inner));
        outer.insert("allow_discussion".to_string(), Value::Int(0));

        let wire = marshal_document(&outer).expect("marshal");
        assert_eq!(unmarshal_document(&wire).expect("unmarshal"), outer);
    }

    #[test]
    fn timestamps_keep_instant_and_offset() {
        let ts = datetime!(2005-11-29 19:44:00 +01:00);
        let wire = marshal_value(&Value::Timestamp(ts)).expect("marshal");
        assert_eq!(
            wire,
            json!({"__type__": "datetime", "value": "2005-11-29T19:44:00+01:00"})
        );
        match unmarshal_value(&wire).expect("unmarshal") {
            Value::Timestamp(back) => {
                assert_eq!(back, ts);
                assert_eq!(back.offset(), ts.offset());
            }
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn binary_round_trips_byte_for_byte() {
        let data: Vec<u8> = (0..=255).collect();
        let wire = marshal_value(&Value::Bytes(data.clone())).expect("marshal");
        assert_eq!(wire["__type__"], "binary");
        assert_eq!(round_trip(Value::Bytes(data.clone())), Value::Bytes(data));
    }

    #[test]
    fn attachments_marshal_as_plain_binary() {
        let attachment = Attachment {
            id: "x.png".to_string(),
            filename: "x.png".to_string(),
            data: b"png".to_vec(),
        };
        let wire = marshal_value(&Value::File(attachment)).expect("marshal");
        assert_eq!(wire["__type__"], "binary");
        assert_eq!(
            unmarshal_value(&wire).expect("unmarshal"),
            Value::Bytes(b"png".to_vec())
        );
    }

    #[test]
    fn representable_text_is_lossless() {
        let text = Value::text("Réunion du lundi: ça va, Œuvre à 10€");
        assert_eq!(round_trip(text.clone()), text);
    }

    #[test]
    fn unrepresentable_code_point_is_dropped() {
        let back = round_trip(Value::text("caf\u{e9} \u{2603} ok"));
        assert_eq!(back, Value::text("caf\u{e9}  ok"));
    }

    #[test]
    fn curly_apostrophe_does_not_come_back() {
        let back = round_trip(Value::text("l\u{2019}\u{e9}t\u{e9}"));
        assert_eq!(back, Value::text("l'\u{e9}t\u{e9}"));
    }

    #[test]
    fn inbound_strings_are_not_re_encoded() {
        let back = unmarshal_value(&json!("\u{2603}")).expect("unmarshal");
        assert_eq!(back, Value::text("\u{2603}"));
    }

    #[test]
    fn unknown_tag_is_a_marshalling_error() {
        let err = unmarshal_value(&json!({"__type__": "decimal", "value": "1.0"}))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Marshalling);
    }

    #[test]
    fn malformed_tagged_records_are_rejected() {
        let cases = [
            json!({"__type__": "binary", "value": "!!!"}),
            json!({"__type__": "datetime", "value": "yesterday"}),
            json!({"__type__": "binary"}),
            json!({"__type__": 3, "value": "AA=="}),
            json!({"__type__": "binary", "value": "AA==", "extra": 1}),
        ];
        for case in cases {
            let err = unmarshal_value(&case).expect_err("err");
            assert_eq!(err.kind(), ErrorKind::Marshalling, "case {case}");
        }
    }

    #[test]
    fn reserved_key_is_rejected_on_marshal() {
        let mut doc = Document::new();
        doc.insert("__type__".to_string(), Value::text("binary"));
        let err = marshal_document(&doc).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Marshalling);

        // collapses to the reserved key once the snowman is dropped
        let mut doc = Document::new();
        doc.insert("__type\u{2603}__".to_string(), Value::text("binary"));
        doc.insert("value".to_string(), Value::text("AQID"));
        let err = marshal_value(&Value::Map(doc)).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Marshalling);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = marshal_value(&Value::Float(f64::NAN)).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Marshalling);
    }
}
