use super::*;
use time::macros::datetime;

#[test]
fn frame_kind_uses_snake_case_wire_names() {
    assert_eq!(FrameKind::Message.as_str(), "message");
    assert_eq!(FrameKind::UserJoined.as_str(), "user_joined");
    assert_eq!(FrameKind::UserLeft.to_string(), "user_left");
}

#[test]
fn decode_message_with_rfc3339_timestamp() {
    let frame = decode_frame(
        r#"{"id":"65f0c2","type":"message","username":"alice","content":"hi","timestamp":"2024-03-01T12:30:00.123456789Z"}"#,
    )
    .expect("frame should decode");
    assert_eq!(frame.kind, FrameKind::Message);
    assert_eq!(frame.id.as_deref(), Some("65f0c2"));
    assert_eq!(frame.username.as_deref(), Some("alice"));
    assert_eq!(frame.content.as_deref(), Some("hi"));
    assert_eq!(frame.timestamp, Some(datetime!(2024-03-01 12:30:00.123_456_789 UTC)));
}

#[test]
fn decode_accepts_numeric_id_and_millisecond_timestamp() {
    let frame = decode_frame(r#"{"type":"message","username":"bob","content":"x","id":1,"timestamp":1000}"#)
        .expect("frame should decode");
    assert_eq!(frame.id.as_deref(), Some("1"));
    assert_eq!(frame.timestamp, Some(datetime!(1970-01-01 00:00:01 UTC)));
}

#[test]
fn decode_leaves_missing_id_and_timestamp_empty() {
    let frame = decode_frame(r#"{"type":"user_joined","username":"carol","content":"carol joined the chat"}"#)
        .expect("frame should decode");
    assert_eq!(frame.kind, FrameKind::UserJoined);
    assert!(frame.id.is_none());
    assert!(frame.timestamp.is_none());
}

#[test]
fn decode_treats_null_and_empty_id_as_absent() {
    let null_id = decode_frame(r#"{"type":"user_left","id":null}"#).expect("frame should decode");
    let empty_id = decode_frame(r#"{"type":"user_left","id":""}"#).expect("frame should decode");
    assert!(null_id.id.is_none());
    assert!(empty_id.id.is_none());
}

#[test]
fn decode_rejects_unknown_type() {
    let err = decode_frame(r#"{"type":"typing","username":"alice"}"#).expect_err("unknown type");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_rejects_malformed_json() {
    let err = decode_frame("{not json").expect_err("malformed");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_rejects_unparseable_timestamp() {
    let err = decode_frame(r#"{"type":"message","username":"a","timestamp":"yesterday"}"#).expect_err("bad timestamp");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_requires_username_on_messages() {
    let err = decode_frame(r#"{"type":"message","content":"anonymous"}"#).expect_err("missing sender");
    assert!(matches!(
        err,
        CodecError::MissingField {
            kind: FrameKind::Message,
            field: "username"
        }
    ));

    let err = decode_frame(r#"{"type":"message","username":"","content":"anonymous"}"#).expect_err("empty sender");
    assert!(matches!(err, CodecError::MissingField { .. }));
}

#[test]
fn encode_outbound_writes_envelope_fields() {
    let message = OutboundMessage::new("hello", datetime!(2024-03-01 12:00:00 UTC));
    let text = encode_outbound(&message).expect("encode");
    let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(value["type"], "message");
    assert_eq!(value["content"], "hello");
    assert_eq!(value["clientTimestamp"], "2024-03-01T12:00:00Z");
    assert_eq!(value.as_object().map(serde_json::Map::len), Some(3));
}

#[test]
fn decode_outbound_reads_back_client_envelope() {
    let message = OutboundMessage::new("ping", datetime!(2024-03-01 12:00:00 UTC));
    let text = encode_outbound(&message).expect("encode");
    assert_eq!(decode_outbound(&text).expect("decode"), message);
}
