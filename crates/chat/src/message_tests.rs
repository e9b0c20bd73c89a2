// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::client::ClientIdentity;

use super::{decode_inbound, ChatMessage, MessageKind};

fn shop() -> ClientIdentity {
    ClientIdentity::new("shop-7", "req-1", Some("shop".to_owned()))
}

#[test]
fn message_event_uses_wire_field_names() -> anyhow::Result<()> {
    let payload = ChatMessage::text(&shop(), "hi").encode()?;
    let json: serde_json::Value = serde_json::from_str(payload.as_str())?;

    assert_eq!(json["type"], "message");
    assert_eq!(json["customer_request_id"], "req-1");
    assert_eq!(json["sender_id"], "shop-7");
    assert_eq!(json["sender_type"], "shop");
    assert_eq!(json["message"], "hi");
    assert!(json.get("kind").is_none(), "json: {json}");
    assert!(json.get("room_id").is_none(), "json: {json}");
    Ok(())
}

#[test]
fn presence_events_have_empty_body() -> anyhow::Result<()> {
    let join = ChatMessage::join(&shop());
    assert_eq!(join.kind, MessageKind::Join);
    assert!(join.message.is_empty());

    let leave = ChatMessage::leave(&shop());
    assert_eq!(leave.kind, MessageKind::Leave);
    assert!(leave.message.is_empty());

    let json: serde_json::Value = serde_json::from_str(leave.encode()?.as_str())?;
    assert_eq!(json["type"], "leave");
    assert_eq!(json["message"], "");
    Ok(())
}

#[test]
fn timestamp_is_rfc3339() -> anyhow::Result<()> {
    let msg = ChatMessage::text(&shop(), "x");
    let parsed = chrono::DateTime::parse_from_rfc3339(&msg.timestamp)?;
    assert_eq!(parsed.offset().local_minus_utc(), 0);
    Ok(())
}

#[test]
fn encoded_event_decodes_back() -> anyhow::Result<()> {
    let msg = ChatMessage::join(&shop());
    let back: ChatMessage = serde_json::from_str(msg.encode()?.as_str())?;
    assert_eq!(back, msg);
    Ok(())
}

#[test]
fn kind_strings_match_serde() -> anyhow::Result<()> {
    for kind in [MessageKind::Message, MessageKind::Join, MessageKind::Leave] {
        let json = serde_json::to_string(&kind)?;
        assert_eq!(json, format!("\"{}\"", kind.as_str()));
    }
    Ok(())
}

#[yare::parameterized(
    structured       = { r#"{"message":"hello"}"#, "hello" },
    extra_fields     = { r#"{"customer_request_id":"req-1","message":"hey"}"#, "hey" },
    missing_message  = { r#"{"other":1}"#, "" },
    plain_text       = { "just some words", "just some words" },
    json_string      = { r#""quoted""#, r#""quoted""# },
    wrong_type       = { r#"{"message":42}"#, r#"{"message":42}"# },
    truncated_json   = { r#"{"message":"#, r#"{"message":"# },
    empty_frame      = { "", "" },
)]
fn lenient_decode(frame: &str, expected: &str) {
    assert_eq!(decode_inbound(frame), expected);
}
