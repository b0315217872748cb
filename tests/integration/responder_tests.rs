//! Responder role: inbound read, write and enumeration requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use settingsbus::protocol::codec::{
    EnumerationRecord, MSG_ENUMERATION_END, MSG_ENUMERATION_REQUEST, MSG_ENUMERATION_RESPONSE,
    MSG_READ_REQUEST, MSG_READ_RESPONSE, MSG_UPDATE_BROADCAST, MSG_WRITE_REQUEST,
    MSG_WRITE_RESPONSE, SettingText, WriteReply, decode_cursor, encode_cursor,
};
use settingsbus::{Notify, SettingSlot, Settings, SettingsType, Veto, WriteResult};

use crate::mock_api::{MockApi, PEER_ID, make_node};

fn write(api: &MockApi, section: &str, name: &str, value: &str) -> (WriteResult, Option<String>) {
    api.clear_sent();
    let req = SettingText::with_value(section, name, value).encode().unwrap();
    api.deliver(MSG_WRITE_REQUEST, PEER_ID, &req);

    let replies = api.sent_of(MSG_WRITE_RESPONSE);
    assert_eq!(replies.len(), 1, "exactly one write-response");
    let reply = WriteReply::decode(&replies[0].payload).unwrap();
    assert_eq!(reply.setting.section, section);
    assert_eq!(reply.setting.name, name);
    (
        WriteResult::from_u8(reply.result).unwrap(),
        reply.setting.value.map(str::to_owned),
    )
}

fn node_with_baud() -> (Settings<Arc<MockApi>>, Arc<MockApi>, Arc<SettingSlot>) {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int32(9600));
    node.register_setting("uart", "baud", slot.clone(), SettingsType::INT, None)
        .unwrap();
    (node, api, slot)
}

// ── Read ──────────────────────────────────────────────────────

#[test]
fn read_request_answers_value_and_type() {
    let (_node, api, _slot) = node_with_baud();
    let req = SettingText::key("uart", "baud").encode().unwrap();
    api.deliver(MSG_READ_REQUEST, PEER_ID, &req);

    let replies = api.sent_of(MSG_READ_RESPONSE);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].sender, None);
    let msg = SettingText::decode(&replies[0].payload).unwrap();
    assert_eq!(msg, SettingText::full("uart", "baud", "9600", "int"));
}

#[test]
fn read_of_unknown_key_gets_key_only_reply() {
    let (_node, api, _slot) = node_with_baud();
    let req = SettingText::key("uart", "parity").encode().unwrap();
    api.deliver(MSG_READ_REQUEST, PEER_ID, &req);

    let replies = api.sent_of(MSG_READ_RESPONSE);
    assert_eq!(replies.len(), 1);
    let msg = SettingText::decode(&replies[0].payload).unwrap();
    assert_eq!(msg, SettingText::key("uart", "parity"));
}

#[test]
fn malformed_requests_are_dropped() {
    let (_node, api, _slot) = node_with_baud();
    api.deliver(MSG_READ_REQUEST, PEER_ID, b"uart");
    api.deliver(MSG_WRITE_REQUEST, PEER_ID, b"\xff\xfe\0baud\0");
    api.deliver(MSG_ENUMERATION_REQUEST, PEER_ID, &[1]);
    assert!(api.sent().is_empty());
}

// ── Write ─────────────────────────────────────────────────────

#[test]
fn accepted_write_replies_and_broadcasts() {
    let (_node, api, slot) = node_with_baud();
    let (result, value) = write(&api, "uart", "baud", "115200");
    assert_eq!(result, WriteResult::Ok);
    assert_eq!(value.as_deref(), Some("115200"));
    assert_eq!(slot.get_int(), Some(115_200));

    let updates = api.sent_of(MSG_UPDATE_BROADCAST);
    assert_eq!(updates.len(), 1);
    let msg = SettingText::decode(&updates[0].payload).unwrap();
    assert_eq!(msg, SettingText::with_value("uart", "baud", "115200"));
}

#[test]
fn write_reply_precedes_broadcast() {
    let (_node, api, _slot) = node_with_baud();
    write(&api, "uart", "baud", "19200");
    let kinds: Vec<u16> = api.sent().iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![MSG_WRITE_RESPONSE, MSG_UPDATE_BROADCAST]);
}

#[test]
fn write_runs_notify_with_new_value() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int16(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let notify: Notify = {
        let slot = slot.clone();
        let seen = seen.clone();
        Arc::new(move || {
            seen.store(slot.get_int().unwrap_or(0) as usize, Ordering::SeqCst);
            Ok(())
        })
    };
    node.register_setting("imu", "rate", slot, SettingsType::INT, Some(notify))
        .unwrap();

    assert_eq!(write(&api, "imu", "rate", "250").0, WriteResult::Ok);
    assert_eq!(seen.load(Ordering::SeqCst), 250);
}

#[test]
fn vetoed_write_rolls_back() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int32(10));
    let calls = Arc::new(AtomicUsize::new(0));
    let notify: Notify = {
        let calls = calls.clone();
        Arc::new(move || {
            // Accept the registration-time call only.
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(Veto::Failed)
            }
        })
    };
    node.register_setting("pid", "kp", slot.clone(), SettingsType::INT, Some(notify))
        .unwrap();

    let (result, value) = write(&api, "pid", "kp", "99");
    assert_eq!(result, WriteResult::ServiceFailed);
    assert_eq!(value.as_deref(), Some("10"));
    assert_eq!(slot.get_int(), Some(10));
    assert!(api.sent_of(MSG_UPDATE_BROADCAST).is_empty());
}

#[test]
fn domain_veto_reports_value_rejected() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int32(50));
    let notify: Notify = {
        let slot = slot.clone();
        Arc::new(move || match slot.get_int() {
            Some(v) if (0..=100).contains(&v) => Ok(()),
            _ => Err(Veto::ValueRejected),
        })
    };
    node.register_setting("motor", "duty", slot.clone(), SettingsType::INT, Some(notify))
        .unwrap();

    assert_eq!(write(&api, "motor", "duty", "150").0, WriteResult::ValueRejected);
    assert_eq!(slot.get_int(), Some(50));
    assert_eq!(write(&api, "motor", "duty", "75").0, WriteResult::Ok);
    assert_eq!(slot.get_int(), Some(75));
}

#[test]
fn readonly_and_watch_entries_refuse_writes() {
    let (node, api) = make_node();
    let ro = Arc::new(SettingSlot::int8(1));
    let watch = Arc::new(SettingSlot::int8(2));
    node.register_readonly("sys", "hw", ro.clone(), SettingsType::INT)
        .unwrap();
    node.register_watch("peer", "rate", watch.clone(), SettingsType::INT, None)
        .unwrap();

    assert_eq!(write(&api, "sys", "hw", "5").0, WriteResult::ReadOnly);
    assert_eq!(write(&api, "peer", "rate", "5").0, WriteResult::ModifyDisabled);
    assert_eq!(ro.get_int(), Some(1));
    assert_eq!(watch.get_int(), Some(2));
}

#[test]
fn write_errors_map_to_results() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int8(0));
    node.register_setting("a", "small", slot.clone(), SettingsType::INT, None)
        .unwrap();

    assert_eq!(write(&api, "a", "small", "200").0, WriteResult::ValueRejected);
    assert_eq!(write(&api, "a", "small", "abc").0, WriteResult::ParseFailed);
    assert_eq!(write(&api, "a", "nope", "1").0, WriteResult::SettingRejected);
    assert_eq!(slot.get_int(), Some(0));
    assert!(api.sent_of(MSG_UPDATE_BROADCAST).is_empty());
}

#[test]
fn unknown_key_write_reply_has_no_value() {
    let (_node, api, _slot) = node_with_baud();
    let (result, value) = write(&api, "uart", "parity", "even");
    assert_eq!(result, WriteResult::SettingRejected);
    assert_eq!(value, None);
}

#[test]
fn enum_write_by_name() {
    let (node, api) = make_node();
    let mode = node.register_enum(&["off", "on", "auto"]).unwrap();
    let slot = Arc::new(SettingSlot::enumeration(0));
    node.register_setting("fan", "mode", slot.clone(), mode, None)
        .unwrap();

    assert_eq!(write(&api, "fan", "mode", "auto").0, WriteResult::Ok);
    assert_eq!(slot.get_enum(), 2);
    assert_eq!(write(&api, "fan", "mode", "maybe").0, WriteResult::ParseFailed);
    assert_eq!(slot.get_enum(), 2);
}

#[test]
fn string_write_respects_capacity() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::string(6, "abc").unwrap());
    node.register_setting("net", "host", slot.clone(), SettingsType::STRING, None)
        .unwrap();

    assert_eq!(write(&api, "net", "host", "hello").0, WriteResult::Ok);
    assert_eq!(slot.get_str(), "hello");
    assert_eq!(write(&api, "net", "host", "toolong").0, WriteResult::ValueRejected);
    assert_eq!(slot.get_str(), "hello");
}

#[test]
fn write_request_without_value_is_dropped() {
    let (_node, api, _slot) = node_with_baud();
    let req = SettingText::key("uart", "baud").encode().unwrap();
    api.deliver(MSG_WRITE_REQUEST, PEER_ID, &req);
    assert!(api.sent().is_empty());
}

// ── Enumeration ───────────────────────────────────────────────

fn enumerate_raw(api: &MockApi) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    let mut cursor = 0u16;
    loop {
        api.clear_sent();
        api.deliver(MSG_ENUMERATION_REQUEST, PEER_ID, &encode_cursor(cursor).unwrap());
        if let Some(end) = api.sent_of(MSG_ENUMERATION_END).first() {
            assert_eq!(decode_cursor(&end.payload).unwrap(), cursor);
            return out;
        }
        let replies = api.sent_of(MSG_ENUMERATION_RESPONSE);
        assert_eq!(replies.len(), 1);
        let rec = EnumerationRecord::decode(&replies[0].payload).unwrap();
        assert_eq!(rec.cursor, cursor);
        out.push((
            rec.setting.section.to_owned(),
            rec.setting.name.to_owned(),
            rec.setting.value.unwrap().to_owned(),
        ));
        cursor += 1;
    }
}

#[test]
fn enumeration_walks_entries_in_registration_order() {
    let (node, api) = make_node();
    node.register_setting("b", "two", Arc::new(SettingSlot::int8(2)), SettingsType::INT, None)
        .unwrap();
    node.register_setting(
        "a",
        "one",
        Arc::new(SettingSlot::boolean(true)),
        SettingsType::BOOL,
        None,
    )
    .unwrap();
    node.register_readonly(
        "c",
        "three",
        Arc::new(SettingSlot::string(8, "x").unwrap()),
        SettingsType::STRING,
    )
    .unwrap();

    let expected = vec![
        ("b".to_owned(), "two".to_owned(), "2".to_owned()),
        ("a".to_owned(), "one".to_owned(), "True".to_owned()),
        ("c".to_owned(), "three".to_owned(), "x".to_owned()),
    ];
    assert_eq!(enumerate_raw(&api), expected);
    assert_eq!(enumerate_raw(&api), expected);
}

#[test]
fn enumeration_carries_enum_type_tag() {
    let (node, api) = make_node();
    let mode = node.register_enum(&["off", "on"]).unwrap();
    node.register_setting("fan", "mode", Arc::new(SettingSlot::enumeration(1)), mode, None)
        .unwrap();

    api.deliver(MSG_ENUMERATION_REQUEST, PEER_ID, &encode_cursor(0).unwrap());
    let replies = api.sent_of(MSG_ENUMERATION_RESPONSE);
    let rec = EnumerationRecord::decode(&replies[0].payload).unwrap();
    assert_eq!(rec.setting.value, Some("on"));
    assert_eq!(rec.setting.type_tag, Some("enum:off,on"));
}

#[test]
fn enumeration_past_end_is_answered() {
    let (_node, api, _slot) = node_with_baud();
    api.deliver(MSG_ENUMERATION_REQUEST, PEER_ID, &encode_cursor(40).unwrap());
    let ends = api.sent_of(MSG_ENUMERATION_END);
    assert_eq!(ends.len(), 1);
    assert_eq!(decode_cursor(&ends[0].payload).unwrap(), 40);
}

#[test]
fn unformattable_entry_is_answered_key_only() {
    let (node, api) = make_node();
    let mode = node.register_enum(&["off", "on"]).unwrap();
    let slot = Arc::new(SettingSlot::enumeration(0));
    node.register_setting("fan", "mode", slot.clone(), mode, None)
        .unwrap();
    assert!(slot.set_enum(9));

    api.deliver(MSG_READ_REQUEST, PEER_ID, &SettingText::key("fan", "mode").encode().unwrap());
    let reads = api.sent_of(MSG_READ_RESPONSE);
    assert_eq!(SettingText::decode(&reads[0].payload).unwrap(), SettingText::key("fan", "mode"));

    api.deliver(MSG_ENUMERATION_REQUEST, PEER_ID, &encode_cursor(0).unwrap());
    let replies = api.sent_of(MSG_ENUMERATION_RESPONSE);
    assert_eq!(replies.len(), 1);
    let rec = EnumerationRecord::decode(&replies[0].payload).unwrap();
    assert_eq!(rec.cursor, 0);
    assert_eq!(rec.setting, SettingText::key("fan", "mode"));
}
