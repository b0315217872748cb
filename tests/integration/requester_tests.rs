//! Requester role: retries, timeouts and reply correlation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use settingsbus::protocol::codec::{
    EnumerationRecord, MSG_ENUMERATION_END, MSG_ENUMERATION_REQUEST, MSG_ENUMERATION_RESPONSE,
    MSG_READ_REQUEST, MSG_READ_RESPONSE, MSG_WRITE_REQUEST, MSG_WRITE_RESPONSE, SettingText,
    WriteReply, decode_cursor, encode_cursor,
};
use settingsbus::types::TypeDescriptor;
use settingsbus::{ApiError, Error, SettingSlot, SettingsType, WriteResult};

use crate::mock_api::{NODE_ID, PEER_ID, make_node, replies_when_sent, reply_when_sent, serve};

fn read_reply(section: &str, name: &str, value: &str, tag: &str) -> Vec<u8> {
    SettingText::full(section, name, value, tag)
        .encode()
        .unwrap()
        .to_vec()
}

fn write_reply(result: WriteResult, section: &str, name: &str, value: Option<&str>) -> Vec<u8> {
    WriteReply {
        result: result.as_u8(),
        setting: SettingText {
            section,
            name,
            value,
            type_tag: None,
        },
    }
    .encode()
    .unwrap()
    .to_vec()
}

// ── Timeouts and retries ──────────────────────────────────────

#[test]
fn silent_peer_times_out_after_all_attempts() {
    let (node, api) = make_node();
    assert_eq!(node.read("uart", "baud"), Err(Error::Timeout));

    let sends = api.sent_of(MSG_READ_REQUEST);
    assert_eq!(sends.len(), usize::from(node.config().request_attempts));
    let expected = SettingText::key("uart", "baud").encode().unwrap();
    for s in &sends {
        assert_eq!(s.sender, Some(NODE_ID));
        assert_eq!(s.payload, expected.as_slice());
    }
}

#[test]
fn failing_transport_is_reported() {
    let (node, api) = make_node();
    api.fail_sends.store(true, Ordering::SeqCst);
    assert_eq!(
        node.write("uart", "baud", "1"),
        Err(Error::Transport(ApiError::SendFailed))
    );
    assert!(api.sent().is_empty());
}

#[test]
fn second_attempt_can_succeed() {
    let (node, api) = make_node();
    let requests = Arc::new(AtomicUsize::new(0));
    let _peer = {
        let requests = requests.clone();
        serve(&api, move |frame| {
            if frame.kind != MSG_READ_REQUEST {
                return None;
            }
            // Lose the first request.
            if requests.fetch_add(1, Ordering::SeqCst) == 0 {
                return None;
            }
            Some((MSG_READ_RESPONSE, read_reply("uart", "baud", "9600", "int")))
        })
    };

    assert_eq!(node.read_int("uart", "baud"), Ok(9600));
    assert_eq!(api.sent_of(MSG_READ_REQUEST).len(), 2);
}

// ── Reads ─────────────────────────────────────────────────────

#[test]
fn read_returns_peer_record() {
    let (node, api) = make_node();
    let peer = reply_when_sent(
        &api,
        MSG_READ_REQUEST,
        MSG_READ_RESPONSE,
        read_reply("fan", "mode", "auto", "enum:off,on,auto"),
    );
    let rec = node.read("fan", "mode").unwrap();
    peer.join().unwrap();

    assert_eq!(rec.section, "fan");
    assert_eq!(rec.name, "mode");
    assert_eq!(rec.value, "auto");
    assert_eq!(
        rec.ty,
        Some(TypeDescriptor::Enum(vec![
            "off".into(),
            "on".into(),
            "auto".into()
        ]))
    );
    assert!(api.signals.load(Ordering::SeqCst) >= 1);
}

#[test]
fn typed_reads_parse_values() {
    let (node, api) = make_node();
    let _peer = serve(&api, |frame| {
        if frame.kind != MSG_READ_REQUEST {
            return None;
        }
        let req = SettingText::decode(&frame.payload).ok()?;
        let (value, tag) = match req.name {
            "gain" => ("0.25", "float"),
            "armed" => ("True", "bool"),
            "label" => ("left wing", "string"),
            _ => ("oops", "int"),
        };
        Some((MSG_READ_RESPONSE, read_reply(req.section, req.name, value, tag)))
    });

    assert_eq!(node.read_float("ctl", "gain"), Ok(0.25));
    assert_eq!(node.read_bool("ctl", "armed"), Ok(true));
    assert_eq!(node.read_str("ctl", "label").as_deref(), Ok("left wing"));
    assert_eq!(node.read_int("ctl", "bogus"), Err(Error::ParseFailed));
}

#[test]
fn negative_read_reply_settles_after_one_attempt() {
    let (node, api) = make_node();
    let peer = reply_when_sent(
        &api,
        MSG_READ_REQUEST,
        MSG_READ_RESPONSE,
        SettingText::key("uart", "parity").encode().unwrap().to_vec(),
    );
    assert_eq!(node.read("uart", "parity"), Err(Error::SettingRejected));
    peer.join().unwrap();
    assert_eq!(api.sent_of(MSG_READ_REQUEST).len(), 1);
}

#[test]
fn owner_read_reply_wins_over_negative_reply() {
    let (node, api) = make_node();
    let peer = replies_when_sent(
        &api,
        MSG_READ_REQUEST,
        vec![
            (MSG_READ_RESPONSE, SettingText::key("nav", "baud").encode().unwrap().to_vec()),
            (MSG_READ_RESPONSE, read_reply("nav", "baud", "9600", "int")),
        ],
    );
    assert_eq!(node.read_int("nav", "baud"), Ok(9600));
    peer.join().unwrap();
    assert_eq!(api.sent_of(MSG_READ_REQUEST).len(), 1);
}

#[test]
fn reply_for_other_key_is_ignored() {
    let (node, api) = make_node();
    let peer = reply_when_sent(
        &api,
        MSG_READ_REQUEST,
        MSG_READ_RESPONSE,
        read_reply("uart", "parity", "none", "string"),
    );
    assert_eq!(node.read("uart", "baud"), Err(Error::Timeout));
    peer.join().unwrap();
}

#[test]
fn unsolicited_reply_is_dropped() {
    let (_node, api) = make_node();
    api.deliver(MSG_READ_RESPONSE, PEER_ID, &read_reply("a", "b", "1", "int"));
    api.deliver(MSG_ENUMERATION_END, PEER_ID, &encode_cursor(3).unwrap());
    assert_eq!(api.signals.load(Ordering::SeqCst), 0);
}

#[test]
fn invalid_keys_are_refused_before_sending() {
    let (node, api) = make_node();
    assert_eq!(node.read("", "baud"), Err(Error::InvalidArgument));
    assert_eq!(node.write("uart", "baud", "1\02"), Err(Error::InvalidArgument));
    assert!(api.sent().is_empty());
}

// ── Writes ────────────────────────────────────────────────────

#[test]
fn write_sends_value_and_maps_result() {
    let (node, api) = make_node();
    let _peer = serve(&api, |frame| {
        if frame.kind != MSG_WRITE_REQUEST {
            return None;
        }
        let req = SettingText::decode(&frame.payload).ok()?;
        let result = match req.name {
            "baud" => WriteResult::Ok,
            "hw" => WriteResult::ReadOnly,
            "mirror" => WriteResult::ModifyDisabled,
            "rate" => WriteResult::ValueRejected,
            "mode" => WriteResult::ParseFailed,
            "kp" => WriteResult::ServiceFailed,
            _ => WriteResult::SettingRejected,
        };
        Some((
            MSG_WRITE_RESPONSE,
            write_reply(result, req.section, req.name, req.value),
        ))
    });

    assert_eq!(node.write_int("s", "baud", 57_600), Ok(()));
    assert_eq!(node.write_bool("s", "hw", true), Err(Error::ReadOnly));
    assert_eq!(node.write_str("s", "mirror", "x"), Err(Error::ModifyDisabled));
    assert_eq!(node.write_float("s", "rate", 1e9), Err(Error::ValueRejected));
    assert_eq!(node.write("s", "mode", "maybe"), Err(Error::ParseFailed));
    assert_eq!(node.write("s", "kp", "1"), Err(Error::ServiceFailed));
    assert_eq!(node.write("s", "nope", "1"), Err(Error::SettingRejected));

    let first = SettingText::decode(&api.sent_of(MSG_WRITE_REQUEST)[0].payload)
        .unwrap()
        .value
        .map(str::to_owned);
    assert_eq!(first.as_deref(), Some("57600"));
}

#[test]
fn owner_write_result_wins_over_rejection() {
    let (node, api) = make_node();
    let peer = replies_when_sent(
        &api,
        MSG_WRITE_REQUEST,
        vec![
            (
                MSG_WRITE_RESPONSE,
                write_reply(WriteResult::SettingRejected, "nav", "baud", None),
            ),
            (
                MSG_WRITE_RESPONSE,
                write_reply(WriteResult::ValueRejected, "nav", "baud", Some("9600")),
            ),
        ],
    );
    assert_eq!(node.write_int("nav", "baud", -1), Err(Error::ValueRejected));
    peer.join().unwrap();
}

#[test]
fn bool_writes_use_names() {
    let (node, api) = make_node();
    let _peer = serve(&api, |frame| {
        let req = SettingText::decode(&frame.payload).ok()?;
        Some((
            MSG_WRITE_RESPONSE,
            write_reply(WriteResult::Ok, req.section, req.name, req.value),
        ))
    });
    node.write_bool("ctl", "armed", false).unwrap();
    let sent = api.sent_of(MSG_WRITE_REQUEST);
    let req = SettingText::decode(&sent[0].payload).unwrap();
    assert_eq!(req.value, Some("False"));
}

#[test]
fn unknown_write_status_is_ignored() {
    let (node, api) = make_node();
    let mut bogus = write_reply(WriteResult::Ok, "a", "b", None);
    bogus[0] = 42;
    let peer = reply_when_sent(&api, MSG_WRITE_REQUEST, MSG_WRITE_RESPONSE, bogus);
    assert_eq!(node.write("a", "b", "1"), Err(Error::Timeout));
    peer.join().unwrap();
}

// ── Enumeration ───────────────────────────────────────────────

#[test]
fn enumerate_collects_peer_directory() {
    let (node, api) = make_node();
    let table = [("a", "x", "1", "int"), ("a", "y", "True", "bool"), ("b", "z", "hi", "string")];
    let _peer = serve(&api, move |frame| {
        if frame.kind != MSG_ENUMERATION_REQUEST {
            return None;
        }
        let cursor = decode_cursor(&frame.payload).ok()?;
        match table.get(usize::from(cursor)) {
            Some(&(section, name, value, tag)) => {
                let rec = EnumerationRecord {
                    cursor,
                    setting: SettingText::full(section, name, value, tag),
                };
                Some((MSG_ENUMERATION_RESPONSE, rec.encode().ok()?.to_vec()))
            }
            None => Some((MSG_ENUMERATION_END, encode_cursor(cursor).ok()?.to_vec())),
        }
    });

    let records = node.enumerate().unwrap();
    let keys: Vec<(&str, &str, &str)> = records
        .iter()
        .map(|r| (r.section.as_str(), r.name.as_str(), r.value.as_str()))
        .collect();
    assert_eq!(keys, vec![("a", "x", "1"), ("a", "y", "True"), ("b", "z", "hi")]);
    assert_eq!(records[1].ty, Some(TypeDescriptor::Bool));

    assert_eq!(node.read_by_index(7), Ok(None));
    assert_eq!(node.read_by_index(2).unwrap().unwrap().value, "hi");
}

#[test]
fn enumeration_reply_for_other_cursor_is_ignored() {
    let (node, api) = make_node();
    let peer = reply_when_sent(
        &api,
        MSG_ENUMERATION_REQUEST,
        MSG_ENUMERATION_END,
        encode_cursor(5).unwrap().to_vec(),
    );
    assert_eq!(node.read_by_index(0), Err(Error::Timeout));
    peer.join().unwrap();
}

// ── Watch pull ────────────────────────────────────────────────

#[test]
fn sync_watch_pulls_remote_value() {
    let (node, api) = make_node();
    let slot = Arc::new(SettingSlot::int32(0));
    node.register_watch("imu", "rate", slot.clone(), SettingsType::INT, None)
        .unwrap();
    let peer = reply_when_sent(
        &api,
        MSG_READ_REQUEST,
        MSG_READ_RESPONSE,
        read_reply("imu", "rate", "400", "int"),
    );
    node.sync_watch("imu", "rate").unwrap();
    peer.join().unwrap();
    assert_eq!(slot.get_int(), Some(400));
}

#[test]
fn sync_watch_requires_watch_entry() {
    let (node, api) = make_node();
    node.register_setting("imu", "rate", Arc::new(SettingSlot::int32(0)), SettingsType::INT, None)
        .unwrap();
    assert_eq!(node.sync_watch("imu", "rate"), Err(Error::InvalidArgument));
    assert_eq!(node.sync_watch("imu", "none"), Err(Error::NotFound));
    assert!(api.sent_of(MSG_READ_REQUEST).is_empty());
}
