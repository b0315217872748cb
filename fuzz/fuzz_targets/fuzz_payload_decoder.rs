//! Fuzz target: settings message decoders
//!
//! Feeds arbitrary bytes to every payload decoder and checks that a
//! successful decode re-encodes to the exact input bytes.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - decode → encode is the identity on accepted payloads
//!
//! cargo fuzz run fuzz_payload_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use settingsbus::protocol::codec::{
    EnumerationRecord, RegisterReply, SettingText, WriteReply, decode_cursor, encode_cursor,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = SettingText::decode(data) {
        assert_eq!(msg.encode().unwrap().as_slice(), data);
    }
    if let Ok(msg) = WriteReply::decode(data) {
        assert_eq!(msg.encode().unwrap().as_slice(), data);
    }
    if let Ok(msg) = EnumerationRecord::decode(data) {
        assert_eq!(msg.encode().unwrap().as_slice(), data);
    }
    if let Ok(msg) = RegisterReply::decode(data) {
        assert_eq!(msg.encode().unwrap().as_slice(), data);
    }
    if let Ok(cursor) = decode_cursor(data) {
        assert_eq!(encode_cursor(cursor).unwrap().as_slice(), data);
    }
});
