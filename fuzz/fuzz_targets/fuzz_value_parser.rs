//! Fuzz target: `TypeRegistry::parse` / `TypeRegistry::format`
//!
//! The first byte picks a type and slot width, the rest is the value text.
//! Whatever parses must format to text that parses back to the same bytes
//! and fits the wire length bound for that slot.
//!
//! cargo fuzz run fuzz_value_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use settingsbus::SettingsType;
use settingsbus::types::TypeRegistry;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = core::str::from_utf8(rest) else {
        return;
    };

    let mut reg = TypeRegistry::new();
    let Ok(modes) = reg.register_enum(&["off", "on", "auto"]) else {
        return;
    };

    let (ty, len) = match selector % 9 {
        0 => (SettingsType::INT, 1),
        1 => (SettingsType::INT, 2),
        2 => (SettingsType::INT, 4),
        3 => (SettingsType::INT, 8),
        4 => (SettingsType::FLOAT, 4),
        5 => (SettingsType::FLOAT, 8),
        6 => (SettingsType::STRING, usize::from(selector % 64) + 1),
        7 => (SettingsType::BOOL, 1),
        _ => (modes, 1),
    };

    let Ok(bytes) = reg.parse(ty, text, len) else {
        return;
    };
    assert_eq!(bytes.len(), len);
    let formatted = reg.format(ty, &bytes).unwrap();
    assert!(formatted.len() <= reg.max_text_len(ty, len).unwrap());

    let again = reg.parse(ty, &formatted, len).unwrap();
    if ty == SettingsType::FLOAT {
        // NaN payload bits are not preserved through text.
        let nan = match len {
            4 => f32::from_ne_bytes(bytes.as_slice().try_into().unwrap()).is_nan(),
            _ => f64::from_ne_bytes(bytes.as_slice().try_into().unwrap()).is_nan(),
        };
        if nan {
            return;
        }
    }
    assert_eq!(again, bytes);
});
