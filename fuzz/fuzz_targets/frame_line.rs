#![no_main]

use libfuzzer_sys::fuzz_target;
use loom_gateway::{frame_line, ERROR_LINE_PREFIX};

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let frame = frame_line(&line);
    if let Some(message) = line.strip_prefix(ERROR_LINE_PREFIX) {
        let payload = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("error frame shape");
        let value: serde_json::Value = serde_json::from_str(payload).expect("error frame json");
        assert_eq!(value["code"], -1);
        assert_eq!(value["message"], message);
    } else {
        assert_eq!(frame, format!("{line}\n"));
    }
});
