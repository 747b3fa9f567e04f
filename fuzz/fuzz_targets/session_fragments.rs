#![no_main]

use libfuzzer_sys::fuzz_target;
use loom_ai::{parse_fixture, ScriptedEvent};
use loom_compositor::{
    CompositorConfig, ConversationContext, ResponseMode, ResponseSession, LINE_PREFIX,
};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(events) = parse_fixture(&raw) else {
        return;
    };
    let mode = if data.first().is_some_and(|byte| byte & 1 == 1) {
        ResponseMode::MultiAgent
    } else {
        ResponseMode::SingleAgent
    };
    let mut session = ResponseSession::new(
        mode,
        ConversationContext::with_main_agent("router", "main-1"),
        CompositorConfig::default(),
    );
    let fragments = events.into_iter().flat_map(|event| match event {
        ScriptedEvent::Message(fragment) => vec![fragment],
        ScriptedEvent::Stream(fragments) => fragments,
        ScriptedEvent::StreamError { fragments, .. } => fragments,
        ScriptedEvent::Error(_) => Vec::new(),
    });
    for fragment in fragments {
        let Ok(lines) = session.handle_lines(&fragment) else {
            break;
        };
        for line in lines {
            assert!(line.starts_with(LINE_PREFIX));
            assert!(line.ends_with('\n'));
            let payload = &line[LINE_PREFIX.len()..];
            assert!(serde_json::from_str::<serde_json::Value>(payload.trim_end()).is_ok());
        }
    }
});
