#![no_main]

use libfuzzer_sys::fuzz_target;
use reco_core::naming::NamingScheme;
use reco_core::store::decode_artifact_name;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(scheme) = NamingScheme::new("tmp_buf", "reco_backup") else {
        return;
    };

    // Anything the buffer grammar accepts keeps its stem verbatim and
    // survives a rebinding to another pid. Leading zeros in the pid are not
    // preserved, so the full text is not compared.
    if let Some(parsed) = scheme.parse_buffer_name(text) {
        assert!(text.starts_with(parsed.stem()));
        let rebound = parsed.with_pid(parsed.pid().wrapping_add(1));
        let reparsed = scheme
            .parse_buffer_name(&rebound.to_string())
            .expect("rebound name parses");
        assert_eq!(reparsed.sequence(), parsed.sequence());
        assert_eq!(reparsed.stem(), parsed.stem());
    }

    if let Some(session) = scheme.parse_session_name(text) {
        assert!(session.to_string().len() <= text.len());
    }

    let _ = decode_artifact_name(text);
});
