#![no_main]
use libfuzzer_sys::fuzz_target;
use texmill_build::artifacts::{ArtifactKind, parse_requirements};

fuzz_target!(|data: &[u8]| {
    // Requirement lists arrive from the command line and texmill.json, so any
    // text must either parse or be rejected without panicking.
    let s = String::from_utf8_lossy(data);
    let items: Vec<&str> = s.split(|c: char| c == ',' || c.is_whitespace()).collect();

    if let Ok(kinds) = parse_requirements(&items) {
        for kind in kinds {
            assert!(kind.can_be_declared_requirement());
            assert_eq!(ArtifactKind::lookup(kind.name()), Some(kind));
        }
    }
    for item in items {
        if let Some(kind) = ArtifactKind::lookup(item) {
            assert_eq!(item.parse::<ArtifactKind>().ok(), Some(kind));
        }
    }
});
