mod common;

use common::registry;
use std::collections::BTreeSet;
use texmill_build::artifacts::parse_requirements;
use texmill_build::{ArtifactKind, NoChain, select_pipeline};

#[test]
fn test_selection_is_deterministic() {
    let installed = ["bibtex8", "bibtex", "lualatex", "xelatex", "makeindex", "texindy"];
    let required = parse_requirements(["otf", "bibliography", "index"]).unwrap();

    let first = {
        let reg = registry(&installed);
        select_pipeline(&reg, &required).unwrap().tool_names()
    };
    assert_eq!(first.loop_phase, ["xelatex", "bibtex", "makeindex"]);

    for _ in 0..10 {
        let reg = registry(&installed);
        let again = select_pipeline(&reg, &required).unwrap().tool_names();
        assert_eq!(again, first);
        // Same registry, second call.
        assert_eq!(select_pipeline(&reg, &required).unwrap().tool_names(), first);
    }
}

#[test]
fn test_earlier_engine_wins_when_both_qualify() {
    let reg = registry(&["lualatex", "xelatex", "pdftex"]);
    let p = select_pipeline(&reg, &BTreeSet::new()).unwrap();
    assert_eq!(p.engine().name(), "xelatex");
}

#[test]
fn test_no_partial_pipeline_without_bibliography_tool() {
    let reg = registry(&["pdflatex", "latex", "dvips", "ps2pdf", "makeindex"]);
    for extra in [vec![], vec!["index"], vec!["eps", "index"]] {
        let mut required = parse_requirements(extra).unwrap();
        required.insert(ArtifactKind::Bbl);
        assert!(matches!(
            select_pipeline(&reg, &required),
            Err(NoChain::NoAuxiliaryTool { kind: ArtifactKind::Bbl, .. })
        ));
    }
}

#[test]
fn test_refine_phase_always_ends_at_final_kind() {
    let cases: &[(&[&'static str], &[&str])] = &[
        (&["pdflatex"], &[]),
        (&["latex", "dvips", "ps2pdf"], &["eps"]),
        (&["pdftex", "dvips", "gs"], &["eps"]),
        (&["luatex"], &["otf", "png"]),
    ];
    for (installed, required) in cases {
        let reg = registry(installed);
        let required = parse_requirements(required.iter()).unwrap();
        let p = select_pipeline(&reg, &required).unwrap();
        let last = p.refine_phase().last().copied().unwrap_or(p.engine());
        assert_eq!(last.produced_kind(), ArtifactKind::FINAL, "{:?}", installed);
        assert!(p.loop_phase().iter().chain(p.refine_phase()).all(|c| c.is_usable()));
    }
}

#[test]
fn test_nothing_installed() {
    let reg = registry(&[]);
    assert_eq!(
        select_pipeline(&reg, &BTreeSet::new()).unwrap_err(),
        NoChain::NoEngine { kinds: vec![] }
    );
}
