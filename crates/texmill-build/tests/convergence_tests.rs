mod common;

use common::{ScriptedRunner, Workspace, registry, write};
use std::sync::Arc;
use texmill_build::job::{JobState, LoopStatus, StepRecord};
use texmill_build::tools::StepOutcome;
use texmill_build::{ArtifactKind, FinalArtifact, Orchestrator};

#[test]
fn test_document_without_feedback_converges_in_one_round() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, _| {
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let orchestrator = Orchestrator::new(&reg, runner.clone());

    let mut seen = Vec::new();
    let report = orchestrator.run(ws.job(&[]), |a: Option<FinalArtifact>| seen.push(a));

    assert_eq!(report.loop_status, Some(LoopStatus::Converged { rounds: 1 }));
    assert_eq!(runner.count("pdflatex"), 1);
    assert_eq!(
        report.states,
        [
            JobState::Planning,
            JobState::Looping,
            JobState::Refining,
            JobState::CleaningUp,
            JobState::Done
        ]
    );
    assert_eq!(
        seen,
        vec![Some(FinalArtifact {
            path: ws.file("doc.pdf"),
            kind: ArtifactKind::Pdf
        })]
    );
    assert!(report.succeeded());
}

#[test]
fn test_stable_cross_references_take_two_rounds() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, _| {
        write(inv, "doc.aux", "\\newlabel{sec:intro}{{1}{1}}");
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[]), |_: Option<FinalArtifact>| {});

    assert_eq!(report.loop_status, Some(LoopStatus::Converged { rounds: 2 }));
    assert_eq!(runner.count("pdflatex"), 2);
    assert!(ws.exists("doc.pdf"));
    assert!(!ws.exists("doc.aux"));
}

#[test]
fn test_identical_rewrites_converge_even_if_mtime_changes() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, n| {
        // Same bytes every time after the first round.
        let toc = if n == 1 { "draft" } else { "final" };
        write(inv, "doc.toc", toc);
        std::thread::sleep(std::time::Duration::from_millis(5));
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner).run(ws.job(&[]), |_: Option<FinalArtifact>| {});
    assert_eq!(report.loop_status, Some(LoopStatus::Converged { rounds: 3 }));
}

#[test]
fn test_volatile_output_hits_round_limit() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, n| {
        write(inv, "doc.aux", format!("\\gdef\\buildstamp{{{}}}", n));
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));

    let mut calls = 0;
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[]), |a: Option<FinalArtifact>| {
            calls += 1;
            assert!(a.is_some());
        });

    assert_eq!(
        report.loop_status,
        Some(LoopStatus::RoundLimitExceeded { rounds: 26 })
    );
    assert_eq!(runner.count("pdflatex"), 26);
    assert_eq!(calls, 1);
    assert!(report.error.is_none());
    assert!(report.succeeded(), "the limit is a warning, not a failure");
    ws.assert_clean();
}

#[test]
fn test_round_limit_is_configurable() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, n| {
        write(inv, "doc.aux", n.to_string());
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner.clone())
        .with_max_rounds(3)
        .run(ws.job(&[]), |_: Option<FinalArtifact>| {});
    assert_eq!(report.rounds(), 4);
    assert_eq!(runner.count("pdflatex"), 4);
}

#[test]
fn test_bibliography_round_trip() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex", "bibtex"]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("pdflatex", |inv, _| {
                write(inv, "doc.aux", "\\citation{knuth84}\\bibdata{refs}");
                let cited = inv.working_dir.join("doc.bbl").exists();
                write(inv, "doc.pdf", if cited { "[1] Knuth" } else { "[?]" });
                Ok(0)
            })
            .on("bibtex", |inv, _| {
                assert_eq!(inv.args, ["doc.aux"]);
                write(inv, "doc.bbl", "\\bibitem{knuth84}");
                Ok(0)
            }),
    );
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[ArtifactKind::Bbl]), |_: Option<FinalArtifact>| {});

    assert_eq!(runner.calls(), ["pdflatex", "bibtex", "pdflatex", "bibtex"]);
    assert_eq!(report.rounds(), 2);
    assert_eq!(std::fs::read_to_string(ws.file("doc.pdf")).unwrap(), "[1] Knuth");
    ws.assert_clean();
}

#[test]
fn test_missing_input_skips_tool_without_failing() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex", "makeindex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, _| {
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[ArtifactKind::Ind]), |_: Option<FinalArtifact>| {});

    assert!(report.succeeded());
    assert_eq!(runner.count("makeindex"), 0);
    assert_eq!(
        report.steps[1],
        StepRecord {
            round: Some(1),
            tool: "makeindex",
            outcome: StepOutcome::SkippedMissingInput {
                path: ws.file("doc.idx")
            },
        }
    );
}

#[test]
fn test_missing_output_is_reported_but_not_fatal() {
    let ws = Workspace::new();
    let reg = registry(&["pdflatex", "bibtex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdflatex", |inv, _| {
        write(inv, "doc.aux", "\\relax");
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[ArtifactKind::Bbl]), |_: Option<FinalArtifact>| {});

    assert!(report.succeeded());
    let bibtex_outcomes: Vec<_> = report
        .steps
        .iter()
        .filter(|s| s.tool == "bibtex")
        .map(|s| &s.outcome)
        .collect();
    assert_eq!(bibtex_outcomes.len(), 2);
    assert!(bibtex_outcomes.iter().all(|o| matches!(o, StepOutcome::MissingOutput { .. })));
}

#[test]
fn test_dvi_chain_runs_refine_phase_once() {
    let ws = Workspace::new();
    let reg = registry(&["latex", "dvips", "ps2pdf"]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("latex", |inv, _| {
                write(inv, "doc.aux", "\\relax");
                write(inv, "doc.dvi", "dvi");
                Ok(0)
            })
            .on("dvips", |inv, _| {
                assert_eq!(inv.args, ["-o", "doc.ps", "doc.dvi"]);
                write(inv, "doc.ps", "%!PS");
                Ok(0)
            })
            .on("ps2pdf", |inv, _| {
                write(inv, "doc.pdf", "%PDF");
                Ok(0)
            }),
    );
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[ArtifactKind::Eps]), |_: Option<FinalArtifact>| {});

    assert_eq!(runner.calls(), ["latex", "latex", "dvips", "ps2pdf"]);
    let refine: Vec<_> = report
        .steps
        .iter()
        .filter(|s| s.round.is_none())
        .map(|s| s.tool)
        .collect();
    assert_eq!(refine, ["dvips", "ps2pdf"]);
    assert!(report.succeeded());
    assert!(ws.exists("doc.pdf"));
    assert!(!ws.exists("doc.dvi"));
    assert!(!ws.exists("doc.ps"));
}

#[test]
fn test_impersonation_flags_precede_tool_arguments() {
    let ws = Workspace::new();
    let reg = registry(&["pdftex"]);
    let runner = Arc::new(ScriptedRunner::new().on("pdftex-as-pdflatex", |inv, _| {
        assert_eq!(inv.program, std::path::Path::new("/fake/bin/pdftex"));
        assert_eq!(inv.args[0], "-fmt=pdflatex");
        assert_eq!(inv.args.last().unwrap(), "doc.tex");
        write(inv, "doc.pdf", "%PDF");
        Ok(0)
    }));
    let report = Orchestrator::new(&reg, runner.clone())
        .run(ws.job(&[]), |_: Option<FinalArtifact>| {});
    assert!(report.succeeded());
    assert_eq!(runner.calls(), ["pdftex-as-pdflatex"]);
}
