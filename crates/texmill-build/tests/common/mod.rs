#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use texmill_build::process::{CancellationToken, Invocation, ProcessRunner};
use texmill_build::tools::{ToolProbe, ToolRegistry};
use texmill_build::{ArtifactKind, CompileJob, ProcessError};

/// Pretends the listed executables are installed and support every probed flag.
#[derive(Debug)]
pub struct FakeProbe(pub Vec<&'static str>);

impl ToolProbe for FakeProbe {
    fn locate(&self, executable: &str) -> Option<PathBuf> {
        self.0
            .contains(&executable)
            .then(|| PathBuf::from("/fake/bin").join(executable))
    }

    fn help_text(&self, _program: &Path) -> Option<String> {
        Some("-fmt=FMTNAME -output-format=FORMAT --fmt=FORMAT pdfwrite".into())
    }
}

pub fn registry(installed: &[&'static str]) -> ToolRegistry {
    ToolRegistry::with_builtin_tools(Arc::new(FakeProbe(installed.to_vec())))
}

/// Behaviour of one fake tool. Receives the invocation and the 1-based
/// number of times this tool has been called; returns the exit code.
pub type Script = Box<dyn Fn(&Invocation, u32) -> Result<i32, ProcessError> + Send + Sync>;

/// Runner that simulates tools by writing files instead of spawning processes.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: HashMap<&'static str, Script>,
    calls: Mutex<Vec<&'static str>>,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls)
            .finish()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, tool: &'static str, script: F) -> Self
    where
        F: Fn(&Invocation, u32) -> Result<i32, ProcessError> + Send + Sync + 'static,
    {
        self.scripts.insert(tool, Box::new(script));
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, tool: &str) -> usize {
        self.calls().iter().filter(|t| **t == tool).count()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<i32, ProcessError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.tool);
            calls.iter().filter(|t| **t == invocation.tool).count() as u32
        };
        match self.scripts.get(invocation.tool) {
            Some(script) => script(invocation, nth),
            None => Ok(0),
        }
    }
}

/// Writes `<working_dir>/<name>`.
pub fn write(invocation: &Invocation, name: &str, content: impl AsRef<[u8]>) {
    fs::write(invocation.working_dir.join(name), content).unwrap();
}

/// Where a TeX engine run by `invocation` writes, without the suffix:
/// `-output-directory` joined with `-jobname`, each defaulting to the working
/// directory and the input's stem.
pub fn engine_output_stem(invocation: &Invocation) -> PathBuf {
    let mut dir = invocation.working_dir.clone();
    let mut job_name = None;
    for arg in &invocation.args {
        let arg = arg.to_string_lossy();
        if let Some(out) = arg.strip_prefix("-output-directory=") {
            dir = invocation.working_dir.join(out);
        } else if let Some(name) = arg.strip_prefix("-jobname=") {
            job_name = Some(name.to_string());
        }
    }
    let input = PathBuf::from(invocation.args.last().unwrap());
    let job_name = job_name
        .unwrap_or_else(|| input.file_stem().unwrap().to_string_lossy().into_owned());
    dir.join(job_name)
}

/// Writes `<stem>.<suffix>`.
pub fn write_beside(stem: &Path, suffix: &str, content: impl AsRef<[u8]>) {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    fs::write(path, content).unwrap();
}

/// A scratch directory holding `doc.tex`.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("doc.tex"),
            "\\documentclass{article}\\begin{document}x\\end{document}",
        )
        .unwrap();
        Self { dir }
    }

    pub fn job(&self, required: &[ArtifactKind]) -> CompileJob {
        let required: BTreeSet<_> = required.iter().copied().collect();
        CompileJob::new(self.dir.path().join("doc.tex"), required).unwrap()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        fs::canonicalize(self.dir.path()).unwrap().join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Asserts that no transient artifact of `doc` survived.
    pub fn assert_clean(&self) {
        for kind in ArtifactKind::ALL {
            if kind.delete_after_build() {
                let name = format!("doc.{}", kind.default_suffix());
                assert!(!self.exists(&name), "{} survived cleanup", name);
            }
        }
    }
}
