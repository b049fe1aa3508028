//! Tool capability model.
//!
//! Each external tool is one [`ToolSpec`] record in a table: what it
//! consumes and produces, which declared requirements it can satisfy, how
//! to build its command line, and whether it runs natively or impersonates
//! another tool through extra flags. There is no per-tool type; every tool
//! executes through the shared [`ToolComponent::invoke`].
//!
//! ```text
//! ToolSpec (static table row)
//!     │  resolved once by ToolRegistry via ToolProbe
//!     ▼
//! ToolComponent { program: Option<PathBuf> }  ── invoke ──► ProcessRunner
//! ```

mod registry;
mod table;

pub use registry::{SystemProbe, ToolDescriptor, ToolProbe, ToolRegistry};
pub use table::builtin_tools;

use crate::artifacts::ArtifactKind;
use crate::error::{BuildError, ProcessError, Result};
use crate::job::CompileJob;
use crate::process::{CancellationToken, Invocation, ProcessRunner};
use log::{debug, info, warn};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The slot a tool fills in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolRole {
    /// Main engine, always part of the loop phase.
    Engine,
    Bibliography,
    Index,
    /// Device-independent to PostScript converter.
    DviToPs,
    /// PostScript to final artifact converter.
    PsToPdf,
}

/// How the executable is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The binary is the tool.
    Native,
    /// A more general binary made to behave like the tool.
    ///
    /// `flags` are prepended to the command line. `probe` must occur in the
    /// binary's `--help` output or the tool is unusable.
    Impersonate {
        flags: &'static [&'static str],
        probe: &'static str,
    },
}

/// Paths handed to an argument builder.
#[derive(Debug)]
pub struct ArgContext<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    /// Working directory of the run.
    pub directory: &'a Path,
    /// Where the engine must write; differs from `directory` for moved outputs.
    pub output_directory: &'a Path,
    pub base_name: &'a str,
    pub job_name: &'a str,
}

impl ArgContext<'_> {
    /// `path` relative to the working directory when it lives inside it.
    ///
    /// TeX tools refuse to write next to absolute paths under the default
    /// `openout_any=p` policy.
    pub fn relative(&self, path: &Path) -> OsString {
        path.strip_prefix(self.directory)
            .unwrap_or(path)
            .as_os_str()
            .to_os_string()
    }
}

pub type ArgBuilder = fn(&ArgContext<'_>) -> Vec<OsString>;

/// Static description of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub role: ToolRole,
    pub executable: &'static str,
    pub strategy: Strategy,
    /// Artifact that must exist for the tool to have anything to do.
    pub input: ArtifactKind,
    pub output: ArtifactKind,
    /// Tracked artifacts the tool (re)writes while running.
    pub feedback: &'static [ArtifactKind],
    /// Declarable requirement kinds the tool can satisfy.
    pub supports: &'static [ArtifactKind],
    pub args: ArgBuilder,
}

impl ToolSpec {
    pub fn supports(&self, kind: ArtifactKind) -> bool {
        self.supports.contains(&kind)
    }

    pub fn is_impersonation(&self) -> bool {
        matches!(self.strategy, Strategy::Impersonate { .. })
    }
}

/// What a single component invocation amounted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum StepOutcome {
    Produced { path: PathBuf },
    /// The input was absent; the tool had nothing to do yet.
    SkippedMissingInput { path: PathBuf },
    /// The tool succeeded but left no output behind.
    MissingOutput { path: PathBuf },
}

/// A resolved tool, shared read-only once constructed.
#[derive(Debug)]
pub struct ToolComponent {
    spec: ToolSpec,
    program: Option<PathBuf>,
}

impl ToolComponent {
    pub(crate) fn new(spec: ToolSpec, program: Option<PathBuf>) -> Self {
        Self { spec, program }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn produced_kind(&self) -> ArtifactKind {
        self.spec.output
    }

    pub fn is_usable(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    /// Builds the command line for `job` without running it.
    pub fn invocation(&self, job: &CompileJob) -> Option<Invocation> {
        let program = self.program.as_ref()?;
        let input = job.path(self.spec.input);
        let output = job.path(self.spec.output);
        let ctx = ArgContext {
            input: &input,
            output: &output,
            directory: job.directory(),
            output_directory: job.output_directory(),
            base_name: job.base_name(),
            job_name: job.job_name(),
        };

        let mut invocation = Invocation::new(self.spec.name, program, job.directory());
        if let Strategy::Impersonate { flags, .. } = self.spec.strategy {
            invocation = invocation.args(flags.iter().copied());
        }
        Some(invocation.args((self.spec.args)(&ctx)))
    }

    /// Runs the tool for `job`.
    ///
    /// A missing input is not an error: the step is skipped. A non-zero exit
    /// is escalated to [`BuildError::ToolFailed`]. A missing output after a
    /// clean exit is only reported.
    pub fn invoke(
        &self,
        job: &CompileJob,
        runner: &dyn ProcessRunner,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome> {
        let input = job.path(self.spec.input);
        if !input.exists() {
            info!(
                "{}: skipped, {} input {} does not exist",
                self.spec.name,
                self.spec.input,
                input.display()
            );
            return Ok(StepOutcome::SkippedMissingInput { path: input });
        }

        let invocation = self
            .invocation(job)
            .ok_or(BuildError::Unusable(self.spec.name))?;

        debug!("{}: processing {}", self.spec.name, input.display());
        let code = runner
            .run(&invocation, cancel)
            .map_err(|source| match source {
                ProcessError::Cancelled { .. } => BuildError::Cancelled,
                source => BuildError::Process {
                    tool: self.spec.name,
                    source,
                },
            })?;
        if code != 0 {
            warn!(
                "{}: exited with code {} on {}",
                self.spec.name,
                code,
                input.display()
            );
            return Err(BuildError::ToolFailed {
                tool: self.spec.name,
                code,
                input,
            });
        }

        let output = job.path(self.spec.output);
        if output.exists() {
            Ok(StepOutcome::Produced { path: output })
        } else {
            warn!(
                "{}: finished but produced no {} at {}",
                self.spec.name,
                self.spec.output,
                output.display()
            );
            Ok(StepOutcome::MissingOutput { path: output })
        }
    }
}
