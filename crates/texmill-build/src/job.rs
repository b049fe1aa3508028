//! Compile jobs and the orchestrator that drives them.
//!
//! ```text
//! Planning ──no chain──────────────────────────────┐
//!    │                                             ▼
//!    └─► Looping ──► Refining ──► CleaningUp ──► Done ──► listener
//!           │            │            ▲
//!           └── error ───┴────────────┘
//! ```
//!
//! The loop phase repeats until no tracked artifact changes or the round
//! bound trips. Cleanup and listener notification run on every path that
//! gets past planning; the listener is called exactly once per job.

use crate::artifacts::ArtifactKind;
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::fingerprint::ChangeDetector;
use crate::process::{CancellationToken, ProcessRunner, SystemRunner};
use crate::selector::{NoChain, Pipeline, PipelineNames, select_pipeline};
use crate::tools::{StepOutcome, ToolComponent, ToolRegistry};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on loop rounds before giving up on convergence.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

/// Per-invocation state for building one document.
#[derive(Debug, Clone)]
pub struct CompileJob {
    directory: PathBuf,
    base_name: String,
    output_directory: PathBuf,
    job_name: String,
    required: BTreeSet<ArtifactKind>,
    paths: BTreeMap<ArtifactKind, PathBuf>,
}

impl CompileJob {
    /// Prepares a job for `main_document`, which must be an existing file.
    ///
    /// The document is resolved to its physical location; all derived
    /// artifacts live next to it unless [`CompileJob::with_output`] moves them.
    pub fn new(
        main_document: impl AsRef<Path>,
        required: BTreeSet<ArtifactKind>,
    ) -> Result<Self> {
        let given = main_document.as_ref();
        let source = fs::canonicalize(given).map_err(|source| BuildError::DocumentNotFound {
            path: given.to_path_buf(),
            source,
        })?;
        if !source.is_file() {
            return Err(BuildError::NotAFile(source));
        }

        let base_name = strip_suffix(&source, None);
        if base_name.is_empty() {
            return Err(BuildError::EmptyBaseName(source));
        }

        let directory = source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BuildError::NotAFile(source.clone()))?;

        let mut paths = BTreeMap::new();
        paths.insert(ArtifactKind::Tex, source);
        Ok(Self {
            output_directory: directory.clone(),
            job_name: base_name.clone(),
            directory,
            base_name,
            required,
            paths,
        })
    }

    /// Writes the final artifact to `path` instead of next to the source.
    ///
    /// Engines receive the matching `-output-directory` and `-jobname`, so
    /// every derived artifact follows: `out/report.pdf` puts the
    /// cross-reference table at `out/report.aux`. A relative `path` is taken
    /// from the document's directory, and its parent must already exist. A
    /// missing `.pdf` suffix is implied.
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = self.directory.join(path.as_ref());
        let job_name = strip_suffix(&path, Some(ArtifactKind::FINAL.default_suffix()));
        if job_name.is_empty() {
            return Err(BuildError::InvalidOutput(path));
        }
        let output_directory = match path.parent().map(fs::canonicalize) {
            Some(Ok(dir)) if dir.is_dir() => dir,
            _ => return Err(BuildError::InvalidOutput(path)),
        };

        self.output_directory = output_directory;
        self.job_name = job_name;
        Ok(self)
    }

    /// Working directory of every tool run.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Directory receiving every derived artifact.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// File name stem shared by every derived artifact.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn source(&self) -> &Path {
        &self.paths[&ArtifactKind::Tex]
    }

    pub fn required(&self) -> &BTreeSet<ArtifactKind> {
        &self.required
    }

    /// The path of `kind`: the source for [`ArtifactKind::Tex`], otherwise
    /// `<output_directory>/<job_name>.<suffix>`.
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.paths
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.derived_path(kind))
    }

    fn derived_path(&self, kind: ArtifactKind) -> PathBuf {
        self.output_directory
            .join(format!("{}.{}", self.job_name, kind.default_suffix()))
    }

    /// Fixes a path for every kind not bound yet.
    fn bind_all(&mut self) {
        for kind in ArtifactKind::ALL {
            if !self.paths.contains_key(&kind) {
                let path = self.derived_path(kind);
                self.paths.insert(kind, path);
            }
        }
    }
}

/// File name of `path` without its last extension, or without `suffix`
/// only when one is given.
fn strip_suffix(path: &Path, suffix: Option<&str>) -> String {
    let Some(name) = path.file_name() else {
        return String::new();
    };
    let name = name.to_string_lossy();
    let stem = match (name.rsplit_once('.'), suffix) {
        (Some((stem, _)), None) => stem,
        (Some((stem, ext)), Some(suffix)) if ext.eq_ignore_ascii_case(suffix) => stem,
        _ => name.as_ref(),
    };
    stem.to_string()
}

/// The one artifact ever reported to a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Receives the outcome of a job, exactly once.
pub trait BuildListener {
    fn build_finished(self, artifact: Option<FinalArtifact>);
}

impl<F: FnOnce(Option<FinalArtifact>)> BuildListener for F {
    fn build_finished(self, artifact: Option<FinalArtifact>) {
        self(artifact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Planning,
    Looping,
    Refining,
    CleaningUp,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LoopStatus {
    Converged { rounds: u32 },
    /// The bound tripped; the build went on with the last state.
    RoundLimitExceeded { rounds: u32 },
}

impl LoopStatus {
    pub fn rounds(&self) -> u32 {
        match *self {
            LoopStatus::Converged { rounds } | LoopStatus::RoundLimitExceeded { rounds } => rounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Loop round, or `None` in the refine phase.
    pub round: Option<u32>,
    pub tool: &'static str,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<CleanupFailure>,
}

/// Everything that happened during one job.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub states: Vec<JobState>,
    pub pipeline: Option<PipelineNames>,
    pub no_chain: Option<NoChain>,
    pub loop_status: Option<LoopStatus>,
    pub steps: Vec<StepRecord>,
    pub cleanup: CleanupReport,
    #[serde(serialize_with = "error_message")]
    pub error: Option<BuildError>,
    pub artifact: Option<FinalArtifact>,
}

fn error_message<S: Serializer>(
    error: &Option<BuildError>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(error) => s.serialize_some(&error.to_string()),
        None => s.serialize_none(),
    }
}

impl BuildReport {
    fn enter(&mut self, state: JobState) {
        debug!("job state: {:?}", state);
        self.states.push(state);
    }

    pub fn succeeded(&self) -> bool {
        self.artifact.is_some() && self.error.is_none()
    }

    /// Number of loop rounds run; zero when the loop never started.
    pub fn rounds(&self) -> u32 {
        match self.loop_status {
            Some(status) => status.rounds(),
            None => self
                .steps
                .iter()
                .filter_map(|s| s.round)
                .max()
                .unwrap_or(0),
        }
    }
}

/// Runs compile jobs against a tool registry.
///
/// An orchestrator holds no per-job state and may be shared between threads
/// building independent documents.
#[derive(Debug, Clone)]
pub struct Orchestrator<'r> {
    registry: &'r ToolRegistry,
    runner: Arc<dyn ProcessRunner>,
    max_rounds: u32,
    cancel: CancellationToken,
}

impl<'r> Orchestrator<'r> {
    pub fn new(registry: &'r ToolRegistry, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry,
            runner,
            max_rounds: DEFAULT_MAX_ROUNDS,
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator with a [`SystemRunner`] configured from `config`.
    pub fn from_config(registry: &'r ToolRegistry, config: &BuildConfig) -> Self {
        let runner = SystemRunner::new().with_timeout(config.process_timeout());
        Self::new(registry, Arc::new(runner)).with_max_rounds(config.max_rounds)
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Selects a pipeline for `job` without running it.
    pub fn plan(&self, job: &CompileJob) -> std::result::Result<Pipeline<'r>, NoChain> {
        select_pipeline(self.registry, job.required())
    }

    /// Runs `job` to completion and notifies `listener` once.
    pub fn run<L: BuildListener>(&self, mut job: CompileJob, listener: L) -> BuildReport {
        let mut report = BuildReport::default();
        info!("building {}", job.source().display());

        report.enter(JobState::Planning);
        let pipeline = match self.plan(&job) {
            Ok(pipeline) => pipeline,
            Err(reason) => {
                warn!("no tool chain for {}: {}", job.source().display(), reason);
                report.no_chain = Some(reason);
                report.enter(JobState::Done);
                listener.build_finished(None);
                return report;
            }
        };
        report.pipeline = Some(pipeline.tool_names());

        if let Err(error) = self.execute(&mut job, &pipeline, &mut report) {
            warn!("build of {} aborted: {}", job.source().display(), error);
            report.error = Some(error);
        }

        report.enter(JobState::CleaningUp);
        report.cleanup = cleanup(&job);

        report.enter(JobState::Done);
        let final_path = job.path(ArtifactKind::FINAL);
        report.artifact = final_path.is_file().then(|| FinalArtifact {
            path: final_path,
            kind: ArtifactKind::FINAL,
        });
        match &report.artifact {
            Some(artifact) => info!("produced {}", artifact.path.display()),
            None => warn!("no {} produced for {}", ArtifactKind::FINAL, job.source().display()),
        }
        listener.build_finished(report.artifact.clone());
        report
    }

    fn execute(
        &self,
        job: &mut CompileJob,
        pipeline: &Pipeline<'_>,
        report: &mut BuildReport,
    ) -> Result<()> {
        report.enter(JobState::Looping);
        job.bind_all();
        let status = self.run_loop(job, pipeline, report)?;
        report.loop_status = Some(status);

        report.enter(JobState::Refining);
        for tool in pipeline.refine_phase() {
            self.step(tool, job, None, report)?;
        }
        Ok(())
    }

    fn run_loop(
        &self,
        job: &CompileJob,
        pipeline: &Pipeline<'_>,
        report: &mut BuildReport,
    ) -> Result<LoopStatus> {
        let mut detectors: Vec<ChangeDetector> = pipeline
            .tracked_kinds()
            .into_iter()
            .map(|kind| ChangeDetector::new(kind, job.path(kind)))
            .collect();
        for detector in &mut detectors {
            detector.observe();
        }

        let mut rounds = 0;
        loop {
            rounds += 1;
            debug!("loop round {}", rounds);
            for tool in pipeline.loop_phase() {
                self.step(tool, job, Some(rounds), report)?;
            }

            let changed: Vec<ArtifactKind> = detectors
                .iter_mut()
                .filter_map(|d| d.observe().then(|| d.kind()))
                .collect();
            if changed.is_empty() {
                info!("converged after {} round(s)", rounds);
                return Ok(LoopStatus::Converged { rounds });
            }
            debug!("round {} changed {:?}", rounds, changed);

            if rounds > self.max_rounds {
                warn!(
                    "no convergence after {} rounds, still changing: {:?}",
                    rounds, changed
                );
                return Ok(LoopStatus::RoundLimitExceeded { rounds });
            }
        }
    }

    fn step(
        &self,
        tool: &ToolComponent,
        job: &CompileJob,
        round: Option<u32>,
        report: &mut BuildReport,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let outcome = tool.invoke(job, self.runner.as_ref(), &self.cancel)?;
        report.steps.push(StepRecord {
            round,
            tool: tool.name(),
            outcome,
        });
        Ok(())
    }
}

/// Best-effort removal of every transient artifact of `job`.
fn cleanup(job: &CompileJob) -> CleanupReport {
    let mut report = CleanupReport::default();
    for kind in ArtifactKind::ALL.into_iter().filter(|k| k.delete_after_build()) {
        let path = job.path(kind);
        if path == job.source() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed {} {}", kind, path.display());
                report.deleted.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("could not remove {} {}: {}", kind, path.display(), e);
                report.failed.push(CleanupFailure {
                    kind,
                    path,
                    error: e.to_string(),
                });
            }
        }
    }
    report
}
