//! # texmill build engine
//!
//! Selects and drives the external tools that turn a LaTeX document into a PDF.
//!
//! ## Overview
//!
//! A build has three concerns:
//!
//! - **Selection**: given the artifact kinds a document declares (bibliography,
//!   index, EPS or PNG graphics, OpenType fonts), pick a main engine, the
//!   auxiliary tools it needs and a conversion chain down to the PDF.
//! - **Convergence**: run the engine and its auxiliary tools repeatedly until
//!   the cross-reference, bibliography and index files stop changing.
//! - **Execution**: spawn each tool, interpret its exit code and the files it
//!   left behind, and clean up transient files afterwards.
//!
//! ## Modules
//!
//! - [`artifacts`] - the closed set of artifact kinds and their flags
//! - [`process`] - subprocess execution with cancellation and timeouts
//! - [`fingerprint`] - content fingerprints and change detection
//! - [`tools`] - the tool table, resolved components and the registry
//! - [`selector`] - pipeline selection
//! - [`job`] - compile jobs and the orchestrator
//! - [`config`] - JSON build configuration
//!
//! ## Examples
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use texmill_build::job::{CompileJob, FinalArtifact, Orchestrator};
//! use texmill_build::process::SystemRunner;
//! use texmill_build::tools::ToolRegistry;
//! use texmill_build::artifacts::ArtifactKind;
//!
//! let required: BTreeSet<_> = [ArtifactKind::Bbl].into_iter().collect();
//! let job = CompileJob::new("paper.tex", required)?;
//!
//! let orchestrator = Orchestrator::new(ToolRegistry::global(), Arc::new(SystemRunner::new()));
//! let report = orchestrator.run(job, |artifact: Option<FinalArtifact>| match artifact {
//!     Some(pdf) => println!("built {}", pdf.path.display()),
//!     None => eprintln!("nothing was produced"),
//! });
//! println!("{} loop round(s)", report.rounds());
//! # Ok::<(), texmill_build::BuildError>(())
//! ```
//!
//! Inspecting the chain without running anything:
//!
//! ```
//! use std::collections::BTreeSet;
//! use texmill_build::selector::select_pipeline;
//! use texmill_build::tools::ToolRegistry;
//!
//! match select_pipeline(ToolRegistry::global(), &BTreeSet::new()) {
//!     Ok(pipeline) => println!("{}", pipeline.tool_names()),
//!     Err(reason) => println!("cannot build here: {}", reason),
//! }
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod process;
pub mod selector;
pub mod tools;

pub use artifacts::ArtifactKind;
pub use config::BuildConfig;
pub use error::{BuildError, ProcessError};
pub use job::{BuildListener, BuildReport, CompileJob, FinalArtifact, Orchestrator};
pub use selector::{NoChain, Pipeline, select_pipeline};
