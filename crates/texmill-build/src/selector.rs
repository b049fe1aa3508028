//! Pipeline selection.
//!
//! Given the kinds a document declares, pick the tools that will build it:
//!
//! 1. bibliography and index requirements each pull in the first usable tool
//!    of their role, or selection fails as a whole;
//! 2. kinds that cannot be declared are dropped;
//! 3. the first usable engine supporting every remaining kind wins;
//! 4. the engine's output decides the refine chain down to [`ArtifactKind::FINAL`].
//!
//! Selection only reads descriptor priority and usability, so a given
//! environment always yields the same pipeline.

use crate::artifacts::ArtifactKind;
use crate::tools::{ToolComponent, ToolRegistry, ToolRole};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The tools chosen for one job.
#[derive(Debug, Clone)]
pub struct Pipeline<'r> {
    loop_phase: Vec<&'r ToolComponent>,
    refine_phase: Vec<&'r ToolComponent>,
}

impl<'r> Pipeline<'r> {
    /// Main engine first, then bibliography and index tools.
    pub fn loop_phase(&self) -> &[&'r ToolComponent] {
        &self.loop_phase
    }

    /// Empty, or the conversion chain ending at [`ArtifactKind::FINAL`].
    pub fn refine_phase(&self) -> &[&'r ToolComponent] {
        &self.refine_phase
    }

    pub fn engine(&self) -> &'r ToolComponent {
        self.loop_phase[0]
    }

    pub fn tool_names(&self) -> PipelineNames {
        PipelineNames {
            loop_phase: self.loop_phase.iter().map(|c| c.name()).collect(),
            refine_phase: self.refine_phase.iter().map(|c| c.name()).collect(),
        }
    }

    /// Tracked kinds written by loop-phase tools, without duplicates.
    pub fn tracked_kinds(&self) -> BTreeSet<ArtifactKind> {
        self.loop_phase
            .iter()
            .flat_map(|c| c.spec().feedback.iter().copied())
            .filter(|k| k.track_for_convergence())
            .collect()
    }
}

/// Tool names of a [`Pipeline`], for reports and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineNames {
    pub loop_phase: Vec<&'static str>,
    pub refine_phase: Vec<&'static str>,
}

impl fmt::Display for PipelineNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop [{}]", self.loop_phase.join(", "))?;
        if !self.refine_phase.is_empty() {
            write!(f, " then [{}]", self.refine_phase.join(" -> "))?;
        }
        Ok(())
    }
}

/// Why no pipeline could be assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum NoChain {
    /// `kind` was required but no tool of `role` is usable.
    NoAuxiliaryTool { role: ToolRole, kind: ArtifactKind },
    /// No usable engine supports all of `kinds`.
    NoEngine { kinds: Vec<ArtifactKind> },
    /// The engine's output cannot be converted to the final artifact.
    NoConverter { from: ArtifactKind, role: Option<ToolRole> },
}

impl fmt::Display for NoChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoChain::NoAuxiliaryTool { role, kind } => {
                write!(f, "'{}' is required but no {:?} tool is usable", kind, role)
            }
            NoChain::NoEngine { kinds } => {
                let names: Vec<_> = kinds.iter().map(|k| k.name()).collect();
                write!(f, "no usable engine supports [{}]", names.join(", "))
            }
            NoChain::NoConverter { from, role: Some(role) } => {
                write!(f, "no usable {:?} converter for {} output", role, from)
            }
            NoChain::NoConverter { from, role: None } => {
                write!(f, "{} output cannot be converted to {}", from, ArtifactKind::FINAL)
            }
        }
    }
}

/// Kinds pulled into the loop phase by a dedicated tool, in run order.
const AUXILIARY: [(ArtifactKind, ToolRole); 2] = [
    (ArtifactKind::Bbl, ToolRole::Bibliography),
    (ArtifactKind::Ind, ToolRole::Index),
];

fn first_usable(registry: &ToolRegistry, role: ToolRole) -> Option<&ToolComponent> {
    registry
        .by_role(role)
        .map(|d| d.component())
        .find(|c| c.is_usable())
}

/// Assembles a pipeline for a document declaring `required`.
pub fn select_pipeline<'r>(
    registry: &'r ToolRegistry,
    required: &BTreeSet<ArtifactKind>,
) -> Result<Pipeline<'r>, NoChain> {
    let mut remaining = required.clone();
    let mut loop_phase = Vec::new();

    for (kind, role) in AUXILIARY {
        if remaining.remove(&kind) {
            let tool = first_usable(registry, role).ok_or(NoChain::NoAuxiliaryTool { role, kind })?;
            debug!("{} satisfied by {}", kind, tool.name());
            loop_phase.push(tool);
        }
    }

    remaining.retain(|k| k.can_be_declared_requirement());

    let engine = registry
        .by_role(ToolRole::Engine)
        .filter(|d| remaining.iter().all(|k| d.supports(*k)))
        .map(|d| d.component())
        .find(|c| c.is_usable())
        .ok_or_else(|| NoChain::NoEngine {
            kinds: remaining.iter().copied().collect(),
        })?;
    loop_phase.insert(0, engine);

    let refine_roles: &[ToolRole] = match engine.produced_kind() {
        ArtifactKind::Pdf => &[],
        ArtifactKind::Dvi => &[ToolRole::DviToPs, ToolRole::PsToPdf],
        ArtifactKind::Ps => &[ToolRole::PsToPdf],
        other => {
            return Err(NoChain::NoConverter {
                from: other,
                role: None,
            });
        }
    };
    let refine_phase = refine_roles
        .iter()
        .map(|&role| {
            first_usable(registry, role).ok_or(NoChain::NoConverter {
                from: engine.produced_kind(),
                role: Some(role),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pipeline = Pipeline {
        loop_phase,
        refine_phase,
    };
    info!("selected pipeline: {}", pipeline.tool_names());
    Ok(pipeline)
}
