//! The closed set of artifact kinds that flow through a LaTeX tool chain.
//!
//! Every kind carries a default file suffix, a MIME-like tag and three flags
//! which drive the orchestrator:
//!
//! | flag | effect |
//! |------|--------|
//! | `delete_after_build` | removed during cleanup, whatever the outcome |
//! | `track_for_convergence` | gets a [`ChangeDetector`] in the loop phase |
//! | `can_be_declared_requirement` | may appear in the required-kinds set of a job |
//!
//! [`ChangeDetector`]: crate::fingerprint::ChangeDetector
//!
//! [`ArtifactKind::FINAL`] is the single ultimate target of every pipeline.

use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The main LaTeX source document.
    Tex,
    /// BibTeX database referenced by the document.
    Bib,
    /// Cross-reference table written by the engine.
    Aux,
    Toc,
    Lof,
    Lot,
    /// hyperref outline entries.
    Out,
    /// Bibliography list produced by a bibliography tool.
    Bbl,
    Blg,
    /// Raw index entries written by the engine.
    Idx,
    /// Sorted index produced by an index tool.
    Ind,
    Ilg,
    Log,
    Eps,
    Png,
    Jpeg,
    Otf,
    /// Device-independent intermediate.
    Dvi,
    /// PostScript intermediate.
    Ps,
    Pdf,
}

struct KindInfo {
    name: &'static str,
    suffix: &'static str,
    mime: &'static str,
    delete_after_build: bool,
    track_for_convergence: bool,
    declarable: bool,
}

const fn info(
    name: &'static str,
    suffix: &'static str,
    mime: &'static str,
    delete_after_build: bool,
    track_for_convergence: bool,
    declarable: bool,
) -> KindInfo {
    KindInfo {
        name,
        suffix,
        mime,
        delete_after_build,
        track_for_convergence,
        declarable,
    }
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 20] = [
        ArtifactKind::Tex,
        ArtifactKind::Bib,
        ArtifactKind::Aux,
        ArtifactKind::Toc,
        ArtifactKind::Lof,
        ArtifactKind::Lot,
        ArtifactKind::Out,
        ArtifactKind::Bbl,
        ArtifactKind::Blg,
        ArtifactKind::Idx,
        ArtifactKind::Ind,
        ArtifactKind::Ilg,
        ArtifactKind::Log,
        ArtifactKind::Eps,
        ArtifactKind::Png,
        ArtifactKind::Jpeg,
        ArtifactKind::Otf,
        ArtifactKind::Dvi,
        ArtifactKind::Ps,
        ArtifactKind::Pdf,
    ];

    /// The ultimate target of every pipeline.
    pub const FINAL: ArtifactKind = ArtifactKind::Pdf;

    fn info(self) -> KindInfo {
        use ArtifactKind::*;
        match self {
            Tex => info("source", "tex", "text/x-tex", false, false, false),
            Bib => info("bibdb", "bib", "text/x-bibtex", false, false, false),
            Aux => info("xref", "aux", "application/x-latex-aux", true, true, false),
            Toc => info("toc", "toc", "application/x-latex-toc", true, true, false),
            Lof => info("lof", "lof", "application/x-latex-lof", true, true, false),
            Lot => info("lot", "lot", "application/x-latex-lot", true, true, false),
            Out => info("outline", "out", "application/x-latex-out", true, true, false),
            Bbl => info("bibliography", "bbl", "text/x-bbl", true, true, true),
            Blg => info("biblog", "blg", "text/x-blg", true, false, false),
            Idx => info("idx", "idx", "application/x-makeindex-idx", true, true, false),
            Ind => info("index", "ind", "application/x-makeindex-ind", true, true, true),
            Ilg => info("indexlog", "ilg", "text/x-ilg", true, false, false),
            Log => info("log", "log", "text/x-log", false, false, false),
            Eps => info("eps", "eps", "image/x-eps", false, false, true),
            Png => info("png", "png", "image/png", false, false, true),
            Jpeg => info("jpeg", "jpg", "image/jpeg", false, false, true),
            Otf => info("otf", "otf", "font/otf", false, false, true),
            Dvi => info("dvi", "dvi", "application/x-dvi", true, false, false),
            Ps => info("postscript", "ps", "application/postscript", true, false, false),
            Pdf => info("pdf", "pdf", "application/pdf", false, false, false),
        }
    }

    /// Display name, also accepted by [`ArtifactKind::lookup`].
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Suffix used when deriving `<directory>/<baseName>.<suffix>`.
    pub fn default_suffix(self) -> &'static str {
        self.info().suffix
    }

    pub fn mime_type(self) -> &'static str {
        self.info().mime
    }

    pub fn delete_after_build(self) -> bool {
        self.info().delete_after_build
    }

    pub fn track_for_convergence(self) -> bool {
        self.info().track_for_convergence
    }

    pub fn can_be_declared_requirement(self) -> bool {
        self.info().declarable
    }

    /// Matches `s` case-insensitively against display name, suffix and MIME tag.
    pub fn lookup(s: &str) -> Option<Self> {
        let needle = s.trim().trim_start_matches('.');
        Self::ALL.into_iter().find(|kind| {
            let info = kind.info();
            needle.eq_ignore_ascii_case(info.name)
                || needle.eq_ignore_ascii_case(info.suffix)
                || needle.eq_ignore_ascii_case(info.mime)
        })
    }

    /// Resolves an externally declared requirement string.
    ///
    /// Unknown strings and kinds that cannot be declared are rejected rather
    /// than silently dropped.
    pub fn parse_requirement(s: &str) -> Result<Self> {
        let kind = s.parse::<ArtifactKind>()?;
        if !kind.can_be_declared_requirement() {
            return Err(BuildError::NotDeclarable(kind));
        }
        Ok(kind)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::lookup(s).ok_or_else(|| BuildError::UnknownKind(s.to_string()))
    }
}

/// Parses a list of requirement strings into a set, failing on the first bad entry.
pub fn parse_requirements<I, S>(items: I) -> Result<BTreeSet<ArtifactKind>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| ArtifactKind::parse_requirement(s.as_ref()))
        .collect()
}
