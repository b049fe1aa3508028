use super::{ArgContext, Strategy, ToolRole, ToolSpec};
use crate::artifacts::ArtifactKind::{self, *};
use std::ffi::OsString;

const ENGINE_FEEDBACK: &[ArtifactKind] = &[Aux, Toc, Lof, Lot, Out, Idx];
const PDF_GRAPHICS: &[ArtifactKind] = &[Png, Jpeg];
const PDF_GRAPHICS_AND_FONTS: &[ArtifactKind] = &[Png, Jpeg, Otf];
const DVI_GRAPHICS: &[ArtifactKind] = &[Eps];

fn engine_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-interaction=nonstopmode".into(),
        "-halt-on-error".into(),
        "-file-line-error".into(),
    ];
    if ctx.output_directory != ctx.directory {
        let mut flag = OsString::from("-output-directory=");
        flag.push(ctx.relative(ctx.output_directory));
        args.push(flag);
    }
    if ctx.job_name != ctx.base_name {
        args.push(format!("-jobname={}", ctx.job_name).into());
    }
    args.push(ctx.relative(ctx.input));
    args
}

fn bibtex_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    vec![ctx.relative(ctx.input)]
}

fn index_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    vec!["-o".into(), ctx.relative(ctx.output), ctx.relative(ctx.input)]
}

fn dvips_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    vec!["-o".into(), ctx.relative(ctx.output), ctx.relative(ctx.input)]
}

fn ps2pdf_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    vec![ctx.relative(ctx.input), ctx.relative(ctx.output)]
}

fn gs_pdfwrite_args(ctx: &ArgContext<'_>) -> Vec<OsString> {
    let mut output_file = OsString::from("-sOutputFile=");
    output_file.push(ctx.relative(ctx.output));
    vec!["-q".into(), output_file, ctx.relative(ctx.input)]
}

const fn engine(
    name: &'static str,
    executable: &'static str,
    strategy: Strategy,
    output: ArtifactKind,
    supports: &'static [ArtifactKind],
) -> ToolSpec {
    ToolSpec {
        name,
        role: ToolRole::Engine,
        executable,
        strategy,
        input: Tex,
        output,
        feedback: ENGINE_FEEDBACK,
        supports,
        args: engine_args,
    }
}

#[allow(clippy::too_many_arguments)]
const fn auxiliary(
    name: &'static str,
    role: ToolRole,
    executable: &'static str,
    strategy: Strategy,
    input: ArtifactKind,
    output: ArtifactKind,
    feedback: &'static [ArtifactKind],
    args: super::ArgBuilder,
) -> ToolSpec {
    ToolSpec {
        name,
        role,
        executable,
        strategy,
        input,
        output,
        feedback,
        supports: &[],
        args,
    }
}

/// Built-in tools, in priority order within each role.
///
/// Native engines come first, impersonating variants last.
const BUILTIN: &[ToolSpec] = &[
    engine("pdflatex", "pdflatex", Strategy::Native, Pdf, PDF_GRAPHICS),
    engine("xelatex", "xelatex", Strategy::Native, Pdf, PDF_GRAPHICS_AND_FONTS),
    engine("lualatex", "lualatex", Strategy::Native, Pdf, PDF_GRAPHICS_AND_FONTS),
    engine("latex", "latex", Strategy::Native, Dvi, DVI_GRAPHICS),
    engine(
        "pdftex-as-pdflatex",
        "pdftex",
        Strategy::Impersonate {
            flags: &["-fmt=pdflatex"],
            probe: "-fmt",
        },
        Pdf,
        PDF_GRAPHICS,
    ),
    engine(
        "luatex-as-lualatex",
        "luatex",
        Strategy::Impersonate {
            flags: &["--fmt=lualatex"],
            probe: "--fmt",
        },
        Pdf,
        PDF_GRAPHICS_AND_FONTS,
    ),
    engine(
        "pdftex-as-latex",
        "pdftex",
        Strategy::Impersonate {
            flags: &["-fmt=latex", "-output-format=dvi"],
            probe: "-output-format",
        },
        Dvi,
        DVI_GRAPHICS,
    ),
    auxiliary(
        "bibtex",
        ToolRole::Bibliography,
        "bibtex",
        Strategy::Native,
        Aux,
        Bbl,
        &[Bbl],
        bibtex_args,
    ),
    auxiliary(
        "bibtexu",
        ToolRole::Bibliography,
        "bibtexu",
        Strategy::Native,
        Aux,
        Bbl,
        &[Bbl],
        bibtex_args,
    ),
    auxiliary(
        "bibtex8",
        ToolRole::Bibliography,
        "bibtex8",
        Strategy::Native,
        Aux,
        Bbl,
        &[Bbl],
        bibtex_args,
    ),
    auxiliary(
        "makeindex",
        ToolRole::Index,
        "makeindex",
        Strategy::Native,
        Idx,
        Ind,
        &[Ind],
        index_args,
    ),
    auxiliary(
        "texindy",
        ToolRole::Index,
        "texindy",
        Strategy::Native,
        Idx,
        Ind,
        &[Ind],
        index_args,
    ),
    auxiliary(
        "dvips",
        ToolRole::DviToPs,
        "dvips",
        Strategy::Native,
        Dvi,
        Ps,
        &[],
        dvips_args,
    ),
    auxiliary(
        "ps2pdf",
        ToolRole::PsToPdf,
        "ps2pdf",
        Strategy::Native,
        Ps,
        Pdf,
        &[],
        ps2pdf_args,
    ),
    auxiliary(
        "gs-as-ps2pdf",
        ToolRole::PsToPdf,
        "gs",
        Strategy::Impersonate {
            flags: &["-sDEVICE=pdfwrite", "-dNOPAUSE", "-dBATCH", "-dSAFER"],
            probe: "pdfwrite",
        },
        Ps,
        Pdf,
        &[],
        gs_pdfwrite_args,
    ),
];

pub fn builtin_tools() -> Vec<ToolSpec> {
    BUILTIN.to_vec()
}
