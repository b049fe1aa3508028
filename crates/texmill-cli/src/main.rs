use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::debug;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use texmill_build::artifacts::ArtifactKind;
use texmill_build::config::{BuildConfig, CONFIG_FILE_NAME};
use texmill_build::job::{CompileJob, FinalArtifact, Orchestrator};
use texmill_build::selector::select_pipeline;
use texmill_build::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "texmill")]
#[command(about = "Drives LaTeX tool chains until the PDF stops changing", long_about = None)]
struct Cli {
    /// Log debug output, including tool stdout/stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a document down to its final artifact
    Build {
        /// Path to the main .tex file
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Artifact kind the document needs (bibliography, index, eps, png, jpeg, otf)
        #[arg(short = 'r', long = "require", value_name = "KIND")]
        require: Vec<String>,
        /// Where to write the final PDF; auxiliary files follow its name
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Configuration file (defaults to texmill.json beside FILE)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Convergence bound for the compile loop
        #[arg(long, value_name = "N")]
        max_rounds: Option<u32>,
        /// Per-process timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Print the full build report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the tool chain that would be used, without running it
    Plan {
        #[arg(short = 'r', long = "require", value_name = "KIND")]
        require: Vec<String>,
        /// Configuration file (defaults to ./texmill.json if present)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List registered tools and whether they are usable here
    Tools {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// List artifact kinds and their flags
    Kinds,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            path,
            require,
            output,
            config,
            max_rounds,
            timeout,
            json,
        } => {
            let mut config = BuildConfig::discover(config.as_deref(), &path)
                .context("failed to load build configuration")?;
            if let Some(max_rounds) = max_rounds {
                config.max_rounds = max_rounds;
            }
            if timeout.is_some() {
                config.process_timeout_secs = timeout;
            }
            debug!("effective configuration: {:?}", config);

            let required = config.requirements(&require)?;
            let mut job = CompileJob::new(&path, required)
                .with_context(|| format!("cannot build {}", path.display()))?;
            if let Some(output) = output {
                let output = std::env::current_dir()?.join(output);
                job = job.with_output(&output)?;
            }

            let registry = ToolRegistry::with_builtin_tools(Arc::new(config.probe()));
            let orchestrator = Orchestrator::from_config(&registry, &config);

            let mut artifact = None;
            let report = orchestrator.run(job, |a: Option<FinalArtifact>| artifact = a);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if let Some(reason) = &report.no_chain {
                bail!("no usable tool chain: {}", reason);
            }
            if let Some(error) = report.error {
                return Err(error).context("build failed");
            }
            match artifact {
                Some(artifact) if !json => println!("{}", artifact.path.display()),
                Some(_) => {}
                None => bail!("build finished without producing a {}", ArtifactKind::FINAL),
            }
        }
        Commands::Plan {
            require,
            config,
            json,
        } => {
            let config = load_or_default(config.as_deref())?;
            let required = config.requirements(&require)?;
            let registry = ToolRegistry::with_builtin_tools(Arc::new(config.probe()));

            match select_pipeline(&registry, &required) {
                Ok(pipeline) if json => {
                    println!("{}", json!({ "pipeline": pipeline.tool_names() }))
                }
                Ok(pipeline) => println!("{}", pipeline.tool_names()),
                Err(reason) if json => {
                    println!("{}", json!({ "no_chain": reason }));
                    std::process::exit(1);
                }
                Err(reason) => bail!("no usable tool chain: {}", reason),
            }
        }
        Commands::Tools { config, json } => {
            let config = load_or_default(config.as_deref())?;
            let registry = ToolRegistry::with_builtin_tools(Arc::new(config.probe()));

            if json {
                let rows: Vec<_> = registry
                    .descriptors()
                    .map(|d| {
                        let component = d.component();
                        json!({
                            "name": d.name(),
                            "role": d.spec().role,
                            "executable": d.spec().executable,
                            "usable": component.is_usable(),
                            "path": component.program(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for d in registry.descriptors() {
                    let component = d.component();
                    let location = match component.program() {
                        Some(path) => path.display().to_string(),
                        None => "-".to_string(),
                    };
                    println!(
                        "{:<20} {:<14} {:<6} {}",
                        d.name(),
                        format!("{:?}", d.spec().role),
                        if component.is_usable() { "yes" } else { "no" },
                        location
                    );
                }
            }
        }
        Commands::Kinds => {
            for kind in ArtifactKind::ALL {
                println!(
                    "{:<13} .{:<5} {:<28} delete={:<5} track={:<5} declare={}",
                    kind.name(),
                    kind.default_suffix(),
                    kind.mime_type(),
                    kind.delete_after_build(),
                    kind.track_for_convergence(),
                    kind.can_be_declared_requirement()
                );
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Loads `path`, or `./texmill.json` when present, or the defaults.
fn load_or_default(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    match path {
        Some(path) => Ok(BuildConfig::load(path)?),
        None if Path::new(CONFIG_FILE_NAME).is_file() => {
            Ok(BuildConfig::load(Path::new(CONFIG_FILE_NAME))?)
        }
        None => {
            debug!("no {} found, using defaults", CONFIG_FILE_NAME);
            Ok(BuildConfig::default())
        }
    }
}
