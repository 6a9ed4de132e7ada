use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use feature_assembler::config::{self, BuildDefinition, ConfigDoc};
use feature_assembler::driver::{AssemblyDriver, UnitOutcome};
use feature_assembler::script::AntScriptSink;
use feature_assembler::tree::FsTree;
use feature_assembler::workspace::{self, WorkspacePaths};
use feature_assembler::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan every (feature, config) unit and print the scripts
    Plan {
        /// Path to a build definition TOML
        build: PathBuf,
        /// Print the step lists as JSON instead of Ant XML
        #[arg(long)]
        json: bool,
        /// Override a `[build]` key, e.g. `--set format=antzip`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
    },
    /// Plan every unit and write one assemble script per unit
    Generate {
        /// Path to a build definition TOML
        build: PathBuf,
        /// Output directory, `@alias/...` allowed (defaults to `[workspace] out_dir`)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Max number of units planned concurrently (0 = use CPU count)
        #[arg(long, default_value_t = 0)]
        max_parallel: usize,
        /// Override a `[build]` key, e.g. `--set label=I.Nightly`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
    },
    /// Load the build definition and print the fully-resolved TOML (after imports/extends)
    Resolve {
        /// Path to a build definition TOML
        build: PathBuf,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);
    match args.cmd {
        Command::Plan { build, json, sets } => cmd_plan(&build, json, &sets),
        Command::Generate {
            build,
            out,
            max_parallel,
            sets,
        } => cmd_generate(&build, out, max_parallel, &sets),
        Command::Resolve { build } => cmd_resolve(&build),
    }
}

fn load(path: &Path, sets: &[String]) -> Result<(ConfigDoc, BuildDefinition)> {
    let mut doc = config::load(path)?;
    config::apply_overrides(&mut doc, sets)?;
    let def = BuildDefinition::from_doc(&doc)?;
    if def.features.is_empty() {
        return Err(Error::msg(format!(
            "{}: build.features is empty, nothing to assemble",
            path.display()
        )));
    }
    Ok((doc, def))
}

fn driver(def: &BuildDefinition, paths: WorkspacePaths) -> AssemblyDriver {
    let tree = Arc::new(FsTree::new(paths.root.clone()));
    AssemblyDriver::new(
        def.settings.clone(),
        def.advisor(),
        def.site.clone(),
        paths,
        tree,
        def.configs.clone(),
    )
}

fn check_outcomes(outcomes: &[UnitOutcome]) -> Result<()> {
    let failed: Vec<String> = outcomes
        .iter()
        .filter_map(|o| {
            o.result
                .as_ref()
                .err()
                .map(|e| format!("{} [{}]: {e}", o.feature, o.config))
        })
        .collect();
    if failed.is_empty() {
        return Ok(());
    }
    Err(Error::msg(format!(
        "{} of {} units failed:\n  {}",
        failed.len(),
        outcomes.len(),
        failed.join("\n  ")
    )))
}

fn cmd_plan(path: &Path, json: bool, sets: &[String]) -> Result<()> {
    let (doc, def) = load(path, sets)?;
    let paths = workspace::load_paths(&def.workspace, &doc.base_dir())?;
    let outcomes = driver(&def, paths).generate(&def.features);

    let stdout = io::stdout();
    let scripts: Vec<_> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .collect();
    if json {
        let s = serde_json::to_string_pretty(&scripts)
            .map_err(|e| Error::msg(format!("failed to encode plan: {e}")))?;
        println!("{s}");
    } else {
        for script in scripts {
            println!("<!-- {} -->", script.file_name);
            let mut sink = AntScriptSink::new(stdout.lock(), "<stdout>");
            script.write_to(&mut sink)?;
        }
    }
    let _ = stdout.lock().flush();
    check_outcomes(&outcomes)
}

fn cmd_generate(path: &Path, out: Option<PathBuf>, max_parallel: usize, sets: &[String]) -> Result<()> {
    let (doc, def) = load(path, sets)?;
    let mut ws_cfg = def.workspace.clone();
    if let Some(out) = out {
        let paths = workspace::load_paths(&ws_cfg, &doc.base_dir())?;
        let out = paths.resolve_config_path(&out.to_string_lossy())?;
        ws_cfg.out_dir = out.to_string_lossy().into_owned();
    }
    let paths = workspace::init_dirs(&ws_cfg, &doc.base_dir())?;
    let out_dir = paths.out_dir.clone();

    let outcomes = driver(&def, paths).generate_parallel(&def.features, max_parallel);
    for o in &outcomes {
        if let Ok(script) = &o.result {
            let written = script.write_ant_file(&out_dir)?;
            info!(path = %written.display(), "wrote assemble script");
        }
    }
    check_outcomes(&outcomes)
}

fn cmd_resolve(path: &Path) -> Result<()> {
    let doc = config::load(path)?;
    // Best-effort pretty print of the resolved definition.
    let s = toml::to_string_pretty(&doc.value).unwrap_or_else(|_| format!("{:?}", doc.value));
    print!("{s}");
    Ok(())
}
