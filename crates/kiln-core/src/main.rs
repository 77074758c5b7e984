use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kiln_contract::AppManifest;
use kiln_core::{
    load_schedule, render_build_plan, render_history, render_migration_plan, Confirmation,
    DirContractSource, DryRunWork, KilnConfig, Orchestrator, OrchestratorError, CONFIG_FILE,
};
use kiln_kernel::{ExecutionResult, RunFailure, RunSummary};
use kiln_migrate::FileStateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn manifest_arg() -> Arg {
    Arg::new("manifest")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Application manifest (YAML)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

fn cli() -> Command {
    Command::new("kiln")
        .version(kiln_core::VERSION)
        .about("Dependency-ordered builds and contract migrations for multi-service applications")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (defaults to kiln.toml next to the manifest)"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .global(true)
                .value_parser(value_parser!(usize))
                .help("Maximum nodes of a wave running at once (0 = unbounded)"),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the build waves")
                .arg(manifest_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Walk the build waves with a dry-run unit of work")
                .arg(manifest_arg())
                .arg(
                    Arg::new("service")
                        .long("service")
                        .help("Run only this service"),
                )
                .arg(
                    Arg::new("plan")
                        .long("plan")
                        .value_parser(value_parser!(PathBuf))
                        .conflicts_with("service")
                        .help("Run a plan saved with `kiln plan --json` instead of re-planning"),
                ),
        )
        .subcommand(
            Command::new("migrate")
                .about("Contract migrations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("plan")
                        .about("Show pending contract changes (initializes state on first use)")
                        .arg(manifest_arg())
                        .arg(json_arg()),
                )
                .subcommand(
                    Command::new("apply")
                        .about("Apply pending changes and record them")
                        .arg(manifest_arg())
                        .arg(
                            Arg::new("yes")
                                .long("yes")
                                .action(ArgAction::SetTrue)
                                .help("Confirm breaking changes"),
                        ),
                )
                .subcommand(
                    Command::new("refactor")
                        .about("Regenerate services from their current contracts")
                        .arg(manifest_arg())
                        .arg(
                            Arg::new("service")
                                .long("service")
                                .action(ArgAction::Append)
                                .help("Service to regenerate (repeatable; default all)"),
                        ),
                )
                .subcommand(
                    Command::new("history")
                        .about("Show recorded migrations, newest first")
                        .arg(manifest_arg()),
                ),
        )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn load_config(args: &ArgMatches, manifest: &Path) -> anyhow::Result<KilnConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => KilnConfig::load(path)?,
        None => {
            let default = manifest_dir(manifest).join(CONFIG_FILE);
            if default.is_file() {
                KilnConfig::load(&default)?
            } else {
                KilnConfig::default()
            }
        }
    };
    if let Some(limit) = args.get_one::<usize>("concurrency") {
        config = config.with_concurrency(*limit);
    }
    Ok(config)
}

fn load_manifest(path: &Path) -> anyhow::Result<AppManifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    Ok(AppManifest::from_yaml_str(&text)?)
}

/// Manifest, orchestrator wired to the directory sources
fn open(args: &ArgMatches) -> anyhow::Result<(AppManifest, Orchestrator)> {
    let path = args
        .get_one::<PathBuf>("manifest")
        .context("manifest path is required")?;
    let manifest = load_manifest(path)?;
    let config = load_config(args, path)?;
    let store = FileStateStore::in_dir(config.state_dir_for(&manifest_dir(path)));

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(DirContractSource::for_manifest(path)),
        Arc::new(DryRunWork),
        Arc::new(store),
    );
    Ok((manifest, orchestrator))
}

/// Print the error and whatever ran before it
fn report_failure(failure: &RunFailure) {
    eprintln!("{failure}");
    print!("{}", RunSummary::from_results(&failure.results));
}

fn summarize(results: &[ExecutionResult]) -> bool {
    let summary = RunSummary::from_results(results);
    print!("{summary}");
    summary.all_succeeded()
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("plan", args)) => {
            let (manifest, kiln) = open(args)?;
            let plan = kiln.plan_build(&manifest)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&plan.schedule)?);
            } else {
                print!("{}", render_build_plan(&plan));
            }
            Ok(true)
        }
        Some(("run", args)) => {
            let (manifest, kiln) = open(args)?;
            if let Some(service) = args.get_one::<String>("service") {
                return Ok(summarize(&[kiln.rerun(&manifest, service).await?]));
            }
            let outcome = match args.get_one::<PathBuf>("plan") {
                Some(path) => kiln.run_schedule(&load_schedule(path)?).await,
                None => kiln.build(&manifest).await,
            };
            match outcome {
                Ok(results) => Ok(summarize(&results)),
                Err(OrchestratorError::RunFailed(failure)) => {
                    report_failure(&failure);
                    Ok(false)
                }
                Err(other) => Err(other.into()),
            }
        }
        Some(("migrate", sub)) => migrate(sub).await,
        _ => Ok(true),
    }
}

async fn migrate(matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("plan", args)) => {
            let (manifest, kiln) = open(args)?;
            let preview = kiln.plan_migration(&manifest)?;
            if preview.initialized {
                println!("State initialized for {}", manifest.app.name);
            }
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&preview.plan)?);
            } else {
                print!("{}", render_migration_plan(&preview.plan));
            }
            Ok(true)
        }
        Some(("apply", args)) => {
            let (manifest, kiln) = open(args)?;
            let confirmation = if args.get_flag("yes") {
                Confirmation::Confirmed
            } else {
                Confirmation::Unconfirmed
            };
            match kiln.apply_migration(&manifest, confirmation).await {
                Ok(outcome) => {
                    print!("{}", render_migration_plan(&outcome.plan));
                    if let Some(record) = outcome.record {
                        println!("Recorded migration {}", record.id);
                    }
                    Ok(true)
                }
                Err(err) if err.needs_confirmation() => {
                    eprintln!("{err}; re-run with --yes to apply");
                    Ok(false)
                }
                Err(OrchestratorError::RunFailed(failure)) => {
                    report_failure(&failure);
                    eprintln!("state left unchanged");
                    Ok(false)
                }
                Err(err) => Err(err.into()),
            }
        }
        Some(("refactor", args)) => {
            let (manifest, kiln) = open(args)?;
            let services: Vec<String> = args
                .get_many::<String>("service")
                .map(|names| names.cloned().collect())
                .unwrap_or_default();
            match kiln.refactor(&manifest, &services).await {
                Ok(record) => {
                    println!("Recorded refactor {} ({} service(s))", record.id, record.changes.len());
                    Ok(true)
                }
                Err(OrchestratorError::RunFailed(failure)) => {
                    report_failure(&failure);
                    eprintln!("state left unchanged");
                    Ok(false)
                }
                Err(err) => Err(err.into()),
            }
        }
        Some(("history", args)) => {
            let (_, kiln) = open(args)?;
            print!("{}", render_history(&kiln.history()?));
            Ok(true)
        }
        _ => Ok(true),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let matches = cli().get_matches();
    let ok = dispatch(&matches).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn parses_nested_migrate_commands() {
        let matches = cli()
            .try_get_matches_from(["kiln", "migrate", "apply", "app.yaml", "--yes", "--concurrency", "2"])
            .unwrap();
        let (_, migrate) = matches.subcommand().unwrap();
        let (name, apply) = migrate.subcommand().unwrap();
        assert_eq!(name, "apply");
        assert!(apply.get_flag("yes"));
        assert_eq!(apply.get_one::<usize>("concurrency"), Some(&2));
    }

    #[test]
    fn run_accepts_a_saved_plan() {
        let matches = cli()
            .try_get_matches_from(["kiln", "run", "app.yaml", "--plan", "plan.json"])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        assert_eq!(run.get_one::<PathBuf>("plan"), Some(&PathBuf::from("plan.json")));

        let clash = cli().try_get_matches_from([
            "kiln", "run", "app.yaml", "--plan", "plan.json", "--service", "user",
        ]);
        assert!(clash.is_err());
    }

    #[test]
    fn manifest_dir_defaults_to_cwd() {
        assert_eq!(manifest_dir(Path::new("app.yaml")), PathBuf::from("."));
        assert_eq!(manifest_dir(Path::new("apps/todo/app.yaml")), PathBuf::from("apps/todo"));
    }
}
