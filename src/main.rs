//! Pteraform CLI entrypoint.
//!
//! This is the main entrypoint for the pteraform command-line tool. It plays
//! the host's part for `pteraform_apply` units declared in `pteraform.yaml`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pteraform::cli::{Cli, Commands, LogFormat, OutputFormatter, StateCommands};
use pteraform::config::{find_config_file, ConfigParser, ConfigValidator, ProviderConfig};
use pteraform::error::{ConfigError, PteraformError, Result};
use pteraform::planner::{DiffEngine, ExecutionPlan, PlanExecutor};
use pteraform::reconciler::Reconciler;
use pteraform::resource::{apply_resource_schema, LifecycleRequest, Severity, Verb};
use pteraform::runner::{ExecutionContext, TerraformRunner};
use pteraform::state::{release_after, LocalStateStore, StateStore};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `--verbose` forces debug; otherwise `RUST_LOG` is honoured and defaults
/// to info.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. Returns whether every requested action succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    match cli.command {
        Commands::Validate { warnings } => {
            cmd_validate(config_path, warnings, &formatter).map(|()| true)
        }
        Commands::Plan { detailed } => {
            cmd_plan(config_path, detailed, &formatter).await.map(|()| true)
        }
        Commands::Apply { yes, continue_on_error } => {
            cmd_apply(config_path, yes, continue_on_error, &token, &formatter).await
        }
        Commands::Refresh => cmd_refresh(config_path, &token, &formatter).await,
        Commands::Import { unit, id } => {
            cmd_import(config_path, &unit, id, &token, &formatter).await
        }
        Commands::Forget { unit } => cmd_forget(config_path, &unit, &token, &formatter).await,
        Commands::Schema => {
            println!("{}", formatter.format_schema(&apply_resource_schema()));
            Ok(true)
        }
        Commands::State { command } => {
            cmd_state(config_path, command, &formatter).await.map(|()| true)
        }
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let base_dir = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().with_base_dir(&base_dir).collect(&config);
    println!("{}", formatter.format_validation(&result, &config, show_warnings));

    if result.is_valid() {
        Ok(())
    } else {
        ConfigValidator::new().validate(&config).map(|_| ())
    }
}

/// Show the plan apply would run.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let state = workspace.store.load().await?.unwrap_or_default();

    let diff = workspace.diff_engine().compute_diff(&workspace.config, Some(&state));
    let plan = ExecutionPlan::from_diff(&diff);

    println!("{}", formatter.format_plan(&plan, &diff, detailed));
    Ok(())
}

/// Apply the plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    token: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let workspace = Workspace::load(config_path)?;
    let lock = workspace.store.acquire_lock("").await?;
    let result = apply_locked(&workspace, auto_approve, continue_on_error, token, formatter).await;
    release_after(&workspace.store, &lock.lock_id, result).await
}

async fn apply_locked(
    workspace: &Workspace,
    auto_approve: bool,
    continue_on_error: bool,
    token: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let mut state = workspace.store.load().await?.unwrap_or_default();

    let diff = workspace.diff_engine().compute_diff(&workspace.config, Some(&state));
    let plan = ExecutionPlan::from_diff(&diff);

    if plan.is_empty() {
        eprintln!("{}", formatter.success("Nothing to apply."));
        return Ok(true);
    }

    eprintln!("{}", formatter.format_plan(&plan, &diff, false));

    if !auto_approve
        && plan.change_count() > 0
        && !confirm("Do you want to apply this plan? [y/N]: ")?
    {
        eprintln!("Apply cancelled.");
        return Ok(true);
    }

    let ctx = workspace.context(token);
    let reconciler = workspace.reconciler();
    let executor = PlanExecutor::new(&reconciler, &ctx)
        .with_store(&workspace.store)
        .with_continue_on_error(continue_on_error);

    let result = executor.execute(&plan, &mut state).await?;
    workspace.store.save(&state).await?;

    println!("{}", formatter.format_execution(&result));
    Ok(result.all_successful())
}

/// Refresh the identity of every stored unit.
async fn cmd_refresh(
    config_path: Option<&PathBuf>,
    token: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let workspace = Workspace::load(config_path)?;
    let lock = workspace.store.acquire_lock("").await?;

    let result: Result<bool> = async {
        let mut state = workspace.store.load().await?.unwrap_or_default();
        let diff = workspace.diff_engine().compute_diff(&workspace.config, Some(&state));
        let plan = ExecutionPlan::refresh_only(&diff);

        if plan.is_empty() {
            eprintln!("{}", formatter.success("No stored units to refresh."));
            return Ok(true);
        }

        let ctx = workspace.context(token);
        let reconciler = workspace.reconciler();
        let executor = PlanExecutor::new(&reconciler, &ctx)
            .with_store(&workspace.store)
            .with_continue_on_error(true);

        let result = executor.execute(&plan, &mut state).await?;
        workspace.store.save(&state).await?;

        println!("{}", formatter.format_execution(&result));
        Ok(result.all_successful())
    }
    .await;

    release_after(&workspace.store, &lock.lock_id, result).await
}

/// Adopt an existing unit by identity.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    unit: &str,
    id: String,
    token: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let workspace = Workspace::load(config_path)?;
    if workspace.config.unit(unit).is_none() {
        return Err(ConfigError::UnknownUnit {
            name: unit.to_string(),
        }
        .into());
    }

    let lock = workspace.store.acquire_lock("").await?;
    let result: Result<bool> = async {
        let mut state = workspace.store.load().await?.unwrap_or_default();
        if state.get_unit(unit).is_some() {
            return Err(ConfigError::validation(
                format!("'{unit}' is already managed; forget it before importing"),
                "unit",
            )
            .into());
        }

        let ctx = workspace.context(token);
        let response = workspace
            .reconciler()
            .handle(LifecycleRequest::Import { id }, &ctx)
            .await;

        if let Some(record) = response.state.clone() {
            state.set_unit(unit, record, Verb::Import);
            workspace.store.save(&state).await?;
        }

        println!("{}", formatter.format_response(unit, Verb::Import, &response));
        Ok(!response.has_error())
    }
    .await;

    release_after(&workspace.store, &lock.lock_id, result).await
}

/// Drop a unit from the state.
async fn cmd_forget(
    config_path: Option<&PathBuf>,
    unit: &str,
    token: &CancellationToken,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let workspace = Workspace::load(config_path)?;
    let lock = workspace.store.acquire_lock("").await?;

    let result: Result<bool> = async {
        let mut state = workspace.store.load().await?.unwrap_or_default();
        let Some(current) = state.get_unit(unit).map(|u| u.record.clone()) else {
            return Err(PteraformError::from(ConfigError::UnknownUnit {
                name: unit.to_string(),
            }));
        };

        if workspace.config.unit(unit).is_some() {
            eprintln!(
                "{}",
                formatter.message(
                    Severity::Warning,
                    &format!("'{unit}' is still declared; the next apply will create it again")
                )
            );
        }

        let ctx = workspace.context(token);
        let response = workspace
            .reconciler()
            .handle(LifecycleRequest::Delete { current }, &ctx)
            .await;

        if !response.has_error() {
            state.remove_unit(unit);
            workspace.store.save(&state).await?;
        }

        println!("{}", formatter.format_response(unit, Verb::Delete, &response));
        Ok(!response.has_error())
    }
    .await;

    release_after(&workspace.store, &lock.lock_id, result).await
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let store = &workspace.store;

    match command {
        StateCommands::Show => {
            let lock = store.get_lock_info().await?.filter(|l| !l.is_expired());
            if let Some(state) = store.load().await? {
                println!("{}", formatter.format_state(&state, lock.as_ref()));
            } else {
                eprintln!("No state found at {}.", store.state_path().display());
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder.as_deref().unwrap_or("");
            let lock = store.acquire_lock(holder_str).await?;
            println!("{}", formatter.success(&format!("State locked: {}", lock.lock_id)));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                println!("{}", formatter.success("State forcefully unlocked."));
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                println!("{}", formatter.success("State unlocked."));
            } else {
                eprintln!(
                    "{}",
                    formatter.message(Severity::Error, "Please provide --lock-id or use --force")
                );
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loaded configuration together with the state it is tracked in.
struct Workspace {
    /// Validated configuration.
    config: ProviderConfig,
    /// Directory holding the configuration file.
    base_dir: PathBuf,
    /// Local state store.
    store: LocalStateStore,
}

impl Workspace {
    /// Loads, overrides and validates the configuration.
    fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        debug!("Loading configuration from: {}", config_file.display());

        let base_dir = config_dir(&config_file);
        let parser = ConfigParser::new().with_base_path(&base_dir);
        parser.load_dotenv()?;

        let config = parser.load_with_env(&config_file)?;

        let validation = ConfigValidator::new().with_base_dir(&base_dir).validate(&config)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let store = LocalStateStore::for_config_dir(&base_dir, config.state.path.as_deref());

        Ok(Self {
            config,
            base_dir,
            store,
        })
    }

    fn diff_engine(&self) -> DiffEngine {
        DiffEngine::new(&self.base_dir)
    }

    fn reconciler(&self) -> Reconciler<TerraformRunner> {
        let runner = TerraformRunner::new(self.config.binary());
        Reconciler::with_resolver(runner, self.config.resolver())
    }

    /// Context cancelled by Ctrl-C and bounded by `timeout_secs`.
    fn context(&self, token: &CancellationToken) -> ExecutionContext {
        let ctx = ExecutionContext::with_token(token.child_token());
        match self.config.timeout() {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => find_config_file(std::env::current_dir()?)?,
    };
    Ok(std::path::absolute(&path)?)
}

/// Directory relative paths in the configuration are resolved against.
fn config_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Asks for a yes/no answer on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
