//! trustforge CLI entrypoint.
//!
//! This is the main entrypoint for the trustforge command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use trustforge::cli::{Cli, Commands, OutputFormatter};
use trustforge::config::{ConfigParser, ConfigValidator, FederationConfig, find_config_file};
use trustforge::error::Result;
use trustforge::policy::PolicyCompiler;
use trustforge::reconciler::Reconciler;
use trustforge::GcloudBackend;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { warnings } => {
            cmd_validate(cli.config.as_ref(), warnings).map(|()| ExitCode::SUCCESS)
        }
        Commands::Plan { detailed } => {
            cmd_plan(cli.config.as_ref(), detailed, &formatter).await
        }
        Commands::Apply { yes } => {
            cmd_apply(cli.config.as_ref(), yes, &formatter).await.map(|()| ExitCode::SUCCESS)
        }
        Commands::Check => cmd_check(cli.config.as_ref(), &formatter).await,
        Commands::Policy => cmd_policy(cli.config.as_ref(), &formatter).map(|()| ExitCode::SUCCESS),
        Commands::Cleanup { yes } => {
            cmd_cleanup(cli.config.as_ref(), yes).await.map(|()| ExitCode::SUCCESS)
        }
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new trustforge project in: {}", path.display());

    let config_path = path.join("trustforge.yaml");
    let env_path = path.join(".env.example");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write config template
    let config_template = include_str!("../templates/trustforge.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    // Write .env.example
    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set GOOGLE_OAUTH_ACCESS_TOKEN");
    eprintln!("  2. Edit trustforge.yaml with your project and repository");
    eprintln!("  3. Run 'trustforge validate' to check your configuration");
    eprintln!("  4. Run 'trustforge plan' to see conflicts with live state");
    eprintln!("  5. Run 'trustforge apply' to provision the federation");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let (config, result) = load_and_validate(config_path)?;

    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    // Show summary
    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.id);
    eprintln!("  Service account: {}", config.service_account.email(&config.project.id));
    eprintln!("  Pool/provider: {}/{}", config.pool.id, config.provider.id);
    eprintln!("  Repository: {}", config.trust.repository);

    Ok(())
}

/// Analyze live state and show conflicts.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, _) = load_and_validate(config_path)?;
    let backend = create_backend()?;
    let reconciler = Reconciler::new(&config, &backend);

    let analysis = reconciler.analyze().await?;
    eprintln!("{}", formatter.format_analysis(&analysis, detailed));

    Ok(exit_code_for(analysis.can_proceed))
}

/// Apply the federation.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _) = load_and_validate(config_path)?;
    let backend = create_backend()?;
    let reconciler = Reconciler::new(&config, &backend);

    let analysis = reconciler.analyze().await?;
    eprintln!("{}", formatter.format_analysis(&analysis, !analysis.can_proceed));

    if !analysis.can_proceed {
        // The suggestion list has been shown; refuse before any
        // destructive action.
        return Err(trustforge::error::TrustForgeError::Reconcile(
            trustforge::error::ReconcileError::Aborted {
                reason: analysis.recommended_action.clone(),
            },
        ));
    }

    // Confirm
    if !auto_approve && !confirm("Apply this federation? [y/N]: ")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let result = reconciler.apply(&analysis).await?;
    eprintln!("{}", formatter.format_apply(&result));

    Ok(())
}

/// Check for drift.
async fn cmd_check(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (config, _) = load_and_validate(config_path)?;
    let backend = create_backend()?;
    let reconciler = Reconciler::new(&config, &backend);

    let analysis = reconciler.analyze().await?;
    eprintln!("{}", formatter.format_analysis(&analysis, false));

    Ok(exit_code_for(analysis.can_proceed))
}

/// Compile and display the trust policy.
fn cmd_policy(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, _) = load_and_validate(config_path)?;

    let compiled = PolicyCompiler::new().compile(&config.trust)?;
    eprintln!("{}", formatter.format_policy(&compiled));

    Ok(())
}

/// Revoke granted roles.
async fn cmd_cleanup(config_path: Option<&PathBuf>, auto_approve: bool) -> Result<()> {
    let (config, _) = load_and_validate(config_path)?;

    eprintln!("The following roles will be revoked from {}:", config.service_account.email(&config.project.id));
    for role in &config.service_account.roles {
        eprintln!("  - {role}");
    }

    if !auto_approve && !confirm("\nRevoke these roles? [y/N]: ")? {
        eprintln!("Cleanup cancelled.");
        return Ok(());
    }

    let backend = create_backend()?;
    let reconciler = Reconciler::new(&config, &backend);
    let revoked = reconciler.revoke_grants().await?;

    eprintln!("Revoked {} role(s).", revoked.len());
    eprintln!("The service account, pool, and provider were left in place.");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves, loads, and validates the configuration.
fn load_and_validate(
    config_path: Option<&PathBuf>,
) -> Result<(FederationConfig, trustforge::config::ValidationResult)> {
    let config_file = config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;

    Ok((config, result))
}

/// Creates the Google Cloud backend from environment credentials.
fn create_backend() -> Result<GcloudBackend> {
    let token = ConfigParser::get_access_token()?;
    GcloudBackend::new(&token)
}

/// Prompts the user for a yes/no confirmation.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Maps an analysis verdict onto a process exit code.
fn exit_code_for(can_proceed: bool) -> ExitCode {
    if can_proceed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
