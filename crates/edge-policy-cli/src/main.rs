// crates/edge-policy-cli/src/main.rs
// ============================================================================
// Module: Edge Policy CLI Entry Point
// Description: Command dispatcher for offline compatibility checks.
// Purpose: Run policy and secret binding checks over local JSON documents.
// Dependencies: clap, edge-policy-compcheck, edge-policy-config, serde, thiserror.
// ============================================================================

//! ## Overview
//! The `edge-policy` binary loads the shared configuration, installs logging,
//! and runs one compatibility check over a JSON input file. Lookups are
//! answered offline, so the input must carry every document the check needs.
//! Security posture: input files are untrusted; reads are size-limited and
//! documents are validated before they are evaluated.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use edge_policy_cli::OfflineCollaborators;
use edge_policy_cli::t;
use edge_policy_compcheck::CompCheck;
use edge_policy_compcheck::CompCheckError;
use edge_policy_compcheck::CompCheckOutput;
use edge_policy_compcheck::CompatibilityChecker;
use edge_policy_compcheck::PolicyCheck;
use edge_policy_compcheck::SecretBindingCheck;
use edge_policy_compcheck::UserInputCheck;
use edge_policy_config::EdgePolicyConfig;
use edge_policy_config::init_logging;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a check input document.
const MAX_INPUT_BYTES: usize = 8 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "edge-policy", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Optional config file path (defaults to edge-policy.toml or env override).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a node policy against a deployment policy and its services.
    PolicyCheck(CheckCommand),
    /// Check the user input a deployment policy or pattern and a node set.
    UserinputCheck(CheckCommand),
    /// Check the secret bindings of a deployment policy or pattern.
    SecretCheck(CheckCommand),
    /// Run every check that applies to a deployment.
    DeployCheck(CheckCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments shared by every check.
#[derive(Args, Debug)]
struct CheckCommand {
    /// Path to the check input JSON document.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    /// Evaluate every service version instead of stopping at the first
    /// compatible one.
    #[arg(long, action = ArgAction::SetTrue)]
    check_all: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate an edge-policy configuration file.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying the message printed to stderr.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a rendered message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }

    /// Renders a checker error as its wire JSON.
    fn from_check(error: &CompCheckError) -> Self {
        let wire = error.to_wire();
        let message = serde_json::to_string_pretty(&wire).unwrap_or_else(|_| error.to_string());
        Self::new(message)
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = EdgePolicyConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    init_logging(&config.logging).map_err(|err| CliError::new(t!("logging.init_failed", error = err)))?;

    let Some(command) = cli.command else {
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::PolicyCheck(command) => command_policy_check(&config, &command),
        Commands::UserinputCheck(command) => command_user_input_check(&config, &command),
        Commands::SecretCheck(command) => command_secret_check(&config, &command),
        Commands::DeployCheck(command) => command_deploy_check(&config, &command),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(),
    }
}

// ============================================================================
// SECTION: Check Commands
// ============================================================================

/// Executes the `policy-check` command.
fn command_policy_check(config: &EdgePolicyConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let input: PolicyCheck = read_json(&command.input, &t!("input.kind.policy_check"))?;
    let checker = CompatibilityChecker::from_config(config);
    debug!(input = %command.input.display(), "running policy check");
    let output = checker
        .policy_compatible(&OfflineCollaborators, &input, command.check_all)
        .map_err(|err| CliError::from_check(&err))?;
    write_output(&output)
}

/// Executes the `userinput-check` command.
fn command_user_input_check(config: &EdgePolicyConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let input: UserInputCheck = read_json(&command.input, &t!("input.kind.user_input_check"))?;
    let checker = CompatibilityChecker::from_config(config);
    debug!(input = %command.input.display(), "running user input check");
    let output = checker
        .user_input_compatible(&OfflineCollaborators, &input, command.check_all)
        .map_err(|err| CliError::from_check(&err))?;
    write_output(&output)
}

/// Executes the `deploy-check` command.
fn command_deploy_check(config: &EdgePolicyConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let input: CompCheck = read_json(&command.input, &t!("input.kind.deploy_check"))?;
    let checker = CompatibilityChecker::from_config(config);
    debug!(input = %command.input.display(), "running deployment check");
    let output = checker
        .deploy_compatible(&OfflineCollaborators, &input, command.check_all)
        .map_err(|err| CliError::from_check(&err))?;
    write_output(&output)
}

/// Executes the `secret-check` command.
fn command_secret_check(config: &EdgePolicyConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let input: SecretBindingCheck = read_json(&command.input, &t!("input.kind.secret_check"))?;
    let checker = CompatibilityChecker::from_config(config);
    debug!(input = %command.input.display(), "running secret binding check");
    let output = checker
        .secret_binding_compatible(&OfflineCollaborators, &input, command.check_all)
        .map_err(|err| CliError::from_check(&err))?;
    write_output(&output)
}

/// Writes a check result as pretty JSON.
fn write_output(output: &CompCheckOutput) -> CliResult<ExitCode> {
    let rendered = serde_json::to_string_pretty(output)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Executes the config validation command. Loading already validated it.
fn command_config_validate() -> CliResult<ExitCode> {
    write_stdout_line(&t!("config.validate.ok")).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Errors raised while reading a size-limited file.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads and decodes a JSON document of the given `kind`.
fn read_json<T: DeserializeOwned>(path: &Path, kind: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| {
        let path = path.display();
        CliError::new(match err {
            ReadLimitError::Io(error) => t!("input.read_failed", kind = kind, path = path, error = error),
            ReadLimitError::TooLarge {
                size,
                limit,
            } => t!("input.read_too_large", kind = kind, path = path, size = size, limit = limit),
        })
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(t!("input.parse_failed", kind = kind, path = path.display(), error = err)))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr().lock();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.stdout"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
