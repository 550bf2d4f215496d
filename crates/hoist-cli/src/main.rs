mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use hoist_core::{Environment, UserError};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "hoist", about = "Build, publish and deploy apps to Kubernetes")]
#[command(version)]
struct Cli {
    /// Print full error chains and debug logs
    #[arg(long, global = true)]
    debug: bool,

    /// Project directory containing hoist.toml
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Target environment (dev, staging, prod); overrides hoist.toml
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run service build commands and build the app image
    Build(BuildArgs),
    /// Push local images to the project's image repository
    Publish {
        /// Local images to push, `name[:tag]`
        #[arg(required = true)]
        images: Vec<String>,
    },
    /// Install or upgrade the app on the cluster
    Deploy {
        /// Remote image to run
        #[arg(long)]
        image: Option<String>,
        #[command(flatten)]
        deploy: DeployArgs,
    },
    /// Build, publish and deploy in one go
    Up {
        #[command(flatten)]
        build: BuildArgs,
        #[command(flatten)]
        deploy: DeployArgs,
    },
    /// Remove the app, and the runtime if no other app uses it
    Down,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Use an image built outside hoist instead of the Dockerfile
    #[arg(long)]
    pub local_image: Option<String>,

    /// Target platform, e.g. linux/amd64
    #[arg(long)]
    pub platform: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Values file merged over the app defaults (repeatable)
    #[arg(long = "values", short = 'f')]
    pub value_files: Vec<PathBuf>,

    /// Override an app value, `path=value` (repeatable)
    #[arg(long = "set")]
    pub set_values: Vec<String>,

    /// Secret environment variable for the app, `KEY=VALUE` (repeatable)
    #[arg(long = "secret-env")]
    pub secret_env: Vec<String>,

    /// Dotenv file whose variables become app secrets
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// File mounted into the app as a secret (repeatable)
    #[arg(long = "secret-file")]
    pub secret_files: Vec<PathBuf>,

    /// Uninstall and reinstall a release whose upgrade fails
    #[arg(long)]
    pub reinstall_on_error: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let debug = cli.debug;
    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err, debug);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<()> {
    let project = commands::Project::load(&cli.project_dir, cli.env)?;

    match cli.command {
        Commands::Build(args) => commands::build(&project, &args, cancel).await,
        Commands::Publish { images } => commands::publish(&project, &images, cancel).await,
        Commands::Deploy { image, deploy } => {
            commands::deploy(&project, image, &deploy, cancel).await
        }
        Commands::Up { build, deploy } => commands::up(&project, &build, &deploy, cancel).await,
        Commands::Down => commands::down(&project).await,
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // arch-lint: allow(no-silent-result-drop) reason="unset or invalid RUST_LOG falls back to the --debug level"
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// The first user-facing message in the chain, or the chain itself.
fn print_error(err: &anyhow::Error, debug: bool) {
    if debug {
        eprintln!("Error: {err:?}");
        return;
    }
    match err.chain().find_map(|e| e.downcast_ref::<UserError>()) {
        Some(user) => eprintln!("{}", user.message()),
        None => eprintln!("Error: {err:#}"),
    }
}
