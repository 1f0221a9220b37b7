mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, event::EventSubcommand, resource::ResourceSubcommand,
    stack::StackSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackres",
    about = "Stack resource status service: inspect stacks and resources, deliver signals, serve the API",
    version,
    propagate_version = true
)]
struct Cli {
    /// Store root (default: auto-detect from .stackres/)
    #[arg(long, global = true, env = "STACKRES_ROOT")]
    root: Option<PathBuf>,

    /// Tenant to operate on
    #[arg(long, global = true, env = "STACKRES_TENANT", default_value = "default")]
    tenant: String,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a store in the current directory
    Init,

    /// Manage stacks
    Stack {
        #[command(subcommand)]
        subcommand: StackSubcommand,
    },

    /// Inspect and signal resources
    Resource {
        #[command(subcommand)]
        subcommand: ResourceSubcommand,
    },

    /// Inspect stack events
    Event {
        #[command(subcommand)]
        subcommand: EventSubcommand,
    },

    /// Validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides config; 0 = OS-assigned)
        #[arg(long, env = "STACKRES_PORT")]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let tenant = cli.tenant.as_str();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Stack { subcommand } => cmd::stack::run(&root, tenant, subcommand, cli.json),
        Commands::Resource { subcommand } => {
            cmd::resource::run(&root, tenant, subcommand, cli.json)
        }
        Commands::Event { subcommand } => cmd::event::run(&root, tenant, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
