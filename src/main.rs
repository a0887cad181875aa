mod backends;
mod cli;
mod completion;
mod config;
mod registry;
mod server;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{list::list_cmd, serve::serve_cmd};
use config::Environment;
use utils::logging::{self, ColorMode};

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "xgate")]
#[command(
    about = "An HTTP gateway serving completions from locally resident language models",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[arg(long, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Read the configuration from this file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the backends and serve completions
    Serve(ServeArgs),
    /// List declared backends
    List(ListArgs),
}

#[derive(Parser, Default)]
pub(crate) struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

/// Possible listings
#[derive(Subcommand)]
pub(crate) enum ListObject {
    /// Backends declared in the catalog
    Backends,
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
    #[arg(skip)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init(ColorMode::resolve(cli.color));

    match cli.command {
        Some(Commands::Serve(args)) => serve_cmd(&args, cli.config).await,
        Some(Commands::List(mut args)) => {
            args.config = cli.config;

            let environment = Environment::from_env();

            list_cmd(&args, environment.default_key.as_str());
        }
        None => serve_cmd(&ServeArgs::default(), cli.config).await,
    }
}
