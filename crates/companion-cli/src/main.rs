use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use companion::agent::MAX_STEPS;
use companion::providers::configs::OPENAI_MODEL;
use std::path::PathBuf;

mod commands;
mod prompt;
mod session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    agent: AgentArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// OpenAI API Key (can also be set via OPENAI_API_KEY environment variable)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long, global = true, default_value = OPENAI_MODEL)]
    model: String,

    /// Directory holding the function store [default: the user's data directory]
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// How DuDraw functions are embedded for lookup
    #[arg(long, global = true, value_enum, default_value = "open-ai")]
    embedder: EmbedderVariant,

    /// JSON file of DuDraw function records to use instead of the built-in catalog
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Rebuild the function store when the catalog has changed
    #[arg(long, global = true)]
    rebuild: bool,

    /// Model calls allowed per request
    #[arg(long, global = true, default_value_t = MAX_STEPS)]
    max_steps: usize,

    /// Template file replacing the built-in system prompt
    #[arg(long, global = true)]
    system_prompt: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedderVariant {
    OpenAi,
    Local,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive session (the default)
    Session,

    /// Answer a single request and exit
    Run {
        /// The drawing, animation or game to write code for
        #[arg(short, long)]
        text: String,

        /// Print the run trace as JSON instead of rendering it
        #[arg(long)]
        json: bool,
    },

    /// Show the DuDraw functions retrieved for a query
    Lookup {
        /// What to look up, e.g. "draw filled circle"
        query: String,

        /// Number of functions to return
        #[arg(short = 'k', long = "top-k")]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Session) {
        Command::Session => commands::session::execute(&cli.agent).await,
        Command::Run { text, json } => commands::run::execute(&cli.agent, &text, json).await,
        Command::Lookup { query, k } => commands::lookup::execute(&cli.agent, &query, k).await,
    }
}
