use anyhow::Context;
use companion_server::{
    configuration::Settings,
    serverless::{Function, FunctionEvent},
};
use tokio::io::AsyncReadExt;

const STORE_DIR: &str = "companion_db";

/// Serve one function invocation: the event arrives on stdin and the response
/// leaves on stdout, so logs go to stderr.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let function: Function = std::env::args()
        .nth(1)
        .context("usage: companion-fn <chat|status>")?
        .parse()?;

    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    let event: FunctionEvent =
        serde_json::from_str(&raw).context("Failed to parse function event")?;

    let settings = Settings::load(&std::env::temp_dir().join(STORE_DIR))?;
    let response = function.handle(&event, &settings).await;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
