use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use respkv_server::{run, ServerState};

const DEFAULT_ADDR: &str = "127.0.0.1:7379";

struct Options {
    addr: String,
    password: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Options> {
    let mut options = Options {
        addr: DEFAULT_ADDR.to_string(),
        password: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => options.addr = args.next().context("--addr needs a value")?,
            "--password" => options.password = Some(args.next().context("--password needs a value")?),
            "-h" | "--help" => {
                println!("usage: respkv-server [--addr HOST:PORT] [--password PASSWORD]");
                std::process::exit(0);
            }
            other => bail!("unknown argument `{}`", other),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    let state = match options.password {
        Some(password) => ServerState::with_password(password),
        None => ServerState::new(),
    };

    run(&options.addr, Arc::new(state))
        .await
        .with_context(|| format!("serving {}", options.addr))
}
