use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use purewolf_bridge::BridgeConfig;
use purewolf_bridge::NativeBridge;
use purewolf_bridge::NativeHostLauncher;
use purewolf_protocol::HostReply;
use purewolf_protocol::host;
use purewolf_protocol::host::HostEvent;
use serde_json::Value;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Debugging harness for the PureWolf native messaging host.
#[derive(Debug, Parser)]
#[command(name = "purewolf", version)]
struct Cli {
    /// Path to the native host binary.
    #[arg(long, value_name = "PATH", default_value = "purewolf-native")]
    host: PathBuf,

    /// Extra argument passed to the host binary (repeatable).
    #[arg(long = "host-arg", value_name = "ARG")]
    host_args: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Issue one correlated command and print the reply
    Call(CallArgs),

    /// Probe channel liveness without a host round-trip
    Ping,

    /// Follow unsolicited host events until interrupted
    Watch,

    /// Print the host's server status
    Status,

    /// List the SCIDs the host currently serves
    Scids,
}

#[derive(Debug, Parser)]
struct CallArgs {
    /// Command name, e.g. set_node
    #[arg(value_name = "CMD")]
    cmd: String,

    /// JSON parameters object
    #[arg(long, value_name = "JSON", default_value = "{}")]
    params: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        host,
        host_args,
        command,
    } = Cli::parse();
    let launcher = NativeHostLauncher {
        program: host,
        args: host_args,
    };
    let bridge = NativeBridge::spawn(launcher, BridgeConfig::default());

    match command {
        Command::Ping => {
            let alive = wait_until_alive(&bridge).await;
            println!("{}", json!({"ok": true, "alive": alive}));
        }
        Command::Call(args) => {
            let params: Value = serde_json::from_str(&args.params)
                .context("--params must be a JSON object")?;
            ensure_connected(&bridge).await?;
            let reply = bridge.call(args.cmd, params).await?;
            print_reply(&reply)?;
        }
        Command::Watch => {
            ensure_connected(&bridge).await?;
            watch_events(&bridge).await;
        }
        Command::Status => {
            ensure_connected(&bridge).await?;
            let reply = bridge.call(host::CMD_SERVER_STATUS, json!({})).await?;
            print_reply(&reply)?;
        }
        Command::Scids => {
            ensure_connected(&bridge).await?;
            let reply = bridge.call(host::CMD_LIST_SCIDS, json!({})).await?;
            print_reply(&reply)?;
        }
    }

    // One-shot invocations shut the host down on the way out.
    bridge.disconnect().await;
    Ok(())
}

async fn wait_until_alive(bridge: &NativeBridge) -> bool {
    let deadline = Instant::now() + CONNECT_WAIT;
    while Instant::now() < deadline {
        if bridge.is_alive() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    bridge.is_alive()
}

async fn ensure_connected(bridge: &NativeBridge) -> Result<()> {
    if !wait_until_alive(bridge).await {
        bail!("native host did not come up within {CONNECT_WAIT:?}");
    }
    Ok(())
}

fn print_reply(reply: &HostReply) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(reply)?);
    if !reply.ok {
        bail!(
            "host rejected the command: {}",
            reply.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn watch_events(bridge: &NativeBridge) {
    let mut events = bridge.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => match HostEvent::decode(&frame) {
                    Some(event) => println!("{event:?}"),
                    None => println!("{} {}", frame.name, frame.payload),
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}
