//! enclave-ctl: command-line client for the enclave manager and agent.

mod cmd;

use anyhow::{Context, Result};

use cmd::{manager, sessions};

const DEFAULT_MANAGER_PORT: u16 = 9021;
const DEFAULT_AGENT_PORT: u16 = 7002;

fn print_usage() {
    println!("Usage: enclave-ctl [--manager-port <port>] [--agent-port <port>] <command>");
    println!();
    println!("Manager commands:");
    println!("  submit <file>                 Provision a VM and hand it a computation");
    println!("  vms                           List provisioned VMs");
    println!();
    println!("Agent commands:");
    println!("  status                        Show agent status");
    println!("  sessions                      List sessions and their protocol state");
    println!("  algo <session> <file>         Stage an algorithm");
    println!("  data <session> <file>         Stage a dataset");
    println!("  result <session> [out_file]   Run the computation and fetch the artifact");
    println!("  state <session>               Show the protocol state of a session");
    println!();
    println!("Options:");
    println!("  --manager-port <port>   Manager API port (default: {})", DEFAULT_MANAGER_PORT);
    println!("  --agent-port <port>     Agent API port (default: {})", DEFAULT_AGENT_PORT);
}

fn parse_port(flag: &str, value: Option<&String>) -> Result<u16> {
    value
        .with_context(|| format!("{} requires a value", flag))?
        .parse()
        .with_context(|| format!("{} must be a number", flag))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut manager_port = DEFAULT_MANAGER_PORT;
    let mut agent_port = DEFAULT_AGENT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--manager-port" => {
                i += 1;
                manager_port = parse_port("--manager-port", args.get(i))?;
            }
            "--agent-port" => {
                i += 1;
                agent_port = parse_port("--agent-port", args.get(i))?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["submit", path]                 => manager::cmd_submit(manager_port, path).await,
        ["vms"]                          => manager::cmd_vms(manager_port).await,
        ["status"]                       => sessions::cmd_status(agent_port).await,
        ["sessions"]                     => sessions::cmd_sessions(agent_port).await,
        ["algo", session, path]          => sessions::cmd_algo(agent_port, session, path).await,
        ["data", session, path]          => sessions::cmd_data(agent_port, session, path).await,
        ["result", session]              => sessions::cmd_result(agent_port, session, None).await,
        ["result", session, out]         => sessions::cmd_result(agent_port, session, Some(*out)).await,
        ["state", session]               => sessions::cmd_state(agent_port, session).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
