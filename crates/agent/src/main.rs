#![forbid(unsafe_code)]

mod cli;
mod shutdown;
mod startup;

use std::path::Path;

use anyhow::Result;
use infrastructure::config::AgentConfig;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    match cli.command {
        Some(Command::Version) => {
            println!("xdplb-agent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::CheckConfig) => {
            let config = AgentConfig::load(Path::new(&cli.config))?;
            println!(
                "{}: ok (upstream {}, vip {}, {} firewall rules, {} DoS policies, {} backends)",
                cli.config,
                config.agent.upstream,
                config.agent.vip,
                config.firewall.rules.len(),
                config.dos_protection.policies.len(),
                config.loadbalancer.backends.len(),
            );
            Ok(())
        }

        // No subcommand = run the agent daemon
        None => startup::run(&cli).await,
    }
}
