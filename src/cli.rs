use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::models::approval::Decision;

/// Approval Gateway — approve or deny queued tool requests from a browser
#[derive(Parser)]
#[command(name = "approval-gateway", version, about)]
pub struct Cli {
    /// Queue directory shared with the hook (overrides APPROVAL_QUEUE_DIR)
    #[arg(long, global = true)]
    pub queue_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the approval server
    Serve {
        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind
        #[arg(long)]
        host: Option<IpAddr>,
    },

    /// List pending approval requests
    Pending,

    /// Record a decision for a pending request
    Respond {
        request_id: String,
        /// allow, always or deny
        #[arg(value_parser = parse_decision)]
        decision: Decision,
    },
}

impl Cli {
    /// Apply flags on top of the environment-derived config.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(dir) = &self.queue_dir {
            cfg.queue_dir = dir.clone();
        }
        if let Some(Commands::Serve { port, host }) = &self.command {
            if let Some(port) = port {
                cfg.port = *port;
            }
            if let Some(host) = host {
                cfg.host = *host;
            }
        }
    }

    /// One-shot commands print results on stdout, so logs go to stderr.
    pub fn logs_to_stderr(&self) -> bool {
        matches!(
            self.command,
            Some(Commands::Pending) | Some(Commands::Respond { .. })
        )
    }
}

fn parse_decision(raw: &str) -> Result<Decision, String> {
    raw.parse::<Decision>().map_err(|e| e.to_string())
}
