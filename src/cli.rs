//! Command-line interface.
//!
//! One-shot bootstrap around the engine: read an orchestrator request as
//! JSON, run a single reconciliation pass, and print the mutated response.
//! All engine configuration travels inside the request as composite
//! annotations; the CLI only decides where the request comes from and where
//! the file backend keeps its data.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::domain::{Policy, Request};
use crate::engine::Reconciler;
use crate::{resolver, store};

#[derive(Parser)]
#[command(name = "namevault", about = "Identity backup/restore for composition pipelines")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation pass over a request
    Run {
        /// Path to the request JSON (reads stdin when omitted)
        #[arg(long)]
        request: Option<PathBuf>,

        /// Data directory for the file store backend
        #[arg(long, env = "NAMEVAULT_HOME")]
        data_dir: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Command::Run { request, data_dir } => run(request, data_dir).await,
        }
    }
}

async fn run(request: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    let raw = match &request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };

    let req: Request = serde_json::from_str(&raw).context("Failed to parse request JSON")?;

    let (_, mut policy) = resolver::resolve(&req);
    apply_data_dir(&mut policy, data_dir);
    let store = store::open_store(&policy)?;

    let response = Reconciler::new(store).reconcile(req).await?;

    let out =
        serde_json::to_string_pretty(&response).context("Failed to serialize response JSON")?;
    println!("{}", out);
    Ok(())
}

/// The flag is a process-level default: a store-path annotation on the
/// composite always wins over it.
fn apply_data_dir(policy: &mut Policy, data_dir: Option<PathBuf>) {
    if policy.store_path.is_none() {
        policy.store_path = data_dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackupScope;

    fn file_policy(store_path: Option<&str>) -> Policy {
        Policy {
            cluster_id: "default".to_string(),
            store: "file".to_string(),
            store_path: store_path.map(PathBuf::from),
            scope: BackupScope::Orphaned,
            require_restore: false,
        }
    }

    #[test]
    fn test_annotation_store_path_wins_over_the_flag() {
        let mut policy = file_policy(Some("/from/annotation"));
        apply_data_dir(&mut policy, Some(PathBuf::from("/from/flag")));
        assert_eq!(
            policy.store_path.as_deref(),
            Some(std::path::Path::new("/from/annotation"))
        );
    }

    #[test]
    fn test_flag_fills_in_when_no_annotation_is_set() {
        let mut policy = file_policy(None);
        apply_data_dir(&mut policy, Some(PathBuf::from("/from/flag")));
        assert_eq!(
            policy.store_path.as_deref(),
            Some(std::path::Path::new("/from/flag"))
        );

        let mut policy = file_policy(None);
        apply_data_dir(&mut policy, None);
        assert_eq!(policy.store_path, None);
    }
}
