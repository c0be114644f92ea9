use anyhow::Context;
use api_rest::Settings;
use clap::{Parser, Subcommand};
use hatch_core::{
    JobServerClient, ReleaseId, ReleaseRequest, ReleaseStore, TokenScope, UploadPipeline,
    WorkspaceIndex, WorkspaceName,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hatch")]
#[command(about = "hatch release service CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint an access token
    Token {
        /// Workspace the token grants access to
        workspace: WorkspaceName,
        /// Restrict the token to one release
        #[arg(long)]
        release: Option<ReleaseId>,
        /// Token scope (read or upload)
        #[arg(long, default_value = "read")]
        scope: TokenScope,
        /// User the token is minted for (default: $USER)
        #[arg(long)]
        user: Option<String>,
        /// Lifetime in minutes
        #[arg(long, default_value_t = 60)]
        duration: i64,
    },
    /// List the files in a workspace
    List {
        workspace: WorkspaceName,
    },
    /// List the releases of a workspace
    Releases {
        workspace: WorkspaceName,
    },
    /// Create a release from workspace files
    Release {
        workspace: WorkspaceName,
        /// Paths relative to the workspace root
        #[arg(required = true)]
        paths: Vec<String>,
        /// Requesting user (default: $USER)
        #[arg(long)]
        user: Option<String>,
    },
    /// Upload a release's outstanding files to job-server
    Upload {
        release_id: ReleaseId,
        /// User reported to job-server (default: $USER)
        #[arg(long)]
        user: Option<String>,
    },
}

fn current_user(user: Option<String>) -> String {
    user.or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "hatch".into())
}

/// Token lifetime for `--duration` minutes.
fn token_ttl(minutes: i64) -> anyhow::Result<chrono::Duration> {
    if minutes <= 0 {
        anyhow::bail!("--duration must be a positive number of minutes");
    }
    chrono::Duration::try_minutes(minutes)
        .with_context(|| format!("--duration {minutes} is too large"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'hatch --help' for commands");
        return Ok(());
    };

    let settings = Settings::from_env().context("failed to load settings")?;
    let cfg = settings.cfg;
    let index = Arc::new(WorkspaceIndex::new(cfg.clone()));
    let releases = Arc::new(ReleaseStore::new(cfg.clone(), index.clone()));

    match command {
        Commands::Token {
            workspace,
            release,
            scope,
            user,
            duration,
        } => {
            let token = cfg.token_codec().issue(
                &workspace,
                release,
                scope,
                &current_user(user),
                token_ttl(duration)?,
            )?;
            println!("{token}");
        }
        Commands::List { workspace } => {
            let files = index.list(&workspace)?;
            if files.is_empty() {
                println!("No files found.");
            } else {
                print_json(&files)?;
            }
        }
        Commands::Releases { workspace } => {
            let list = releases.list(&workspace)?;
            if list.is_empty() {
                println!("No releases found.");
            } else {
                for release in list {
                    let summary = release.summary();
                    println!(
                        "ID: {}, Created: {}, Files: {}, Uploaded: {}, Failed: {}",
                        release.id,
                        release.created_at,
                        release.files.len(),
                        summary.uploaded,
                        summary.failed
                    );
                }
            }
        }
        Commands::Release {
            workspace,
            paths,
            user,
        } => {
            let mut request = ReleaseRequest::from_paths(paths);
            request.requested_by = Some(current_user(user));
            let release = releases.create(&workspace, &request)?;
            print_json(&release)?;
        }
        Commands::Upload { release_id, user } => {
            let job_server = Arc::new(JobServerClient::new(&cfg)?);
            let pipeline =
                UploadPipeline::new(releases, job_server, cfg.upload_policy().clone());
            let report = pipeline.upload(release_id, &current_user(user)).await?;
            print_json(&report)?;
            if !report.summary.complete {
                anyhow::bail!("release {} is not fully uploaded", release_id);
            }
        }
    }

    Ok(())
}
