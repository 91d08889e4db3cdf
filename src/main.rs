use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dpxreport::api::normalize_host;
use dpxreport::cli::args::{
    GetJobsArgs, GetLogsArgs, GetNodesArgs, JobStatsArgs, LicenseArgs, NodeGroupsArgs,
};
use dpxreport::cli::{self, PromptReauth};
use dpxreport::config::AppConfig;
use dpxreport::context::AppContext;
use dpxreport::logging::{self, LogConfig};

#[derive(Parser)]
#[command(name = "dpxreport")]
#[command(about = "Reports on jobs, logs, nodes and licenses of a DPX master server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show license information
    GetLicense(LicenseArgs),
    /// List jobs with their volsers and sizes
    GetJobs(GetJobsArgs),
    /// Averages, phase times and success rates per job
    JobStats(JobStatsArgs),
    /// Show the log of a job instance
    GetLogs(GetLogsArgs),
    /// List node groups
    GetNodeGroups(NodeGroupsArgs),
    /// List nodes
    GetNodes(GetNodesArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opts = Cli::parse();

    let config = match &opts.command {
        Commands::GetLicense(args) => AppConfig::new(Some(args)),
        Commands::GetJobs(args) => AppConfig::new(Some(args)),
        Commands::JobStats(args) => AppConfig::new(Some(args)),
        Commands::GetLogs(args) => AppConfig::new(Some(args)),
        Commands::GetNodeGroups(args) => AppConfig::new(Some(args)),
        Commands::GetNodes(args) => AppConfig::new(Some(args)),
    }
    .context("Failed to load configuration")?;

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        debug_requests: config.debug_requests,
    });

    let user = config.user.clone();
    let password = match config.password.clone().filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => {
            let prompt = format!("Password for {}@{}", user, normalize_host(&config.host));
            cli::prompt_password(prompt).await?
        }
    };

    let Some(mut ctx) = AppContext::connect(config, &password, Box::new(PromptReauth))
        .await
        .context("Failed to connect to the server")?
    else {
        println!("Failed to log in as {user}! Is the password correct?");
        return Ok(());
    };
    println!("Login ok");

    let result = match &opts.command {
        Commands::GetLicense(args) => cli::license::run(&mut ctx, args).await,
        Commands::GetJobs(args) => cli::jobs::run(&mut ctx, args).await,
        Commands::JobStats(args) => cli::stats::run(&mut ctx, args).await,
        Commands::GetLogs(args) => cli::logs::run(&mut ctx, args).await,
        Commands::GetNodeGroups(args) => cli::nodes::run_groups(&mut ctx, args).await,
        Commands::GetNodes(args) => cli::nodes::run_nodes(&mut ctx, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
    }

    Ok(())
}
