// Command runners
//
// Each subcommand takes an already validated config. Results go to stdout,
// logs to stderr.

use crate::output;
use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use dialoguer::Confirm;
use glueform_aws::{AwsClients, AwsJobApi, AwsResourceApi};
use glueform_config::DeployConfig;
use glueform_core::{
    Backoff, DescriptorSet, GlueformError, InMemoryCloud, JobRunId, JobRunStatus, JobSpec,
    JobSubmitter, Plan, Reconciler,
};
use glueform_etl::sample::{run_users_etl, SAMPLE_TABLE};
use glueform_etl::TableSession;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Subcommand)]
pub enum Command {
    /// Show the actions needed to reach the configured state
    Plan(PlanArgs),
    /// Create or update resources to match the configuration
    Apply(ApplyArgs),
    /// Start a run of the configured Glue job
    SubmitJob(SubmitArgs),
    /// Show the status of a job run
    Status(StatusArgs),
    /// Upload a local ETL script to the job's script location
    UploadScript(UploadArgs),
    /// Run the sample ETL against an in-memory table and print the result
    EtlPreview(PreviewArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Plan against empty remote state without contacting AWS
    #[arg(long)]
    pub offline: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Wait for the run to finish
    #[arg(long)]
    pub wait: bool,

    /// Stop waiting after this many seconds (default: [poll] timeout_secs)
    #[arg(long, value_name = "SECS", requires = "wait")]
    pub timeout_secs: Option<u64>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Run id returned by submit-job
    pub run_id: String,

    /// Poll until the run finishes
    #[arg(long)]
    pub wait: bool,

    /// Stop waiting after this many seconds (default: [poll] timeout_secs)
    #[arg(long, value_name = "SECS", requires = "wait")]
    pub timeout_secs: Option<u64>,
}

#[derive(Args)]
pub struct UploadArgs {
    /// Local script file
    pub file: PathBuf,
}

#[derive(Args)]
pub struct PreviewArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

impl Command {
    pub async fn run(self, config: DeployConfig) -> Result<()> {
        match self {
            Command::Plan(args) => plan(args, &config).await,
            Command::Apply(args) => apply(args, &config).await,
            Command::SubmitJob(args) => submit_job(args, &config).await,
            Command::Status(args) => status(args, &config).await,
            Command::UploadScript(args) => upload_script(args, &config).await,
            Command::EtlPreview(args) => etl_preview(args, &config),
        }
    }
}

async fn plan(args: PlanArgs, config: &DeployConfig) -> Result<()> {
    let descriptors = DescriptorSet::from_config(config)?;

    let plan = if args.offline {
        let cloud = InMemoryCloud::new();
        Reconciler::new(&cloud).plan(&descriptors).await?
    } else {
        let api = AwsResourceApi::new(AwsClients::load(&config.aws).await);
        Reconciler::new(&api).plan(&descriptors).await?
    };

    output::print_plan(&plan, args.output)
}

async fn apply(args: ApplyArgs, config: &DeployConfig) -> Result<()> {
    let descriptors = DescriptorSet::from_config(config)?;
    let api = AwsResourceApi::new(AwsClients::load(&config.aws).await);
    let reconciler = Reconciler::new(&api).with_concurrency(config.apply.concurrency);

    let plan = reconciler.plan(&descriptors).await?;
    if args.output == OutputFormat::Table {
        output::print_plan(&plan, OutputFormat::Table)?;
        if plan.is_noop() {
            return Ok(());
        }
    }

    if !args.yes && !plan.is_noop() {
        let proceed = confirm_apply(&plan, args.output, &mut std::io::stderr(), || {
            Ok(Confirm::new()
                .with_prompt("Apply these changes?")
                .default(false)
                .interact()?)
        })?;
        if !proceed {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    let report = reconciler.apply(&plan).await;
    output::print_report(&report, args.output)?;

    match report.first_error() {
        Some(error) => Err(error.clone().into()),
        None => Ok(()),
    }
}

/// Ask before applying, making sure the plan was shown first.
///
/// Table output already printed the plan; with JSON output stdout is kept
/// for the report, so the plan goes to `review` instead.
fn confirm_apply(
    plan: &Plan,
    format: OutputFormat,
    review: &mut impl Write,
    ask: impl FnOnce() -> Result<bool>,
) -> Result<bool> {
    if format == OutputFormat::Json {
        write!(review, "{}", output::render_plan(plan))?;
        review.flush()?;
    }
    ask()
}

async fn submit_job(args: SubmitArgs, config: &DeployConfig) -> Result<()> {
    let spec = JobSpec::from_config(config);
    let clients = AwsClients::load(&config.aws).await;
    let api = AwsJobApi::new(&clients);
    let submitter = JobSubmitter::new(&api).with_backoff(Backoff::from(&config.poll));

    if args.wait {
        let deadline = wait_deadline(args.timeout_secs, config);
        let run_id = submitter.run(&spec, deadline).await?;
        println!("{run_id} {}", JobRunStatus::Succeeded);
    } else {
        let run_id = submitter.submit(&spec).await?;
        println!("{run_id}");
    }
    Ok(())
}

async fn status(args: StatusArgs, config: &DeployConfig) -> Result<()> {
    let job = config.job.name.as_str();
    let run_id = JobRunId::new(args.run_id);
    let clients = AwsClients::load(&config.aws).await;
    let api = AwsJobApi::new(&clients);
    let submitter = JobSubmitter::new(&api).with_backoff(Backoff::from(&config.poll));

    let deadline = wait_deadline(args.timeout_secs, config);
    let status = if args.wait {
        submitter.poll(job, &run_id, deadline).await?
    } else {
        submitter.status(job, &run_id).await?
    };
    println!("{run_id} {status}");

    match status {
        JobRunStatus::Failed { message } => {
            Err(GlueformError::job_failed(job, run_id.as_str(), message).into())
        }
        JobRunStatus::Timeout => {
            Err(GlueformError::timeout(job, run_id.as_str(), deadline.as_secs()).into())
        }
        JobRunStatus::Running | JobRunStatus::Succeeded => Ok(()),
    }
}

async fn upload_script(args: UploadArgs, config: &DeployConfig) -> Result<()> {
    let target = config.script_uri();
    let clients = AwsClients::load(&config.aws).await;
    glueform_aws::upload_script(&clients.s3, &args.file, &target).await?;
    println!("Uploaded {} to {}", args.file.display(), target);
    Ok(())
}

fn etl_preview(args: PreviewArgs, config: &DeployConfig) -> Result<()> {
    let mut session = TableSession::open(&config.catalog, config.warehouse());
    let ident = session.ident(&config.database.name, SAMPLE_TABLE);
    info!(table = %ident, catalog = session.catalog_name(), "Running sample ETL in memory");

    run_users_etl(&mut session, &ident)?;
    let description = session.describe(&ident)?;
    let batch = session.read(&ident)?;
    let snapshots = session.snapshots(&ident)?.to_vec();
    session.close();

    output::print_preview(&description, &batch, &snapshots, args.output)
}

fn wait_deadline(timeout_secs: Option<u64>, config: &DeployConfig) -> Duration {
    timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.poll.timeout())
}
