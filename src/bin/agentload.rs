use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use agentload::{
    builtin_suite, load_prompts, run_load_test, run_suite, HttpInvoker, HttpInvokerConfig,
    Invoke, LoadTestConfig, LoadTestReport, Preset, SuiteReport, Verdict, DEFAULT_SESSION_HEADER,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "agentload",
    about = "Load and integration tests for a hosted chat agent endpoint",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fan out concurrent simulated users and check latency/success thresholds (default)
    Run(RunArgs),
    /// Run the conversational integration suite sequentially
    Scenarios(ScenarioArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Agent invocation URL
    #[arg(
        long,
        env = "AGENTLOAD_TARGET",
        default_value = "http://localhost:8080/invocations"
    )]
    target: String,

    /// Bearer token; if omitted the environment variable named by --token-env is read
    #[arg(long)]
    token: Option<String>,

    /// Environment variable name to read the bearer token from
    #[arg(long, default_value = "AGENT_TOKEN")]
    token_env: String,

    /// Header carrying the session identifier
    #[arg(long, default_value = DEFAULT_SESSION_HEADER)]
    session_header: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

impl TargetArgs {
    fn build_invoker(&self) -> Result<Arc<dyn Invoke>> {
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok());
        let config = HttpInvokerConfig::try_new(&self.target, token)?
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_session_header(&self.session_header)?;
        Ok(Arc::new(HttpInvoker::new(config)?))
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetArg {
    Standard,
    Smoke,
}

impl From<PresetArg> for Preset {
    fn from(value: PresetArg) -> Self {
        match value {
            PresetArg::Standard => Preset::Standard,
            PresetArg::Smoke => Preset::Smoke,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Sizing and thresholds to start from
    #[arg(long, value_enum, default_value_t = PresetArg::Standard)]
    preset: PresetArg,

    /// Number of simulated users (overrides the preset)
    #[arg(long)]
    users: Option<usize>,

    /// Sequential requests per user
    #[arg(long, default_value_t = 1)]
    requests_per_user: usize,

    /// Maximum users running at once (defaults to the user count)
    #[arg(long)]
    workers: Option<usize>,

    /// JSONL file whose objects contain a `text` field, replacing the preset prompts
    #[arg(long)]
    prompts_file: Option<PathBuf>,

    /// Directory the JSON summary is written to
    #[arg(long, default_value = "tests")]
    results_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Pause between steps in milliseconds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Run(args) => run(args).await?,
        Command::Scenarios(args) => scenarios(args).await?,
    };

    Ok(ExitCode::from(code as u8))
}

async fn run(args: RunArgs) -> Result<i32> {
    let preset = Preset::from(args.preset);
    let prompts = match &args.prompts_file {
        Some(path) => load_prompts(path)
            .with_context(|| format!("failed to load prompts from {}", path.display()))?,
        None => preset.prompts(),
    };
    let users = args.users.unwrap_or(preset.user_count());

    let mut config =
        LoadTestConfig::try_new(&args.target.target, users, args.requests_per_user, prompts)?
            .with_thresholds(preset.thresholds());
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers)?;
    }

    let invoker = args.target.build_invoker()?;

    print_banner(&config);
    let report = run_load_test(config, invoker).await?;
    print_summary(&report);

    match report.write_json(&args.results_dir).await {
        Ok(path) => println!("\nResults saved to: {}", path.display()),
        Err(err) => tracing::error!(error = %err, "failed to save results"),
    }

    print_verdict(&report);
    Ok(report.verdict.exit_code())
}

async fn scenarios(args: ScenarioArgs) -> Result<i32> {
    let invoker = args.target.build_invoker()?;
    let suite = builtin_suite();

    println!("{}", "=".repeat(70));
    println!("INTEGRATION SCENARIOS");
    println!("{}", "=".repeat(70));
    println!("Target: {}", args.target.target);

    let report = run_suite(&suite, invoker.as_ref(), Duration::from_millis(args.pause_ms)).await;
    print_suite(&report);
    Ok(report.exit_code())
}

fn print_banner(config: &LoadTestConfig) {
    println!("{}", "=".repeat(70));
    println!("AGENT LOAD TEST");
    println!("{}", "=".repeat(70));
    println!("Target: {}", config.target);
    println!("Concurrent Users: {}", config.user_count);
    println!("Requests per User: {}", config.requests_per_user);
    println!("Workers: {}", config.worker_count);
    println!("Total Requests: {}", config.total_requests());
    println!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("{}", "=".repeat(70));
}

fn print_summary(report: &LoadTestReport) {
    let stats = &report.results;
    println!("\n{}", "=".repeat(70));
    println!("LOAD TEST SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Total Requests: {}", stats.total_requests);
    println!("Successful: {} ({:.1}%)", stats.successful, stats.success_rate);
    println!("Failed: {}", stats.failed);
    println!("\nResponse Times:");
    println!("  Average: {:.0}ms", stats.avg_latency_ms);
    println!("  Min: {:.0}ms", stats.min_latency_ms);
    println!("  Max: {:.0}ms", stats.max_latency_ms);
    println!("  P50 (median): {:.0}ms", stats.p50_latency_ms);
    println!("  P95: {:.0}ms", stats.p95_latency_ms);
    println!("  P99: {:.0}ms", stats.p99_latency_ms);
    println!("\nThroughput:");
    println!("  Total Duration: {:.1}s", stats.total_duration_ms / 1000.0);
    println!("  Requests/Second: {:.2}", stats.requests_per_second);
    println!("{}", "=".repeat(70));

    if !report.failures.is_empty() {
        println!("\nErrors ({} total):", report.failures.len());
        for error in report.sample_errors(5) {
            println!("  - {}", error);
        }
    }
}

fn print_verdict(report: &LoadTestReport) {
    let stats = &report.results;
    let violations = match &report.verdict {
        Verdict::Pass => {
            println!("\nLOAD TEST PASSED");
            println!("   - Success rate: {:.1}%", stats.success_rate);
            println!("   - Avg response time: {:.0}ms", stats.avg_latency_ms);
            return;
        }
        Verdict::Fail { violations } => violations,
    };

    println!("\nLOAD TEST FAILED");
    for violation in violations {
        println!("   - {}", violation);
    }
}

fn print_suite(report: &SuiteReport) {
    println!("\n{}", "=".repeat(70));
    println!("TEST SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Total Tests: {}", report.results.len());
    println!("Passed: {}", report.passed());
    println!("Failed: {}", report.failed());
    println!("Success Rate: {:.1}%", report.success_rate());
    println!("{}", "=".repeat(70));

    for result in &report.results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        if result.message.is_empty() {
            println!("  {} {} - {} ({}ms)", status, result.scenario, result.step, result.latency_ms);
        } else {
            println!(
                "  {} {} - {} ({}ms): {}",
                status, result.scenario, result.step, result.latency_ms, result.message
            );
        }
    }
}
