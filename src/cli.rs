use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use llgym_benchmark::{Benchmark, BenchmarkFactory};
use llgym_utils::logger;
use llgym_utils::profiler::{PhaseTiming, Profiler};
use tracing::debug;

use crate::actions::{ActionId, LlvmAction};
use crate::config::ServiceConfig;
use crate::cost::{BaselineCosts, BaselinePolicy, CostFunction};
use crate::service::{self, SessionHost};
use crate::session::{ActionOutcome, Observation};
use crate::version::VERSION;

#[derive(Parser, Debug)]
#[command(name = "llgym", version = VERSION, about = "LLVM optimization sessions")]
pub struct GymCli {
    #[arg(long, global = true)]
    /// Configuration file (YAML, or TOML with the `toml-config` feature).
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Display phase timing information.
    time: bool,

    #[command(subcommand)]
    command: Command,
}

impl GymCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serves sessions over TCP, one JSON request per line.
    Serve {
        /// Address to listen on, overriding the configuration.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Runs one session over a local bitcode or IR file and prints its costs.
    Run {
        path: PathBuf,
        /// Comma-separated actions, by flag or catalogue index.
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        actions: Vec<String>,
        /// Cost functions to observe. Defaults to all of them.
        #[arg(short = 'c', long = "cost", value_enum, value_delimiter = ',')]
        cost_functions: Vec<CostFunction>,
        /// Print the optimized module.
        #[arg(long)]
        print_ir: bool,
    },
    /// Lists the action catalogue.
    Actions,
}

pub fn run() -> Result<()> {
    let cli = GymCli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;
    logger::init_logging(config.log_filter.as_deref());
    debug!(?config, "resolved configuration");

    match &cli.command {
        Command::Serve { listen } => handle_serve(config, listen.clone()),
        Command::Run {
            path,
            actions,
            cost_functions,
            print_ir,
        } => handle_run(&cli, &config, path, actions, cost_functions, *print_ir),
        Command::Actions => {
            handle_actions();
            Ok(())
        }
    }
}

fn handle_serve(mut config: ServiceConfig, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.listen = listen;
    }
    let factory = Arc::new(BenchmarkFactory::new());
    config.register_datasets(&factory)?;
    let host = Arc::new(SessionHost::new(factory, config.host_config()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(service::serve(host, &config.listen))
}

fn handle_run(
    cli: &GymCli,
    config: &ServiceConfig,
    path: &Path,
    actions: &[String],
    cost_functions: &[CostFunction],
    print_ir: bool,
) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let benchmark = Benchmark::anonymous(&data);
    let actions: Vec<ActionId> = actions.iter().map(|action| action.as_str().into()).collect();
    let cost_functions = if cost_functions.is_empty() {
        CostFunction::ALL.to_vec()
    } else {
        cost_functions.to_vec()
    };

    let host = SessionHost::new(Arc::new(BenchmarkFactory::new()), config.host_config());
    let mut profiler = Profiler::new();

    let session = profiler.record_phase("Baselines", || host.start_session_with(benchmark))?;
    println!("{} {} ({})", "session".green().bold(), session, path.display());
    print_baselines(&host.baseline_costs(session)?);

    let outcome = profiler.record_phase("Actions", || host.apply_actions(session, actions))?;
    print_outcome(&outcome);

    let observation = profiler.record_phase("Observe", || host.observe(session, cost_functions))?;
    print_observation(&observation);

    if print_ir {
        println!("{}", "== LLVM IR ==".bold());
        println!("{}", host.ir(session)?);
    }

    host.end_session(session)?;
    if cli.time {
        print_timings(profiler.phases());
    }

    if !outcome.is_success() {
        bail!("action batch was rejected");
    }
    Ok(())
}

fn handle_actions() {
    for action in LlvmAction::ALL {
        println!("{:>4}  {}", action.index(), action.flag());
    }
}

fn print_baselines(baselines: &BaselineCosts) {
    println!("{}", "[Baselines]".bold());
    for policy in BaselinePolicy::ALL {
        for cost_function in CostFunction::ALL {
            println!(
                "{:>4} {:>24}: {}",
                policy.to_string(),
                cost_function.name(),
                baselines.get(policy, cost_function)
            );
        }
    }
}

fn print_outcome(outcome: &ActionOutcome) {
    match &outcome.failure {
        None => println!("{} {} action(s)", "applied".green().bold(), outcome.applied_count),
        Some(failure) => println!(
            "{} action {} ({}): {}",
            "rejected".red().bold(),
            failure.index,
            failure.action,
            failure.error
        ),
    }
}

fn print_observation(observation: &Observation) {
    println!("{}", "[Costs]".bold());
    for cost in &observation.costs {
        println!(
            "{:>29}: {} ({:+} vs -O0, {:+} vs -Oz)",
            cost.cost_function.name(),
            cost.value,
            cost.delta_from(BaselinePolicy::O0),
            cost.delta_from(BaselinePolicy::Oz),
        );
    }
}

fn print_timings(phases: &[PhaseTiming]) {
    println!("{}", "[Timing]".bold());
    let mut total = std::time::Duration::ZERO;
    for PhaseTiming { name, duration } in phases {
        println!("{:>16}: {:>6.2} ms", name, duration.as_secs_f64() * 1000.0);
        total += *duration;
    }
    println!("{:>16}: {:>6.2} ms", "Total", total.as_secs_f64() * 1000.0);
}
