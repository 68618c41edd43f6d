//! Synapse command-line driver.
//!
//! Provides the `synapse` binary. The `synthesize` subcommand loads a
//! serialized trace, an optional traffic profile and an optional config
//! file, runs the search with the reference generator library and prints
//! the cheapest execution plans.

mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use synapse_core::TraceGraph;
use synapse_search::{
    library, ExecutionPlan, PerfOracle, Profiler, SearchEngine, SearchStats, SynthesisError,
    SynthesisOutcome, TargetType,
};

use crate::config::Config;

/// Synapse trace-to-target synthesizer.
#[derive(Parser)]
#[command(name = "synapse", about = "Synthesizes execution plans for packet-processing traces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a trace onto the enabled targets.
    Synthesize {
        /// Serialized trace graph (JSON).
        #[arg(short, long)]
        trace: PathBuf,

        /// Traffic profile (JSON). Defaults to an even split at every branch.
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Config file (JSON). Falls back to $SYNAPSE_CONFIG.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enabled targets, comma separated. The first one receives the
        /// traffic.
        #[arg(long, value_delimiter = ',', default_value = "switch,switch_cpu,controller")]
        targets: Vec<TargetType>,

        /// Number of ranked plans to report.
        #[arg(long, default_value_t = 1)]
        top: usize,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Reports go to stdout, logs to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Synthesize {
            trace,
            profile,
            config,
            targets,
            top,
            json,
        } => {
            let exit_code = run_synthesize(
                &trace,
                profile.as_deref(),
                config.as_deref(),
                &targets,
                top,
                json,
            );
            process::exit(exit_code);
        }
    }
}

/// Execute the synthesize subcommand.
///
/// Returns exit code: 0 = success, 1 = no plan found, 2 = invalid input,
/// 3 = I/O error.
fn run_synthesize(
    trace_path: &Path,
    profile_path: Option<&Path>,
    config_path: Option<&Path>,
    targets: &[TargetType],
    top: usize,
    json: bool,
) -> i32 {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(config::ConfigError::Io { path, source }) => {
            eprintln!("Error: failed to read config '{}': {}", path.display(), source);
            return 3;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let text = match std::fs::read_to_string(trace_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read trace '{}': {}", trace_path.display(), e);
            return 3;
        }
    };
    let graph = match TraceGraph::from_json(&text) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: invalid trace '{}': {}", trace_path.display(), e);
            return 2;
        }
    };

    let profiler = match profile_path {
        None => Profiler::uniform(&graph),
        Some(path) => {
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("Error: failed to read profile '{}': {}", path.display(), e);
                    return 3;
                }
            };
            match Profiler::from_json(&text) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: invalid profile '{}': {}", path.display(), e);
                    return 2;
                }
            }
        }
    };

    let registry = match library::registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let Some(&initial) = targets.first() else {
        eprintln!("Error: {}", SynthesisError::NoTargets);
        return 2;
    };

    let mut search = config.search.clone();
    search.results = top.max(1);
    let engine = SearchEngine::new(registry, config.env(), search);

    match engine.run(graph, initial, targets, profiler) {
        Ok(outcome) => {
            if json {
                let report = Report::new(&outcome, &engine);
                let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
                    format!("{{\"error\": \"failed to serialize report: {}\"}}", e)
                });
                println!("{}", json);
            } else {
                print!("{}", render_report(&outcome, &engine));
            }
            0
        }
        Err(SynthesisError::NoLoweringFound {
            node,
            operation,
            best_partial,
        }) => {
            eprintln!("No generator can lower node {} ({})", node, operation);
            if let Some(partial) = best_partial {
                eprintln!("Most complete partial plan:");
                eprintln!("{}", partial);
            }
            1
        }
        Err(
            e @ (SynthesisError::NoTargets
            | SynthesisError::TargetDisabled { .. }
            | SynthesisError::EmptyTrace),
        ) => {
            eprintln!("Error: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Synthesis error: {}", e);
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PlanReport<'a> {
    id: u64,
    cost: f64,
    modules: Vec<String>,
    perf: &'a PerfOracle,
    memory_bits: u64,
}

#[derive(Serialize)]
struct Report<'a> {
    plans: Vec<PlanReport<'a>>,
    stats: SearchStats,
}

impl<'a> Report<'a> {
    fn new(outcome: &'a SynthesisOutcome, engine: &SearchEngine) -> Self {
        let weights = &engine.env().weights;
        let plans = outcome
            .plans
            .iter()
            .map(|plan: &'a ExecutionPlan| PlanReport {
                id: plan.id().0,
                cost: plan.cost(weights),
                modules: plan.modules().map(ToString::to_string).collect(),
                perf: plan.ledger().perf(),
                memory_bits: plan.ledger().memory_bits(),
            })
            .collect();
        Report {
            plans,
            stats: outcome.stats,
        }
    }
}

fn render_report(outcome: &SynthesisOutcome, engine: &SearchEngine) -> String {
    let weights = &engine.env().weights;
    let mut out = String::new();
    for (rank, plan) in outcome.plans.iter().enumerate() {
        let perf = plan.ledger().perf();
        out.push_str(&format!("#{} {} cost {:.4}\n", rank + 1, plan.id(), plan.cost(weights)));
        out.push_str(&plan.render());
        out.push_str(&format!(
            "  traffic: dropped {:.3} forwarded {:.3} broadcast {:.3} \
             recirculated {:.3} cpu {:.3} controller {:.3}\n",
            perf.dropped,
            perf.total_forwarded(),
            perf.broadcast,
            perf.total_recirculated(),
            perf.cpu,
            perf.controller
        ));
        out.push_str(&format!(
            "  memory: {} bits\n\n",
            plan.ledger().memory_bits()
        ));
    }
    let stats = outcome.stats;
    out.push_str(&format!(
        "search: {} iterations, {} generated, {} dead, {} pruned\n",
        stats.iterations, stats.generated, stats.dead, stats.pruned
    ));
    out
}
