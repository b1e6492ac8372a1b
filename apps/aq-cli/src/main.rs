use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use aq_io::outfile::OutReader;
use aq_io::results::{self, RunSummary};
use aq_project::Project;

#[derive(Parser)]
#[command(name = "aq-cli")]
#[command(about = "aquanet CLI - water distribution network simulation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full hydraulic + water-quality simulation
    Run {
        /// Path to the INP network file
        inp_path: PathBuf,
        /// Report file path (optional)
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Binary output file path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a summary of a binary output file
    Summary {
        /// Path to a binary output file
        output_path: PathBuf,
        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export one element's time series from a binary output file
    Export {
        /// Path to a binary output file
        output_path: PathBuf,
        /// Node or link ID
        element_id: String,
        /// Variable name (demand, head, pressure, quality, flow, velocity, headloss, status, setting)
        variable: String,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        csv: Option<PathBuf>,
        /// Emit the series as JSON instead of CSV
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            inp_path,
            report,
            output,
        } => cmd_run(&inp_path, report.as_deref(), output.as_deref()),
        Commands::Summary { output_path, json } => cmd_summary(&output_path, json),
        Commands::Export {
            output_path,
            element_id,
            variable,
            csv,
            json,
        } => cmd_export(&output_path, &element_id, &variable, csv.as_deref(), json),
    };
    if let Err(message) = result {
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

fn cmd_run(inp: &Path, report: Option<&Path>, output: Option<&Path>) -> Result<(), String> {
    let rpt = report.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    let out = output.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

    println!("Running simulation: {}", inp.display());
    let mut project = Project::new().map_err(|e| e.to_string())?;
    project
        .open(&inp.to_string_lossy(), &rpt, &out)
        .map_err(|e| format!("{e} (code {})", e.code().value()))?;

    let warn_h = project.solve_h().map_err(|e| e.to_string())?;
    let warn_q = project.solve_q().map_err(|e| e.to_string())?;
    if !rpt.is_empty() {
        project.report().map_err(|e| e.to_string())?;
    }

    println!("✓ Simulation completed");
    println!("  Nodes: {}", project.network.n_nodes());
    println!("  Links: {}", project.network.n_links());
    println!(
        "  Duration: {}",
        aq_core::time::format_clock(project.network.times.duration)
    );
    println!("  Mass balance ratio: {:.4}", project.mass_balance_ratio());
    if let Some(w) = aq_core::Warn::max(warn_h, warn_q) {
        println!("  Warning {}: {}", w.value(), w);
    }
    if !out.is_empty() {
        println!("  Results written to {out}");
    }
    project.close().map_err(|e| e.to_string())?;
    Ok(())
}

fn cmd_summary(output_path: &Path, json: bool) -> Result<(), String> {
    let reader = OutReader::open(output_path).map_err(|e| e.to_string())?;
    let summary = RunSummary::of(&reader);
    if json {
        let text = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }
    println!("Run summary for {}:", output_path.display());
    println!("  Nodes: {}", summary.nodes);
    println!("  Tanks: {}", summary.tanks);
    println!("  Links: {}", summary.links);
    println!("  Pumps: {}", summary.pumps);
    println!("  Valves: {}", summary.valves);
    println!("  Reporting periods: {}", summary.periods);
    println!(
        "  Duration: {}",
        aq_core::time::format_clock(summary.duration)
    );
    if summary.warnings > 0 {
        println!("  Warnings recorded: {}", summary.warnings);
    }
    Ok(())
}

fn cmd_export(
    output_path: &Path,
    element_id: &str,
    variable: &str,
    csv_path: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let reader = OutReader::open(output_path).map_err(|e| e.to_string())?;

    // try the node variable first, then the link variable
    let series = results::node_series(&reader, element_id, variable)
        .or_else(|_| results::link_series(&reader, element_id, variable))
        .map_err(|_| format!("no series for '{element_id}' / '{variable}'"))?;

    if json {
        let text = serde_json::to_string_pretty(&series).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    let csv = results::series_to_csv(&series);
    if let Some(path) = csv_path {
        std::fs::write(path, csv).map_err(|e| e.to_string())?;
        println!("✓ Exported {} points to {}", series.len(), path.display());
    } else {
        print!("{csv}");
    }
    Ok(())
}
