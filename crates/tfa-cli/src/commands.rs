use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rayon::ThreadPoolBuilder;
use tabwriter::TabWriter;
use tracing::{info, warn};

use tfa_algo::{assign, AssignOptions, AssignmentReport, SolveOptions};
use tfa_cli::cli::Commands;
use tfa_io::{load_case, CaseImport, FlowDump, NetworkState};

pub fn handle(command: &Commands) -> Result<()> {
    match command {
        Commands::Assign {
            case_file,
            out,
            flows,
            report,
            trip_flows,
            strict,
            no_screen,
            max_iter,
            time_limit,
            solver_output,
            threads,
        } => {
            configure_threads(threads);
            let options = AssignOptions {
                strict: *strict,
                record_trip_flows: *trip_flows,
                check_reachability: !*no_screen,
                solve: SolveOptions {
                    verbose: *solver_output,
                    max_iterations: *max_iter,
                    time_limit: parse_time_limit(*time_limit)?,
                },
            };
            run_assign(
                case_file,
                out.as_deref(),
                flows.as_deref(),
                report.as_deref(),
                &options,
            )
        }
        Commands::Validate { case_file } => run_validate(case_file),
    }
}

fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

fn parse_time_limit(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => bail!("time limit must be a positive number of seconds, got {secs}"),
    }
}

fn run_assign(
    case_file: &str,
    out: Option<&str>,
    flows: Option<&str>,
    report_out: Option<&str>,
    options: &AssignOptions,
) -> Result<()> {
    let start = Instant::now();
    let CaseImport {
        name,
        mut network,
        demand,
        diagnostics,
    } = load_case(case_file)?;

    for issue in &diagnostics.issues {
        warn!("{}", issue);
    }
    if diagnostics.has_errors() {
        bail!(
            "case {} has structural errors ({})",
            case_file,
            diagnostics.summary()
        );
    }

    let case_name = if name.is_empty() { case_file } else { name.as_str() };
    let stats = network.stats();
    info!(
        "Case {}: {} stations, {} lines, {} segments, {} demand pair(s)",
        case_name,
        stats.num_stations,
        stats.num_lines,
        stats.num_segments,
        demand.len()
    );

    let report = assign(&mut network, &demand, options)?;

    print_pair_table(&report)?;
    for failure in &report.failures {
        warn!(
            "pair {} -> {} ({:.3}): {}",
            failure.origin, failure.destination, failure.demand, failure.message
        );
    }
    println!(
        "Assigned {:.3} of {:.3} demand across {} pair(s) in {} ms ({} failure(s))",
        report.assigned_demand,
        report.total_demand,
        report.pairs.len(),
        start.elapsed().as_millis(),
        report.failures.len()
    );

    if let Some(path) = out {
        NetworkState::capture(case_name, &network).to_json(Path::new(path))?;
        println!("Network state written to {path}");
    }
    if let Some(path) = flows {
        FlowDump::capture(&network).to_json(Path::new(path))?;
        println!("Segment flows written to {path}");
    }
    if let Some(path) = report_out {
        write_report(&report, Path::new(path))?;
        println!("Assignment report written to {path}");
    }
    Ok(())
}

fn print_pair_table(report: &AssignmentReport) -> Result<()> {
    if report.pairs.is_empty() {
        println!("No pairs assigned");
        return Ok(());
    }
    let mut writer = TabWriter::new(io::stdout());
    writeln!(
        writer,
        "ORIGIN\tDESTINATION\tDEMAND\tGAP\tOBJECTIVE\tITERATIONS\tTIME (MS)"
    )?;
    for pair in &report.pairs {
        writeln!(
            writer,
            "{}\t{}\t{:.3}\t{:.4}\t{:.4}\t{}\t{}",
            pair.origin,
            pair.destination,
            pair.demand,
            pair.potential_gap,
            pair.objective,
            pair.iterations,
            pair.solve_time_ms
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn write_report(report: &AssignmentReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating report file: {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("writing report to {:?}", path))?;
    Ok(())
}

fn run_validate(case_file: &str) -> Result<()> {
    let CaseImport {
        name,
        network,
        demand,
        mut diagnostics,
    } = load_case(case_file)?;
    network.validate_into(&mut diagnostics);

    let case_name = if name.is_empty() { case_file } else { name.as_str() };
    let stats = network.stats();
    println!("Case {case_name}:");
    println!("  Stations  : {}", stats.num_stations);
    println!("  Lines     : {}", stats.num_lines);
    println!("  Segments  : {}", stats.num_segments);
    println!("  Transfers : {}", stats.num_transfers);
    println!("  Resistors : {}", stats.num_resistors);
    println!("  Diodes    : {}", stats.num_diodes);
    println!(
        "  Demand    : {} pair(s), {:.3} total",
        demand.len(),
        demand.total_demand()
    );

    for issue in &diagnostics.issues {
        println!("{issue}");
    }
    if diagnostics.has_errors() {
        bail!("case {} is not usable: {}", case_file, diagnostics.summary());
    }
    println!("{}", diagnostics.summary());
    Ok(())
}
