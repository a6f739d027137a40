use anyhow::Context;
use log::*;

mod eligibility;
mod error;
mod formulation;
mod loops;
mod lp;
mod occupancy;
mod plan;
mod problem;
mod raw_problem;
mod settings;
mod solver;
mod timeline;

use solver::MipSolver;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "railcharge",
    about = "Chooses diesel or electric power for a depot-based train fleet and sizes fuel and charging stations."
)]
struct Opt {
    /// Problem instance
    #[structopt(name = "FILE")]
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Write the fleet plan as JSON if one is found.
    #[structopt(short = "o")]
    #[structopt(parse(from_os_str))]
    planoutputfile: Option<PathBuf>,

    /// Write the emitted model in CPLEX LP format.
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    lp: Option<PathBuf>,

    /// Write per-train loop plans, occupancy grids and charging
    /// eligibility as JSON.
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    timelines: Option<PathBuf>,

    /// Stop the optimizer after this many seconds and use the best plan
    /// found so far.
    #[structopt(long)]
    time_limit: Option<u64>,

    /// Override the daily hour budget from the problem file.
    #[structopt(long)]
    daily_hours: Option<u64>,

    /// Override the maximum number of hours between charges.
    #[structopt(long)]
    max_battery_gap: Option<u64>,

    /// Choose depots with the assignment model even if the problem file
    /// already assigns them.
    #[structopt(long)]
    assign_depots: bool,

    /// Activate debug mode
    #[structopt(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let _h1 = hprof::enter("init");

    let opt = Opt::from_args();
    let level = if opt.verbose {
        if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    } else {
        LevelFilter::Warn
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("could not initialize logging")?;
    info!("{:#?}", opt);
    drop(_h1);

    let limits = solver::SolveLimits {
        time_limit: opt.time_limit.map(Duration::from_secs),
    };

    let problem = {
        let json_contents = {
            let _h = hprof::enter("read file");
            trace!("Loading file {}", opt.file.display());
            std::fs::read_to_string(&opt.file)
                .with_context(|| format!("could not read {}", opt.file.display()))?
        };

        let _h = hprof::enter("parse");
        let mut raw_problem: raw_problem::Problem = serde_json::from_str(&json_contents)
            .with_context(|| format!("could not parse {}", opt.file.display()))?;
        trace!(
            "Converting problem with {} nodes, {} depots, {} paths",
            raw_problem.nodes.len(),
            raw_problem.depots.len(),
            raw_problem.paths.len()
        );

        if let Some(hours) = opt.daily_hours {
            raw_problem.settings.daily_hour_budget = hours;
        }
        if let Some(gap) = opt.max_battery_gap {
            raw_problem.settings.max_battery_gap = gap;
        }
        debug!("Settings: {:?}", raw_problem.settings);

        if raw_problem.assigned_depots.is_some() && !opt.assign_depots {
            problem::convert_raw(raw_problem)?
        } else {
            let network = problem::convert_network(raw_problem)?;
            drop(_h);
            let _h = hprof::enter("assign depots");
            let assignment =
                plan::assign_depots(&network, &mut solver::Z3Optimizer::new(), &limits)?;
            info!(
                "Assigned depots with {} total depot leg hours ({:?})",
                assignment.total_distance, assignment.status
            );
            network.into_problem(&assignment.depots)?
        }
    };

    let timelines = match &opt.timelines {
        Some(f) => {
            let fleet = timeline::derive_timelines(&problem)?;
            timeline::write_timelines_json(f, &problem, &fleet)
                .with_context(|| format!("could not write {}", f.display()))?;
            info!("Wrote timelines to file {}", f.display());
            fleet.into_complete()?
        }
        None => timeline::build_timelines(&problem)?,
    };

    let model = formulation::emit(&problem, &timelines);
    if let Some(f) = &opt.lp {
        let _h = hprof::enter("write lp");
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(f).with_context(|| format!("could not create {}", f.display()))?,
        );
        model
            .lp
            .write_lp(&mut out)
            .with_context(|| format!("could not write {}", f.display()))?;
        info!("Wrote model to file {}", f.display());
    }

    {
        let _h = hprof::enter("plan");
        let mut optimizer = solver::Z3Optimizer::new();
        debug!("Using {}", optimizer.name());

        match plan::solve_fleet(&problem, &timelines, &model, &mut optimizer, &limits) {
            plan::PlanningResult::Planned(plan) => {
                info!("Plan found.");
                println!("{}", plan::print_plan(&plan));
                if let Some(f) = &opt.planoutputfile {
                    plan::write_plan_json(f, &plan)
                        .with_context(|| format!("could not write {}", f.display()))?;
                    info!("Wrote plan to file {}", f.display());
                }
            }
            plan::PlanningResult::NoSolution { reason } => {
                println!("No plan found: {}", reason);
            }
            plan::PlanningResult::Infeasible { conflict } => {
                println!("The model is infeasible. Conflicting constraints:");
                for name in conflict.iter() {
                    println!("  {}", name);
                }
            }
        }
    }

    hprof::end_frame();
    if opt.verbose {
        hprof::profiler().print_timing();
    }
    Ok(())
}
