use anyhow::{anyhow, bail, Result};
use structopt::StructOpt;

use weaver_planner::{
    fmt, solve, worlds, FlawSelectionOrder, Heuristic, Parameters, SearchAlgorithm,
};

/// Runs the refinement search on one of the built-in demo problems.
#[derive(StructOpt, Debug)]
#[structopt(name = "weave")]
struct Opt {
    /// Built-in problem: trivial, threat, disjunction, inequality,
    /// travel, unsolvable, durative
    problem: String,

    /// Search algorithm: astar, ida
    #[structopt(long, default_value = "astar")]
    search: String,

    /// Plan ranking heuristic: ucpop, soc, add, makespan
    #[structopt(long, default_value = "ucpop")]
    heuristic: String,

    /// Heuristic weight
    #[structopt(long, default_value = "1.0")]
    weight: f32,

    /// Flaw selection order: ucpop, dsep, static-first, lcfr
    #[structopt(long, default_value = "ucpop")]
    flaw_order: String,

    /// Seed for the random draws of --random-open-conditions
    #[structopt(long, default_value = "0")]
    seed: u64,

    /// Plan over ground actions instead of lifted schemas
    #[structopt(long)]
    ground: bool,

    /// Restrict step parameters to their planning-graph domains
    #[structopt(long)]
    domain_constraints: bool,

    /// Drop open conditions on static predicates
    #[structopt(long)]
    strip_static: bool,

    /// Randomize the order of open conditions
    #[structopt(long)]
    random_open_conditions: bool,

    /// Verbosity (repeat for more: progress, plan dumps)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let problem = worlds::by_name(&opt.problem)
        .ok_or_else(|| anyhow!("unknown problem {:?}", opt.problem))?;

    let params = Parameters {
        search_algorithm: match opt.search.as_str() {
            "astar" => SearchAlgorithm::AStar,
            "ida" => SearchAlgorithm::IdaStar,
            other => bail!("unknown search algorithm {other:?}"),
        },
        heuristic: match opt.heuristic.as_str() {
            "ucpop" => Heuristic::Ucpop,
            "soc" => Heuristic::Soc,
            "add" => Heuristic::Add,
            "makespan" => Heuristic::Makespan,
            other => bail!("unknown heuristic {other:?}"),
        },
        weight: opt.weight,
        flaw_orders: vec![match opt.flaw_order.as_str() {
            "ucpop" => FlawSelectionOrder::ucpop(),
            "dsep" => FlawSelectionOrder::dsep(),
            "static-first" => FlawSelectionOrder::static_first(),
            "lcfr" => FlawSelectionOrder::lcfr(),
            other => bail!("unknown flaw order {other:?}"),
        }],
        ground_actions: opt.ground,
        domain_constraints: opt.domain_constraints,
        strip_static_preconditions: opt.strip_static,
        random_open_conditions: opt.random_open_conditions,
        random_seed: opt.seed,
        verbosity: opt.verbose.max(1),
        ..Parameters::default()
    };

    let result = solve(&problem, &params);
    match result.plan {
        Some(plan) => {
            println!("{}", fmt::display(&plan, &result.ctx, opt.verbose));
            Ok(())
        }
        None => bail!("no plan found"),
    }
}
