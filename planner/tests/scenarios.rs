//! End-to-end scenarios for the refinement search, from the trivial
//! one-step problem up to hierarchical decomposition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use weaver_model::{Formula, StepTime};
use weaver_planner::{
    fmt, solve, worlds, Heuristic, Parameters, PlanningResult, SearchAlgorithm, GOAL_ID,
};

fn step_id_of(result: &PlanningResult, name: &str) -> Option<usize> {
    result
        .plan
        .as_ref()?
        .steps()
        .iter()
        .find(|s| s.action.name == name)
        .map(|s| s.id)
}

/// Checks the structural invariants every reachable plan must satisfy.
fn check_invariants(result: &PlanningResult) {
    let plan = result.plan.as_ref().expect("no plan to check");
    let ctx = &result.ctx;
    // step ids are unique; the initial and goal steps are present
    let mut ids: Vec<usize> = plan.steps().iter().map(|s| s.id).collect();
    ids.sort_unstable();
    let n = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), n, "duplicate step ids");
    assert!(ids.contains(&0), "initial step missing");
    assert!(ids.contains(&GOAL_ID), "goal step missing");
    for step in plan.steps().iter() {
        if step.id != 0 && step.id != GOAL_ID {
            assert!(step.id >= 1 && step.id <= plan.num_steps());
        }
    }
    // every link joins existing steps, is entailed by the orderings, and
    // its condition unifies with some effect of its producer
    for link in plan.links().iter() {
        let from = plan.step(link.from_id).expect("link from unknown step");
        assert!(plan.step(link.to_id).is_some(), "link to unknown step");
        assert!(
            !plan.orderings().possibly_after(
                link.from_id,
                link.effect_time,
                link.to_id,
                link.condition_time.start_time(),
            ),
            "link not entailed by orderings"
        );
        // closed-world links from the initial step support a negation by
        // the absence of the atom, not by an effect
        if !(link.from_id == 0 && link.condition.is_negative()) {
            let supported = from.action.effects.iter().any(|e| {
                let mut mgu = weaver_planner::bindings::BindingList::new();
                ctx.unify(
                    plan.bindings(),
                    &mut mgu,
                    &e.literal,
                    link.from_id,
                    &link.condition,
                    link.to_id,
                )
            });
            assert!(supported, "link condition not supported by its producer");
        }
    }
    assert!(plan.complete());
}

#[test]
fn trivial_problem_yields_one_step_plan() {
    let problem = worlds::trivial();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    let plan = result.plan.as_ref().expect("trivial problem is solvable");
    assert_eq!(plan.num_steps(), 1);
    assert_eq!(plan.num_links(), 1);
    let link = plan.links().head().unwrap();
    assert_eq!(link.from_id, 1);
    assert_eq!(link.to_id, GOAL_ID);
    let (_, _, makespan) = plan.orderings().schedule();
    assert_eq!(makespan, 1.0);
    let rendered = format!("{}", fmt::display(plan, &result.ctx, 0));
    assert!(rendered.contains("Makespan: 1"));
    assert!(rendered.contains("(a)"));
    check_invariants(&result);
}

#[test]
fn threatened_link_is_demoted_or_promoted() {
    let problem = worlds::threatened_link();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    assert!(result.plan.is_some(), "threat problem is solvable");
    check_invariants(&result);
    let a = step_id_of(&result, "a").expect("a in plan");
    let b = step_id_of(&result, "b").expect("b in plan");
    let c = step_id_of(&result, "c").expect("c in plan");
    let plan = result.plan.as_ref().unwrap();
    let orderings = plan.orderings();
    let demoted = !orderings.possibly_not_before(b, StepTime::End, a, StepTime::End);
    let promoted = !orderings.possibly_not_after(b, StepTime::End, c, StepTime::End);
    assert!(
        demoted || promoted,
        "the deleter must be ordered before the producer or after the consumer"
    );
}

#[test]
fn disjunctive_goal_commits_to_one_disjunct() {
    let problem = worlds::disjunctive_goal();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    let plan = result.plan.as_ref().expect("disjunctive goal is solvable");
    assert_eq!(plan.num_steps(), 1, "the cheaper disjunct needs one step");
    check_invariants(&result);
}

#[test]
fn inequality_excludes_the_named_object() {
    let problem = worlds::inequality();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    assert!(result.plan.is_some(), "inequality problem is solvable");
    check_invariants(&result);
    let plan = result.plan.as_ref().unwrap();
    let enter = plan
        .steps()
        .iter()
        .find(|s| s.action.name == "enter")
        .expect("enter step in plan");
    let who = plan
        .bindings()
        .binding(enter.action.parameters[0].into(), enter.id);
    let alice = result.ctx.problem.terms.object_named("alice").unwrap();
    assert_eq!(who, alice.into(), "only alice satisfies the inequality");
}

#[test]
fn composite_step_is_expanded_by_its_decomposition() {
    let problem = worlds::travel();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    assert!(result.plan.is_some(), "travel problem is solvable");
    check_invariants(&result);
    let plan = result.plan.as_ref().unwrap();
    assert_eq!(plan.num_decomposition_links(), 1);
    assert!(plan.unexpanded_steps().is_empty());
    let get_in = step_id_of(&result, "get-in-car").expect("get-in-car in plan");
    let drive = step_id_of(&result, "drive").expect("drive in plan");
    let get_out = step_id_of(&result, "get-out-of-car").expect("get-out-of-car in plan");
    let (starts, _, _) = plan.orderings().schedule();
    assert!(starts[&get_in] < starts[&drive]);
    assert!(starts[&drive] < starts[&get_out]);
    let frame = plan.decomposition_frames().head().unwrap();
    assert_eq!(frame.schema.name, "by-car");
    assert!(frame.dummy_initial().action.is_dummy());
}

#[test]
fn unsolvable_problem_reports_dead_ends() {
    let problem = worlds::unsolvable();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    assert!(result.plan.is_none());
    assert!(result.stats.dead_ends > 0);
}

#[test]
fn empty_goal_is_immediately_complete() {
    let mut problem = worlds::trivial();
    problem.set_goal(Formula::Tautology);
    let params = Parameters::default();
    let result = solve(&problem, &params);
    let plan = result.plan.as_ref().expect("empty goal is solvable");
    assert_eq!(plan.num_steps(), 0);
    assert_eq!(plan.num_links(), 0);
}

#[test]
fn contradictory_goal_has_no_initial_plan() {
    let mut problem = worlds::trivial();
    problem.set_goal(Formula::Contradiction);
    let params = Parameters::default();
    let result = solve(&problem, &params);
    assert!(result.plan.is_none());
}

#[test]
fn durative_plan_schedules_by_duration() {
    let problem = worlds::durative();
    let params = Parameters::default();
    let result = solve(&problem, &params);
    let plan = result.plan.as_ref().expect("durative problem is solvable");
    let (_, _, makespan) = plan.orderings().schedule();
    assert_eq!(makespan, 10.0);
    let rendered = format!("{}", fmt::display(plan, &result.ctx, 0));
    assert!(rendered.contains("Makespan: 10"));
    assert!(rendered.contains("[10]"));
}

#[test]
fn iterative_deepening_finds_the_same_solution() {
    let problem = worlds::threatened_link();
    let params = Parameters {
        search_algorithm: SearchAlgorithm::IdaStar,
        ..Parameters::default()
    };
    let result = solve(&problem, &params);
    assert!(result.plan.is_some());
    check_invariants(&result);
}

#[test]
fn ground_planning_solves_the_trivial_problem() {
    let problem = worlds::trivial();
    let params = Parameters {
        ground_actions: true,
        ..Parameters::default()
    };
    let result = solve(&problem, &params);
    assert!(result.plan.is_some());
}

#[test]
fn additive_heuristic_guides_the_threat_problem() {
    let problem = worlds::threatened_link();
    let params = Parameters {
        heuristic: Heuristic::Add,
        weight: 2.0,
        ..Parameters::default()
    };
    let result = solve(&problem, &params);
    assert!(result.plan.is_some());
    check_invariants(&result);
}

#[test]
fn random_open_conditions_are_deterministic_under_a_seed() {
    let problem = worlds::threatened_link();
    let params = Parameters {
        random_open_conditions: true,
        random_seed: 42,
        ..Parameters::default()
    };
    let first = solve(&problem, &params);
    let second = solve(&problem, &params);
    assert!(first.plan.is_some());
    assert_eq!(first.stats.generated, second.stats.generated);
    assert_eq!(first.stats.visited, second.stats.visited);
}

#[test]
fn interrupt_terminates_with_no_solution() {
    let problem = worlds::trivial();
    let flag = Arc::new(AtomicBool::new(true));
    let params = Parameters {
        interrupt: Some(flag.clone()),
        ..Parameters::default()
    };
    let result = solve(&problem, &params);
    assert!(result.plan.is_none());
    flag.store(false, Ordering::Relaxed);
}
