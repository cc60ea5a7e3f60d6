//! Built-in demo problems exercising each corner of the refinement
//! search, shared by the demo binary and the integration tests.

use std::rc::Rc;

use weaver_model::{
    Action, Decomposition, Domain, Effect, Formula, Literal, Atom, Problem, Term, TypeId,
};

/// One action adding `p`, goal `p`.
pub fn trivial() -> Problem {
    let mut domain = Domain::new("trivial");
    let p = domain.predicates.add("p", vec![]);
    domain.add_action(
        Action::new("a").with_effect(Effect::at_end(Literal::Positive(Atom::new(p, vec![])))),
    );
    let mut problem = Problem::new("trivial-1", Rc::new(domain));
    problem.set_goal(Formula::atom(p, vec![]));
    problem
}

/// `b` deletes the `p` that `a` provides to `c`; the solution must demote
/// or promote `b` around the causal link.
pub fn threatened_link() -> Problem {
    let mut domain = Domain::new("threat");
    let p = domain.predicates.add("p", vec![]);
    let q = domain.predicates.add("q", vec![]);
    let done = domain.predicates.add("done", vec![]);
    domain.add_action(
        Action::new("a").with_effect(Effect::at_end(Literal::Positive(Atom::new(p, vec![])))),
    );
    domain.add_action(
        Action::new("b")
            .with_effect(Effect::at_end(Literal::Negative(Atom::new(p, vec![]))))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(q, vec![])))),
    );
    domain.add_action(
        Action::new("c")
            .with_condition(Formula::atom(p, vec![]))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(done, vec![])))),
    );
    let mut problem = Problem::new("threat-1", Rc::new(domain));
    problem.set_goal(Formula::and(vec![
        Formula::atom(done, vec![]),
        Formula::atom(q, vec![]),
    ]));
    problem
}

/// Goal `(or p q)` with one achiever per disjunct.
pub fn disjunctive_goal() -> Problem {
    let mut domain = Domain::new("disjunction");
    let p = domain.predicates.add("p", vec![]);
    let q = domain.predicates.add("q", vec![]);
    domain.add_action(
        Action::new("a").with_effect(Effect::at_end(Literal::Positive(Atom::new(p, vec![])))),
    );
    domain.add_action(
        Action::new("b").with_effect(Effect::at_end(Literal::Positive(Atom::new(q, vec![])))),
    );
    let mut problem = Problem::new("disjunction-1", Rc::new(domain));
    problem.set_goal(Formula::or(vec![
        Formula::atom(p, vec![]),
        Formula::atom(q, vec![]),
    ]));
    problem
}

/// Goal `(and (at ?x room1) (not (= ?x bob)))`: only alice qualifies.
pub fn inequality() -> Problem {
    let mut domain = Domain::new("inequality");
    domain.requirements.typing = true;
    let person = domain.types.add("person", TypeId::OBJECT);
    let room = domain.types.add("room", TypeId::OBJECT);
    let at = domain.predicates.add("at", vec![person, room]);
    let wp = domain.terms.add_variable(person);
    let wr = domain.terms.add_variable(room);
    domain.add_action(
        Action::new("enter")
            .with_parameters(vec![wp, wr])
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(
                at,
                vec![wp.into(), wr.into()],
            )))),
    );
    let x = domain.terms.add_variable(person);
    let mut problem = Problem::new("inequality-1", Rc::new(domain));
    let bob = problem.add_object("bob", person);
    let _alice = problem.add_object("alice", person);
    let room1 = problem.add_object("room1", room);
    problem.set_goal(Formula::and(vec![
        Formula::atom(at, vec![x.into(), room1.into()]),
        Formula::inequality(x.into(), Term::Object(bob)),
    ]));
    problem
}

/// A composite `travel` action refined by a get-in / drive / get-out
/// decomposition. Only `travel` achieves `at`, so the search must expand.
pub fn travel() -> Problem {
    let mut domain = Domain::new("travel");
    domain.requirements.typing = true;
    let person = domain.types.add("person", TypeId::OBJECT);
    let car = domain.types.add("car", TypeId::OBJECT);
    let location = domain.types.add("location", TypeId::OBJECT);
    let at = domain.predicates.add("at", vec![person, location]);
    let car_at = domain.predicates.add("car-at", vec![car, location]);
    let in_car = domain.predicates.add("in", vec![person, car]);
    let out = domain.predicates.add("out-of-car", vec![person, location]);

    let tv_t = domain.terms.add_variable(person);
    let tv_from = domain.terms.add_variable(location);
    let tv_to = domain.terms.add_variable(location);
    let travel = domain.add_action(
        Action::new("travel")
            .with_parameters(vec![tv_t, tv_from, tv_to])
            .with_condition(Formula::atom(at, vec![tv_t.into(), tv_from.into()]))
            .with_effect(Effect::at_end(Literal::Negative(Atom::new(
                at,
                vec![tv_t.into(), tv_from.into()],
            ))))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(
                at,
                vec![tv_t.into(), tv_to.into()],
            ))))
            .composite(),
    );

    let gi_p = domain.terms.add_variable(person);
    let gi_c = domain.terms.add_variable(car);
    let gi_l = domain.terms.add_variable(location);
    let get_in = domain.add_action(
        Action::new("get-in-car")
            .with_parameters(vec![gi_p, gi_c, gi_l])
            .with_condition(Formula::and(vec![
                Formula::atom(at, vec![gi_p.into(), gi_l.into()]),
                Formula::atom(car_at, vec![gi_c.into(), gi_l.into()]),
            ]))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(
                in_car,
                vec![gi_p.into(), gi_c.into()],
            )))),
    );

    let dr_p = domain.terms.add_variable(person);
    let dr_c = domain.terms.add_variable(car);
    let dr_from = domain.terms.add_variable(location);
    let dr_to = domain.terms.add_variable(location);
    let drive = domain.add_action(
        Action::new("drive")
            .with_parameters(vec![dr_p, dr_c, dr_from, dr_to])
            .with_condition(Formula::and(vec![
                Formula::atom(in_car, vec![dr_p.into(), dr_c.into()]),
                Formula::atom(car_at, vec![dr_c.into(), dr_from.into()]),
            ]))
            .with_effect(Effect::at_end(Literal::Negative(Atom::new(
                car_at,
                vec![dr_c.into(), dr_from.into()],
            ))))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(
                car_at,
                vec![dr_c.into(), dr_to.into()],
            )))),
    );

    let go_p = domain.terms.add_variable(person);
    let go_c = domain.terms.add_variable(car);
    let go_l = domain.terms.add_variable(location);
    let get_out = domain.add_action(
        Action::new("get-out-of-car")
            .with_parameters(vec![go_p, go_c, go_l])
            .with_condition(Formula::and(vec![
                Formula::atom(in_car, vec![go_p.into(), go_c.into()]),
                Formula::atom(car_at, vec![go_c.into(), go_l.into()]),
            ]))
            .with_effect(Effect::at_end(Literal::Negative(Atom::new(
                in_car,
                vec![go_p.into(), go_c.into()],
            ))))
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(
                out,
                vec![go_p.into(), go_l.into()],
            )))),
    );

    let mut decomposition = Decomposition::new("by-car", &travel);
    let s_in = decomposition.add_step(get_in.clone());
    let s_drive = decomposition.add_step(drive.clone());
    let s_out = decomposition.add_step(get_out.clone());
    let dummy = Decomposition::DUMMY_INITIAL;
    // the sub-plan inherits the composite's traveler and endpoints
    decomposition.add_binding(gi_p, s_in, tv_t.into(), dummy, true);
    decomposition.add_binding(gi_l, s_in, tv_from.into(), dummy, true);
    decomposition.add_binding(dr_p, s_drive, tv_t.into(), dummy, true);
    decomposition.add_binding(dr_from, s_drive, tv_from.into(), dummy, true);
    decomposition.add_binding(dr_to, s_drive, tv_to.into(), dummy, true);
    decomposition.add_binding(go_p, s_out, tv_t.into(), dummy, true);
    decomposition.add_binding(go_l, s_out, tv_to.into(), dummy, true);
    decomposition.add_binding(gi_c, s_in, dr_c.into(), s_drive, true);
    decomposition.add_binding(go_c, s_out, dr_c.into(), s_drive, true);
    decomposition.add_link(
        s_in,
        Literal::Positive(Atom::new(in_car, vec![dr_p.into(), dr_c.into()])),
        s_drive,
    );
    decomposition.add_link(
        s_in,
        Literal::Positive(Atom::new(in_car, vec![go_p.into(), go_c.into()])),
        s_out,
    );
    decomposition.add_link(
        s_drive,
        Literal::Positive(Atom::new(car_at, vec![go_c.into(), go_l.into()])),
        s_out,
    );
    domain.add_decomposition(decomposition);

    let mut problem = Problem::new("travel-1", Rc::new(domain));
    let bob = problem.add_object("bob", person);
    let car1 = problem.add_object("car1", car);
    let home = problem.add_object("home", location);
    let lax = problem.add_object("lax", location);
    problem.add_init(Literal::Positive(Atom::new(at, vec![bob.into(), home.into()])));
    problem.add_init(Literal::Positive(Atom::new(
        car_at,
        vec![car1.into(), home.into()],
    )));
    problem.set_goal(Formula::atom(at, vec![bob.into(), lax.into()]));
    problem
}

/// Goal `p` with no achiever anywhere.
pub fn unsolvable() -> Problem {
    let mut domain = Domain::new("unsolvable");
    let p = domain.predicates.add("p", vec![]);
    let q = domain.predicates.add("q", vec![]);
    domain.add_action(
        Action::new("a").with_effect(Effect::at_end(Literal::Positive(Atom::new(q, vec![])))),
    );
    let mut problem = Problem::new("unsolvable-1", Rc::new(domain));
    problem.set_goal(Formula::atom(p, vec![]));
    problem
}

/// A single durative action; the makespan equals its duration.
pub fn durative() -> Problem {
    let mut domain = Domain::new("durative");
    let done = domain.predicates.add("done", vec![]);
    domain.add_action(
        Action::new("work")
            .durative(10.0, 10.0)
            .with_effect(Effect::at_end(Literal::Positive(Atom::new(done, vec![])))),
    );
    let mut problem = Problem::new("durative-1", Rc::new(domain));
    problem.set_goal(Formula::atom(done, vec![]));
    problem
}

/// Looks up a built-in problem by name.
pub fn by_name(name: &str) -> Option<Problem> {
    match name {
        "trivial" => Some(trivial()),
        "threat" => Some(threatened_link()),
        "disjunction" => Some(disjunctive_goal()),
        "inequality" => Some(inequality()),
        "travel" => Some(travel()),
        "unsolvable" => Some(unsolvable()),
        "durative" => Some(durative()),
        _ => None,
    }
}
