use learnsim::prelude::*;

fn run(text: &str, seed: u64) -> SimulationOutput {
    Script::parse(text)
        .unwrap()
        .run(RunOptions::default().with_seed(seed))
        .unwrap()
}

fn first_subject() -> EvalOptions {
    EvalOptions::default().with_subject(SubjectSelection::Index(0))
}

fn series(e: Evaluation) -> Vec<f64> {
    match e {
        Evaluation::Series(s) => s,
        other => panic!("expected a single series, got {other:?}"),
    }
}

#[test]
fn end_condition_stops_after_exact_count() {
    let out = run(
        "@parameters {'mechanism': 'rescorla_wagner', 'behaviors': ['R'], 'stimulus_elements': ['S', 'rew']}
         @phase {'label': 'cycle', 'end': 'rew=3'}
         A 'S'   | B
         B 'rew' | A
         @run",
        1,
    );
    let subject = &out.get("run1").unwrap().subjects[0];
    assert_eq!(subject.history().len(), 6);
    assert_eq!(subject.last_step(), Some(6));
}

#[test]
fn rescorla_wagner_curve_through_a_script() {
    let out = run(
        "@parameters {'mechanism': 'rescorla_wagner', 'behaviors': ['R'], 'stimulus_elements': ['S'],
                      'u': 1, 'start_v': 0, 'alpha_v': 0.5, 'behavior_cost': 0}
         @phase {'end': 'S=4'}
         L S | L
         @run",
        1,
    );
    let v = series(Observer::new(&out).v("S", "R", &first_subject()).unwrap());
    assert_eq!(v, vec![0.0, 0.0, 0.5, 0.75, 0.875]);
}

#[test]
fn disjoint_requirements_pin_each_element_to_its_behavior() {
    let out = run(
        "@parameters {'mechanism': 'sarsa', 'subjects': 3,
                      'behaviors': ['B0', 'B1'], 'stimulus_elements': ['E0', 'E1'],
                      'response_requirements': {'B0': 'E0', 'B1': 'E1'}}
         @phase {'end': 'E0=200'}
         L0 E0 | L0(0.5),L1(0.5)
         L1 E1 | L0(0.5),L1(0.5)
         @run",
        5,
    );
    let obs = Observer::new(&out);
    let opts = EvalOptions::default().with_subject(SubjectSelection::All);
    for (element, behavior) in [("E0", "B0"), ("E1", "B1")] {
        let pair = Pattern::Sequence(vec![
            Pattern::Name(element.into()),
            Pattern::Name(behavior.into()),
        ]);
        let both = obs.n(pair, None, &opts).unwrap();
        let alone = obs.n(Pattern::Name(element.into()), None, &opts).unwrap();
        assert_eq!(both, alone, "{element}/{behavior}");
    }
}

#[test]
fn same_seed_reproduces_different_seed_diverges() {
    let text = "
        @parameters {'mechanism': 'q_learning', 'subjects': 5, 'beta': 2,
                     'behaviors': ['R0', 'R1'], 'stimulus_elements': ['S', 'rew'],
                     'u': {'rew': 1, 'default': 0}, 'alpha_v': 0.2}
        @phase {'end': 'S=100'}
        S_LINE S   | R0: REW(0.8),S_LINE(0.2) | S_LINE
        REW    rew | S_LINE
        @run";
    let obs_opts = EvalOptions::default().with_subject(SubjectSelection::All);
    let a = run(text, 99);
    let b = run(text, 99);
    let c = run(text, 100);
    let pa = Observer::new(&a).p(&["S"], "R0", &obs_opts).unwrap();
    let pb = Observer::new(&b).p(&["S"], "R0", &obs_opts).unwrap();
    let pc = Observer::new(&c).p(&["S"], "R0", &obs_opts).unwrap();
    assert_eq!(pa, pb);
    assert_ne!(pa, pc);
}

#[test]
fn every_mechanism_runs_a_two_phase_script() {
    for (name, has_w) in [
        ("rescorla_wagner", false),
        ("q_learning", false),
        ("expected_sarsa", false),
        ("actor_critic", true),
        ("enquist", true),
    ] {
        let text = format!(
            "@parameters {{'mechanism': '{name}', 'subjects': 2,
                          'behaviors': ['R0', 'R1'], 'stimulus_elements': ['S', 'rew', 'iti'],
                          'u': {{'rew': 5, 'default': 0}}, 'c': {{'R0': 0.5, 'default': 0}},
                          'alpha_v': 0.1, 'alpha_w': 0.1, 'omit_learning': 'iti'}}
             @phase {{'label': 'train', 'end': 'S=30'}}
             STIM S   | R0: REW | ITI
             REW  rew | ITI
             ITI  iti | STIM
             @phase {{'label': 'test', 'end': 'S=10'}}
             STIM S   | ITI
             ITI  iti | STIM
             @run {{'label': '{name}'}}
             @nplot 'S' {{'runlabel': '{name}', 'phase': 'test'}}"
        );
        let script = Script::parse(&text).unwrap();
        let out = script.run(RunOptions::default()).unwrap();
        let run = out.get(name).unwrap();
        assert_eq!(run.has_w, has_w, "{name}");
        assert_eq!(run.subjects.len(), 2);

        let obs = Observer::new(&out);
        assert_eq!(obs.w("S", &EvalOptions::default()).is_ok(), has_w, "{name}");
        let command = script.plot_commands().next().unwrap();
        let n = series(obs.evaluate_command(command).unwrap());
        assert_eq!(n.last().copied(), Some(10.0), "{name}");
    }
}

#[test]
fn unmatched_condition_fails_at_run_time() {
    let script = Script::parse(
        "@parameters {'mechanism': 'ga', 'behaviors': ['R0', 'R1'], 'stimulus_elements': ['S']}
         @phase {'end': 'S=1000'}
         A S | R0: A | R1: A(0.0)
         @run",
    )
    .unwrap();
    let err = script.run(RunOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn later_parameters_apply_to_later_runs() {
    let out = run(
        "@parameters {'mechanism': 'ga', 'behaviors': ['R'], 'stimulus_elements': ['S'], 'subjects': 1}
         @phase {'end': 'S=3'}
         L S | L
         @run {'label': 'one'}
         @parameters {'subjects': 4}
         @run {'label': 'four'}",
        3,
    );
    assert_eq!(out.labels().collect::<Vec<_>>(), vec!["one", "four"]);
    assert_eq!(out.get("one").unwrap().subjects.len(), 1);
    assert_eq!(out.get("four").unwrap().subjects.len(), 4);
}
