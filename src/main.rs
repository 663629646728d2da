use std::process;

use serde_json::json;
use tracing::{error, info};

use learnsim::prelude::*;

/// Classic instrumental conditioning: responding `lever` to `light` is
/// rewarded, then the reward is withdrawn.
const DEMO_SCRIPT: &str = "
@comment Acquisition and extinction of a lever press.

@parameters
{
  'mechanism': 'ga',
  'subjects': 20,
  'behaviors': ['lever', 'groom'],
  'stimulus_elements': ['light', 'food', 'dark'],
  'u': {'food': 10, 'default': 0},
  'behavior_cost': {'lever': 1, 'default': 0},
  'alpha_v': 0.1,
  'alpha_w': 0.1,
  'beta': 1,
  'omit_learning': ['dark']
}

@phase {'label': 'acquisition', 'end': 'light=100'}
LIGHT light | lever: FOOD | ITI
FOOD  food  | ITI
ITI   dark  | LIGHT

@phase {'label': 'extinction', 'end': 'light=100'}
LIGHT light | ITI
ITI   dark  | LIGHT

@run {'label': 'conditioning'}

@pplot ('light', 'lever') {'phase': 'acquisition'}
@vplot ('light', 'lever') {'subject': 'all'}
@nplot ['light', 'lever'] 'light' {'cumulative': 'off'}
";

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return;
    }

    // stdout carries the JSON report only
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match args[1].as_str() {
        "demo" => {
            if args.len() > 2 {
                usage_error("demo takes no arguments");
            }
            run_script("demo", DEMO_SCRIPT, RunOptions::default());
        }
        "run" => {
            let (path, options) = parse_run_args(&args[2..]);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    error!("Could not read {}: {}", path, e);
                    process::exit(1);
                }
            };
            run_script(&path, &text, options);
        }
        other => usage_error(&format!("Unknown command: {}", other)),
    }
}

fn parse_run_args(args: &[String]) -> (String, RunOptions) {
    let mut path = None;
    let mut options = RunOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                let Some(seed) = args.get(i + 1).and_then(|s| s.parse::<u64>().ok()) else {
                    usage_error("--seed expects a non-negative integer");
                };
                options = options.with_seed(seed);
                i += 2;
            }
            arg if path.is_none() && !arg.starts_with("--") => {
                path = Some(arg.to_string());
                i += 1;
            }
            arg => usage_error(&format!("Unexpected argument: {}", arg)),
        }
    }
    match path {
        Some(path) => (path, options),
        None => usage_error("run expects a script path"),
    }
}

fn run_script(name: &str, text: &str, options: RunOptions) {
    let script = match Script::parse(text) {
        Ok(script) => script,
        Err(e) => fail(name, &e),
    };
    let output = match script.run(options) {
        Ok(output) => output,
        Err(e) => fail(name, &e),
    };

    let observer = Observer::new(&output);
    for run in observer.summary() {
        let mean = run.steps.iter().sum::<usize>() as f64 / run.steps.len().max(1) as f64;
        info!(
            "Run '{}': {} subject(s), phases {:?}, {:.1} steps per subject",
            run.label,
            run.steps.len(),
            run.phases,
            mean
        );
    }

    let mut results = Vec::new();
    for command in script.plot_commands() {
        match observer.evaluate_command(command) {
            Ok(values) => results.push(json!({
                "expression": command.expression.to_string(),
                "export": command.eval.filename,
                "values": values,
            })),
            Err(e) => fail(name, &e),
        }
    }
    let report = json!({
        "comment": script.comment(),
        "runs": observer.summary(),
        "results": results,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            error!("Could not encode results: {}", e);
            process::exit(1);
        }
    }
}

fn fail(name: &str, e: &Error) -> ! {
    error!("{}: {:?} error: {}", name, e.kind(), e);
    process::exit(1);
}

fn usage_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    print_help();
    process::exit(2);
}

fn print_help() {
    println!("learnsim (stimulus-response learning simulator)");
    println!("usage:");
    println!("  learnsim run <script> [--seed N]");
    println!("  learnsim demo");
    println!("  learnsim --help");
}
