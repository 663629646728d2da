//! Script text to runnable configuration.
//!
//! A script is a sequence of `@keyword` blocks. The first line of a block is
//! the keyword plus an optional literal dict; the following lines are its body.
//!
//! ```
//! use learnsim::script::Script;
//! use learnsim::simulation::RunOptions;
//!
//! let script: Script = "
//! @parameters {'mechanism': 'rescorla_wagner', 'behaviors': ['R'], 'stimulus_elements': ['S']}
//! @phase {'label': 'train', 'end': 'S=5'}
//! L1 S | L1
//! @run
//! ".parse().unwrap();
//! let out = script.run(RunOptions::default()).unwrap();
//! assert_eq!(out.get("run1").unwrap().subjects[0].history().len(), 5);
//! ```

use std::str::FromStr;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::literal::{parse_dict, parse_sequence, Dict, Literal};
use crate::mechanism::Mechanism;
use crate::observer::{EvalOptions, Expression, Quantity};
use crate::output::SimulationOutput;
use crate::parameters::Parameters;
use crate::simulation::{RunOptions, ScriptRun};
use crate::world::{PhaseDef, World};

const KEYWORD_PREFIX: char = '@';
const LABEL: &str = "label";
const END: &str = "end";
const PHASES: &str = "phases";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Comment,
    Parameters,
    Phase,
    Run,
    Figure,
    Subplot,
    Legend,
    Plot(Quantity),
    Export(Quantity),
}

impl Keyword {
    pub fn parse(word: &str) -> Result<Self> {
        Ok(match word {
            "@comment" => Keyword::Comment,
            "@parameters" => Keyword::Parameters,
            "@phase" => Keyword::Phase,
            "@run" => Keyword::Run,
            "@figure" => Keyword::Figure,
            "@subplot" => Keyword::Subplot,
            "@legend" => Keyword::Legend,
            "@vplot" => Keyword::Plot(Quantity::V),
            "@wplot" => Keyword::Plot(Quantity::W),
            "@pplot" => Keyword::Plot(Quantity::P),
            "@nplot" => Keyword::Plot(Quantity::N),
            "@vexport" => Keyword::Export(Quantity::V),
            "@wexport" => Keyword::Export(Quantity::W),
            "@pexport" => Keyword::Export(Quantity::P),
            "@nexport" => Keyword::Export(Quantity::N),
            other => return Err(Error::UnknownKeyword(other.to_string())),
        })
    }

    pub fn name(self) -> String {
        match self {
            Keyword::Comment => "@comment".into(),
            Keyword::Parameters => "@parameters".into(),
            Keyword::Phase => "@phase".into(),
            Keyword::Run => "@run".into(),
            Keyword::Figure => "@figure".into(),
            Keyword::Subplot => "@subplot".into(),
            Keyword::Legend => "@legend".into(),
            Keyword::Plot(q) => format!("@{}plot", q.name()),
            Keyword::Export(q) => format!("@{}export", q.name()),
        }
    }
}

/// One keyword-delimited block of cleaned script text.
#[derive(Debug, Clone, PartialEq)]
struct Block {
    keyword: Keyword,
    header: Option<String>,
    body: Vec<String>,
}

impl Block {
    fn header_dict(&self) -> Result<Dict> {
        match &self.header {
            None => Ok(Dict::new()),
            Some(h) => parse_dict(h),
        }
    }

    /// Header and body as one argument string.
    fn arguments(&self) -> String {
        self.header
            .iter()
            .chain(self.body.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Drop comments and blank lines, normalise whitespace.
fn clean(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_comment(&line.replace('\t', " ")).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Cut at the first `#` that is not inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '#' => return &line[..i],
                _ => {}
            },
        }
    }
    line
}

fn split_blocks(lines: Vec<String>) -> Result<Vec<Block>> {
    let mut blocks: Vec<Block> = Vec::new();
    for line in lines {
        if line.starts_with(KEYWORD_PREFIX) {
            let (word, rest) = match line.split_once(char::is_whitespace) {
                Some((w, r)) => (w, Some(r.trim().to_string()).filter(|r| !r.is_empty())),
                None => (line.as_str(), None),
            };
            blocks.push(Block {
                keyword: Keyword::parse(word)?,
                header: rest,
                body: Vec::new(),
            });
        } else {
            match blocks.last_mut() {
                Some(block) => block.body.push(line),
                None => {
                    return Err(Error::syntax(format!(
                        "text before the first keyword: '{line}'"
                    )))
                }
            }
        }
    }
    Ok(blocks)
}

/// A plot or export directive, ready for evaluation by the observer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotCommand {
    pub expression: Expression,
    pub eval: EvalOptions,
    /// Presentation properties, passed through untouched.
    pub plot: Dict,
    pub export: bool,
}

/// A post-processing directive.
#[derive(Debug, Clone, PartialEq)]
pub enum PostCommand {
    Figure {
        title: Option<String>,
        props: Dict,
    },
    Subplot {
        spec: (u32, u32, u32),
        props: Dict,
    },
    Legend {
        labels: Option<Vec<String>>,
        props: Dict,
    },
    Plot(PlotCommand),
}

impl PostCommand {
    fn parse(keyword: Keyword, arguments: &str) -> Result<Self> {
        let args = parse_sequence(arguments).map_err(|_| {
            Error::syntax(format!("invalid argument list to {}", keyword.name()))
        })?;
        let kw = keyword.name();
        let dict_arg = |lit: &Literal, what: &str| -> Result<Dict> {
            lit.as_dict()
                .cloned()
                .ok_or_else(|| Error::syntax(format!("{what} to {kw} must be a dict, got {lit}")))
        };

        match keyword {
            Keyword::Figure => {
                let (title, props) = match args.as_slice() {
                    [] => (None, Dict::new()),
                    [Literal::Str(t)] => (Some(t.clone()), Dict::new()),
                    [Literal::Dict(d)] => (None, d.clone()),
                    [Literal::Str(t), props] => (Some(t.clone()), dict_arg(props, "properties")?),
                    [_] | [_, _] => {
                        return Err(Error::syntax(format!(
                            "arguments to {kw} must be a title string and/or a dict"
                        )))
                    }
                    _ => {
                        return Err(Error::syntax(format!(
                            "the number of arguments to {kw} must be <= 2"
                        )))
                    }
                };
                Ok(PostCommand::Figure { title, props })
            }
            Keyword::Subplot => {
                let (spec, props) = match args.as_slice() {
                    [spec] => (spec, Dict::new()),
                    [spec, props] => (spec, dict_arg(props, "second argument")?),
                    _ => {
                        return Err(Error::syntax(format!(
                            "the number of arguments to {kw} must be 1 or 2"
                        )))
                    }
                };
                let spec = subplot_spec(spec).ok_or_else(|| {
                    Error::syntax(format!(
                        "subplot specification to {kw} must be a 3-tuple of positive integers or a three-digit integer without zeros"
                    ))
                })?;
                Ok(PostCommand::Subplot { spec, props })
            }
            Keyword::Legend => {
                let (labels, props) = match args.as_slice() {
                    [] => (None, Dict::new()),
                    [Literal::Dict(d)] => (None, d.clone()),
                    [labels] => (Some(legend_labels(labels, &kw)?), Dict::new()),
                    [labels, props] => (
                        Some(legend_labels(labels, &kw)?),
                        dict_arg(props, "second argument")?,
                    ),
                    _ => {
                        return Err(Error::syntax(format!(
                            "the number of arguments to {kw} must be <= 2"
                        )))
                    }
                };
                Ok(PostCommand::Legend { labels, props })
            }
            Keyword::Plot(q) | Keyword::Export(q) => {
                let export = matches!(keyword, Keyword::Export(_));
                plot_command(q, export, &args, &kw).map(PostCommand::Plot)
            }
            Keyword::Comment | Keyword::Parameters | Keyword::Phase | Keyword::Run => Err(
                Error::syntax(format!("{kw} is not a post-processing directive")),
            ),
        }
    }
}

fn subplot_spec(lit: &Literal) -> Option<(u32, u32, u32)> {
    let positive = |l: &Literal| l.as_int().filter(|&i| i > 0).map(|i| i as u32);
    match lit {
        Literal::Tuple(items) if items.len() == 3 => {
            Some((positive(&items[0])?, positive(&items[1])?, positive(&items[2])?))
        }
        Literal::Int(i) if (111..=999).contains(i) => {
            let digits: Vec<u32> = i.to_string().chars().filter_map(|c| c.to_digit(10)).collect();
            if digits.contains(&0) {
                return None;
            }
            Some((digits[0], digits[1], digits[2]))
        }
        _ => None,
    }
}

fn legend_labels(lit: &Literal, kw: &str) -> Result<Vec<String>> {
    match lit {
        Literal::Str(s) => Ok(vec![s.clone()]),
        Literal::Tuple(_) => lit
            .as_names()
            .map(|names| names.into_iter().map(str::to_string).collect())
            .ok_or_else(|| Error::syntax(format!("legend labels to {kw} must be strings"))),
        other => Err(Error::syntax(format!(
            "legend labels to {kw} must be a tuple or a string, got {other}"
        ))),
    }
}

fn plot_command(q: Quantity, export: bool, args: &[Literal], kw: &str) -> Result<PlotCommand> {
    let dict = |lit: &Literal, what: &str| -> Result<Dict> {
        lit.as_dict()
            .cloned()
            .ok_or_else(|| Error::syntax(format!("{what} to {kw} must be a dict, got {lit}")))
    };
    let max_args = match (q, export) {
        (Quantity::N, false) => 4,
        (Quantity::N, true) => 3,
        (_, false) => 3,
        (_, true) => 2,
    };
    if args.is_empty() || args.len() > max_args {
        return Err(Error::syntax(format!(
            "the number of arguments to {kw} must be between 1 and {max_args}"
        )));
    }

    let (expression, eval, plot) = if q == Quantity::N {
        let has_reference = matches!(
            args.get(1),
            Some(Literal::Str(_) | Literal::Tuple(_) | Literal::List(_))
        );
        if let Some(second) = args.get(1) {
            if !has_reference && second.as_dict().is_none() {
                return Err(Error::syntax(format!("invalid second argument to {kw}")));
            }
        }
        let reference = if has_reference { args.get(1) } else { None };
        let expression = Expression::count(&args[0], reference)?;
        let rest = if has_reference { &args[2..] } else { &args[1..] };
        match (rest, export) {
            ([], _) => (expression, Dict::new(), Dict::new()),
            ([e], _) => (expression, dict(e, "evaluation properties")?, Dict::new()),
            ([e, p], false) => (
                expression,
                dict(e, "evaluation properties")?,
                dict(p, "plot properties")?,
            ),
            _ => return Err(Error::syntax(format!("invalid arguments to {kw}"))),
        }
    } else {
        let expression = Expression::from_literal(q, &args[0])?;
        let eval = args
            .get(1)
            .map(|e| dict(e, "evaluation properties"))
            .transpose()?
            .unwrap_or_default();
        let plot = args
            .get(2)
            .map(|p| dict(p, "plot properties"))
            .transpose()?
            .unwrap_or_default();
        (expression, eval, plot)
    };

    let eval = EvalOptions::from_dict(&eval)?;
    if export && eval.filename.is_none() {
        return Err(Error::syntax(format!("the property 'filename' to {kw} is mandatory")));
    }
    Ok(PlotCommand {
        expression,
        eval,
        plot,
        export,
    })
}

/// A parsed script: configuration plus the runs and directives it declares.
#[derive(Debug, Clone, Default)]
pub struct Script {
    comment: String,
    parameters: Parameters,
    phases: IndexMap<String, PhaseDef>,
    runs: Vec<ScriptRun>,
    post_commands: Vec<PostCommand>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        let mut script = Script::default();
        let mut unnamed_phases = 0;
        let mut unnamed_runs = 0;

        for block in split_blocks(clean(text))? {
            match block.keyword {
                Keyword::Comment => {
                    for line in block.header.iter().chain(&block.body) {
                        if !script.comment.is_empty() {
                            script.comment.push('\n');
                        }
                        script.comment.push_str(line);
                    }
                }
                Keyword::Parameters => {
                    // One or more dicts, on the keyword line and/or below it.
                    for lit in parse_sequence(&block.arguments())? {
                        match lit {
                            Literal::Dict(d) => script.parameters.merge(&d)?,
                            other => {
                                return Err(Error::syntax(format!(
                                    "@parameters must be a dict, got {other}"
                                )))
                            }
                        }
                    }
                }
                Keyword::Phase => {
                    let props = block.header_dict()?;
                    let label = match string_property(&props, LABEL, "@phase")? {
                        Some(l) => l,
                        None => {
                            unnamed_phases += 1;
                            format!("phase{unnamed_phases}")
                        }
                    };
                    let end = string_property(&props, END, "@phase")?
                        .ok_or_else(|| Error::MissingEnd(label.clone()))?;
                    reject_unknown(&props, &[LABEL, END], "@phase")?;

                    let def = script
                        .phases
                        .entry(label.clone())
                        .or_insert_with(|| PhaseDef::new(label, ""));
                    def.end = end;
                    def.rows.extend(block.body);
                }
                Keyword::Run => {
                    let props = block.header_dict()?;
                    reject_unknown(&props, &[LABEL, PHASES], "@run")?;
                    let label = match string_property(&props, LABEL, "@run")? {
                        Some(l) => l,
                        None => {
                            unnamed_runs += 1;
                            format!("run{unnamed_runs}")
                        }
                    };
                    if script.runs.iter().any(|r| r.label() == label) {
                        return Err(Error::DuplicateRunLabel(label));
                    }
                    let run = script.build_run(label, props.get(PHASES))?;
                    script.runs.push(run);
                }
                Keyword::Figure
                | Keyword::Subplot
                | Keyword::Legend
                | Keyword::Plot(_)
                | Keyword::Export(_) => {
                    let command = PostCommand::parse(block.keyword, &block.arguments())?;
                    script.post_commands.push(command);
                }
            }
        }
        debug!(
            "Parsed script: {} phase(s), {} run(s), {} directive(s)",
            script.phases.len(),
            script.runs.len(),
            script.post_commands.len()
        );
        Ok(script)
    }

    /// Build a run against the parameters in effect at this point of the script.
    fn build_run(&self, label: String, phases: Option<&Literal>) -> Result<ScriptRun> {
        let selected: Vec<&str> = match phases {
            None => Vec::new(),
            Some(lit) => lit.as_names().ok_or_else(|| {
                Error::syntax(format!(
                    "'{PHASES}' of @run must be a phase label or a tuple of them, got {lit}"
                ))
            })?,
        };
        let defs: Vec<&PhaseDef> = if selected.is_empty() {
            self.phases.values().collect()
        } else {
            selected
                .iter()
                .map(|p| {
                    self.phases
                        .get(*p)
                        .ok_or_else(|| Error::UnknownPhase(p.to_string()))
                })
                .collect::<Result<_>>()?
        };

        let mechanism = Mechanism::from_parameters(&self.parameters)?;
        let phases = defs
            .into_iter()
            .map(|d| d.compile(mechanism.vocabulary()))
            .collect::<Result<Vec<_>>>()?;
        let world = World::new(phases)?;
        let subjects = self.parameters.subjects()?;
        Ok(ScriptRun::new(label, world, mechanism, subjects))
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn phases(&self) -> impl Iterator<Item = &PhaseDef> {
        self.phases.values()
    }

    pub fn runs(&self) -> &[ScriptRun] {
        &self.runs
    }

    pub fn post_commands(&self) -> &[PostCommand] {
        &self.post_commands
    }

    /// The plot and export directives, in script order.
    pub fn plot_commands(&self) -> impl Iterator<Item = &PlotCommand> {
        self.post_commands.iter().filter_map(|c| match c {
            PostCommand::Plot(p) => Some(p),
            _ => None,
        })
    }

    /// Simulate every run in declaration order.
    pub fn run(&self, options: RunOptions) -> Result<SimulationOutput> {
        let mut rng = options.prng();
        info!("Simulating {} run(s)", self.runs.len());
        let mut out = SimulationOutput::new();
        for run in &self.runs {
            out.insert(run.label(), run.run(&mut rng)?);
        }
        Ok(out)
    }
}

impl FromStr for Script {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Script::parse(s)
    }
}

fn string_property(props: &Dict, key: &str, kw: &str) -> Result<Option<String>> {
    match props.get(key) {
        None => Ok(None),
        Some(Literal::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::syntax(format!(
            "the property '{key}' of {kw} must be a string, got {other}"
        ))),
    }
}

fn reject_unknown(props: &Dict, allowed: &[&str], kw: &str) -> Result<()> {
    for (key, _) in props.iter() {
        if !key.as_str().is_some_and(|k| allowed.contains(&k)) {
            return Err(Error::syntax(format!("unknown property {key} of {kw}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PARAMS: &str = "@parameters {'mechanism': 'ga', 'behaviors': ['R', 'X'], 'stimulus_elements': ['S', 'rew']}";

    #[test]
    fn comments_respect_quotes() {
        assert_eq!(strip_comment("A 'S#1' | A # loop"), "A 'S#1' | A ");
        assert_eq!(strip_comment("# all comment"), "");
        let lines = clean("\t@run  \n\n  # nothing\nfoo\t bar ");
        assert_eq!(lines, vec!["@run", "foo  bar"]);
    }

    #[test]
    fn parameters_merge_header_and_body() {
        let script = Script::parse(
            "@parameters {'beta': 2}
             @parameters
             {'subjects': 4,
              'beta': 3}",
        )
        .unwrap();
        assert_eq!(script.parameters().beta().unwrap(), 3.0);
        assert_eq!(script.parameters().subjects().unwrap(), 4);
    }

    #[test]
    fn phases_are_labelled_and_extended() {
        let script = Script::parse(&format!(
            "{PARAMS}
             @phase {{'end': 'S=2'}}
             A S | A
             @phase {{'label': 'phase1', 'end': 'S=3'}}
             B rew | A
             @phase {{'label': 'test', 'end': 'rew=1'}}
             C rew | C"
        ))
        .unwrap();
        let phases: Vec<&PhaseDef> = script.phases().collect();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].label, "phase1");
        assert_eq!(phases[0].end, "S=3");
        assert_eq!(phases[0].rows, vec!["A S | A", "B rew | A"]);
    }

    #[test]
    fn runs_select_phases_and_get_labels() {
        let script = Script::parse(&format!(
            "{PARAMS}
             @phase {{'label': 'a', 'end': 'S=2'}}
             A S | A
             @phase {{'label': 'b', 'end': 'S=2'}}
             B S | B
             @run
             @run {{'label': 'only_b', 'phases': 'b'}}
             @run {{'phases': ('b', 'a')}}"
        ))
        .unwrap();
        let labels: Vec<&str> = script.runs().iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["run1", "only_b", "run2"]);
        let order: Vec<&str> = script.runs()[2]
            .world()
            .phases()
            .iter()
            .map(|p| p.label())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(script.runs()[1].world().phases().len(), 1);
    }

    #[test]
    fn parse_errors_are_classified() {
        let cases: [(String, ErrorKind); 9] = [
            ("@bogus".into(), ErrorKind::Parse),
            ("stray text\n@run".into(), ErrorKind::Parse),
            ("@parameters {'beta': import}".into(), ErrorKind::Parse),
            (format!("{PARAMS}\n@phase {{'label': 'p'}}\nA S | A"), ErrorKind::Parse),
            (
                format!("{PARAMS}\n@phase {{'end': 'S=1'}}\nA S | A\n@run {{'label': 'x'}}\n@run {{'label': 'x'}}"),
                ErrorKind::Parse,
            ),
            (
                format!("{PARAMS}\n@phase {{'end': 'S=1'}}\nA S | A\n@run {{'phases': 'missing'}}"),
                ErrorKind::Validation,
            ),
            (
                format!("{PARAMS}\n@phase {{'end': 'S=1'}}\nA Q | A\n@run"),
                ErrorKind::Validation,
            ),
            (
                "@phase {'end': 'S=1'}\nA S | A\n@run".into(),
                ErrorKind::Validation,
            ),
            (
                format!("{PARAMS}\n@phase {{'end': 'S=1'}}\nA S | A(0.6),B(0.6)\nB S | A\n@run"),
                ErrorKind::Validation,
            ),
        ];
        for (src, kind) in cases {
            let err = Script::parse(&src).unwrap_err();
            assert_eq!(err.kind(), kind, "{src}: {err}");
        }
        assert_eq!(
            Script::parse(&format!("{PARAMS}\n@phase {{'label': 'p'}}\nA S | A")).unwrap_err(),
            Error::MissingEnd("p".into())
        );
    }

    #[test]
    fn post_commands_are_shape_checked() {
        let ok = [
            "@figure 'Learning curves' {'figsize': (4, 3)}",
            "@figure",
            "@figure {'tight_layout': True, 'facecolor': None}",
            "@subplot 211 {'title': 'v'}",
            "@subplot (2, 1, 2)",
            "@legend ('a', 'b')",
            "@legend {'loc': 'best', 'frameon': False}",
            "@vplot ('S', 'R') {'subject': 'all'} {'color': 'k'}",
            "@wplot 'S'",
            "@pplot ('S', 'R') {'phase': 'train'}",
            "@pplot (('S', 'rew'), 'R')",
            "@nplot ['S', 'R'] 'S' {'cumulative': 'off'} {'linewidth': 2}",
            "@nplot 'R' {'subject': 0} {'linewidth': 2}",
            "@nexport 'R' 'S' {'filename': 'n.csv'}",
            "@vexport ('S', 'R') {'filename': 'v.csv'}",
        ];
        for src in ok {
            assert!(Script::parse(src).is_ok(), "{src}");
        }

        let bad = [
            "@figure 1",
            "@figure 'a' 'b'",
            "@subplot",
            "@subplot 210",
            "@subplot 2111",
            "@subplot (2, 1)",
            "@legend 12",
            "@vplot",
            "@vplot 'S'",
            "@vplot ('S', 'R') 'oops'",
            "@pplot 'S'",
            "@nplot 'R' 12",
            "@nplot 'R' {} {} {}",
            "@nexport 'R'",
            "@vexport ('S', 'R') {'filename': 'v.csv'} {}",
            "@vplot ('S', 'R') {'colour': 'red'}",
        ];
        for src in bad {
            assert_eq!(
                Script::parse(src).unwrap_err().kind(),
                ErrorKind::Parse,
                "{src}"
            );
        }
    }

    #[test]
    fn comment_blocks_accumulate() {
        let script = Script::parse("@comment first line\nsecond line\n@comment third").unwrap();
        assert_eq!(script.comment(), "first line\nsecond line\nthird");
    }
}
