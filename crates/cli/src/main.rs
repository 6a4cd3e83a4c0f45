mod logging;

use argh::FromArgs;
use log::LevelFilter;
use peg_machine::{seq, Pattern};

const DEFAULT_INPUTS: [&str; 4] = ["x", "(x)", "a(b(c)d(e)f)g", ")"];

/// Match inputs against a balanced parentheses grammar
#[derive(FromArgs)]
struct Cli {
    /// turn debugging information on
    #[argh(switch, short = 'd')]
    debug: bool,

    /// log every executed instruction
    #[argh(switch, short = 't')]
    trace: bool,

    /// print the compiled program before matching
    #[argh(switch, short = 'l')]
    listing: bool,

    /// inputs to match, a few samples are used if none are given
    #[argh(positional)]
    inputs: Vec<String>,
}

/// S <- A
/// A <- [^()]* (B [^()]*)*
/// B <- "(" A ")"
///
/// Every A is captured as text and S collects them into a list.
fn parens() -> Pattern {
    let text = Pattern::not_set("()").star();
    Pattern::grammar(
        "S",
        [
            ("S", Pattern::reference("A").capture_list()),
            (
                "A",
                seq![&text, seq![Pattern::reference("B"), &text].star()].capture_simple(),
            ),
            ("B", seq!["(", Pattern::reference("A"), ")"]),
        ],
    )
}

fn main() -> anyhow::Result<()> {
    let cli: Cli = argh::from_env();
    let level = if cli.trace {
        LevelFilter::Trace
    } else if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::setup(level)?;

    let pattern = parens();
    if cli.listing {
        println!("{pattern}");
    }

    let inputs = if cli.inputs.is_empty() {
        DEFAULT_INPUTS.iter().map(|s| s.to_string()).collect()
    } else {
        cli.inputs
    };

    for input in &inputs {
        println!("Input: {input:?}");
        match pattern.matches(input) {
            Ok(m) => {
                match &m.value {
                    Some(value) => println!("Value: {value}"),
                    None => println!("Value: none"),
                }
                println!("End: {}", m.end);
                if !m.consumed_all(input.len()) {
                    println!("Failed to match whole input");
                }
            }
            Err(e) => println!("Error: {e}, furthest position {}", e.furthest),
        }
        println!();
    }

    Ok(())
}
