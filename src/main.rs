use std::{
    fs,
    io::{self, BufRead, Write},
};

use anyhow::{bail, Context};
use clap::{crate_version, App, Arg};
use kaleidoscope::driver::{needs_more_input, Driver, Mode};

fn main() -> anyhow::Result<()> {
    let matches = App::new("kaleido")
        .version(crate_version!())
        .about("parse and evaluate kaleidoscope-style programs")
        .arg(
            Arg::with_name("FILE")
                .help(
                    "source file to run, starts a REPL when omitted; the REPL keeps \
                     reading lines until a unit is complete, a blank line submits early",
                )
                .index(1),
        )
        .arg(
            Arg::with_name("expr")
                .short("e")
                .long("expr")
                .value_name("SOURCE")
                .help("source text to run instead of a file")
                .takes_value(true)
                .conflicts_with("FILE"),
        )
        .arg(
            Arg::with_name("ast")
                .long("ast")
                .help("print the structured description of each unit instead of evaluating"),
        )
        .arg(
            Arg::with_name("tokens")
                .long("tokens")
                .help("print the token stream instead of parsing")
                .conflicts_with("ast"),
        )
        .get_matches();

    let mode = if matches.is_present("tokens") {
        Mode::Tokens
    } else if matches.is_present("ast") {
        Mode::Ast
    } else {
        Mode::Eval
    };

    let (source, origin) = if let Some(source) = matches.value_of("expr") {
        (source.to_string(), "<expr>".to_string())
    } else if let Some(path) = matches.value_of("FILE") {
        let source =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        (source, path.to_string())
    } else {
        return repl(mode);
    };

    let stdout = io::stdout();
    let mut driver = Driver::new(mode, stdout.lock());
    let report = driver.run(&source)?;
    if report.errors > 0 {
        bail!("{} error(s) in {}", report.errors, origin);
    }

    Ok(())
}

fn repl(mode: Mode) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut driver = Driver::new(mode, stdout.lock());
    let mut pending = String::new();

    loop {
        eprint!("{}", if pending.is_empty() { "ready> " } else { "  ...> " });
        io::stderr().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            eprintln!();
            if !pending.trim().is_empty() {
                driver.run(&pending)?;
            }
            return Ok(());
        }

        // a blank line submits whatever has been typed so far
        let blank = line.trim().is_empty();
        pending.push_str(&line);
        if blank || !needs_more_input(&pending) {
            driver.run(&pending)?;
            pending.clear();
        }
    }
}
