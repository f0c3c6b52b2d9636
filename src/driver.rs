use std::io::{self, Write};

use crate::{
    ast::{ASTNode, Describe},
    eval::Evaluator,
    lexer::tokenize,
    parser::Parser,
};

/// What the driver does with each top-level unit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Mode {
    /// print every token with its position
    Tokens,
    /// print the structured description of every unit
    Ast,
    /// evaluate units, printing the value of top-level expressions
    Eval,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Report {
    /// top-level units parsed, zero in token mode
    pub units: usize,
    /// tokens printed, only counted in token mode
    pub tokens: usize,
    pub errors: usize,
}

/// Whether `source` stops partway through a top-level unit, so that more
/// input could still complete it. Used by the REPL to keep reading lines
/// until a unit such as `def f(x)` followed by `x+1` is whole.
pub fn needs_more_input(source: &str) -> bool {
    match Parser::from_source(source).parse_program() {
        Err(e) => e.at_end_of_input(),
        Ok(_) => false,
    }
}

/// Repeatedly parses one top-level unit and hands it to the consumer picked
/// by `mode`. Errors are written out and parsing resumes after the next `;`.
/// The evaluator persists across calls to `run`, so a REPL can feed it one
/// line at a time.
pub struct Driver<W: Write> {
    mode: Mode,
    evaluator: Evaluator,
    out: W,
}

impl<W: Write> Driver<W> {
    pub fn new(mode: Mode, out: W) -> Self {
        Self {
            mode,
            evaluator: Evaluator::new(),
            out,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn run(&mut self, source: &str) -> io::Result<Report> {
        if self.mode == Mode::Tokens {
            let tokens = tokenize(source);
            for (token, position) in &tokens {
                writeln!(self.out, "{} {}", position, token)?;
            }
            return Ok(Report {
                tokens: tokens.len(),
                ..Report::default()
            });
        }

        let mut report = Report::default();
        let mut parser = Parser::from_source(source);
        loop {
            let node = match parser.parse_top_level() {
                Ok(Some(node)) => node,
                Ok(None) => break,
                Err(e) => {
                    report.errors += 1;
                    writeln!(self.out, "error: {}", e)?;
                    parser.synchronize();
                    continue;
                }
            };
            report.units += 1;
            if let Err(e) = self.handle(node) {
                report.errors += 1;
                writeln!(self.out, "error: {}", e)?;
            }
        }
        Ok(report)
    }

    fn handle(&mut self, node: ASTNode) -> anyhow::Result<()> {
        if self.mode == Mode::Ast {
            writeln!(self.out, "{}", node.describe())?;
            return Ok(());
        }

        let summary = match &node {
            ASTNode::Extern(proto) => format!("declared extern {}", proto),
            ASTNode::Function(function) if !function.prototype.is_anonymous() => {
                format!("defined {}", function.prototype)
            }
            ASTNode::Function(_) => String::new(),
        };

        match self.evaluator.run(node)? {
            Some(value) => writeln!(self.out, "=> {}", value)?,
            None => writeln!(self.out, "{}", summary)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drive(mode: Mode, source: &str) -> (Report, String) {
        let mut driver = Driver::new(mode, Vec::new());
        let report = driver.run(source).unwrap();
        let output = String::from_utf8(driver.into_output()).unwrap();
        (report, output)
    }

    #[test]
    fn eval_mode() {
        let (report, output) = drive(
            Mode::Eval,
            "extern sqrt(x);\ndef hyp(a b) sqrt(a*a + b*b);\nhyp(3, 4);\n",
        );
        assert_eq!(report, Report { units: 3, tokens: 0, errors: 0 });
        assert_eq!(output, "declared extern sqrt(x)\ndefined hyp(a b)\n=> 5\n");
    }

    #[test]
    fn errors_resynchronize() {
        let (report, output) = drive(Mode::Eval, "def f( x; 1 + ; y; 2*3");
        assert_eq!(report, Report { units: 2, tokens: 0, errors: 3 });
        assert_eq!(
            output,
            "error: 1:9: expected ')' in prototype, found ';'\n\
             error: 1:15: expected an expression, found ';'\n\
             error: unknown variable referenced y\n\
             => 6\n"
        );
    }

    #[test]
    fn state_persists_between_runs() {
        let mut driver = Driver::new(Mode::Eval, Vec::new());
        driver.run("def inc(x) x + 1").unwrap();
        let report = driver.run("inc(inc(1))").unwrap();
        assert_eq!(report.errors, 0);
        let output = String::from_utf8(driver.into_output()).unwrap();
        assert_eq!(output, "defined inc(x)\n=> 3\n");
    }

    #[test]
    fn ast_mode() {
        let (report, output) = drive(Mode::Ast, "a+b*c; extern f()");
        assert_eq!(report.units, 2);
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["type"], "function");
        assert_eq!(lines[0]["prototype"]["name"], "");
        assert_eq!(lines[0]["body"]["op"], "+");
        assert_eq!(lines[0]["body"]["rhs"]["op"], "*");
        assert_eq!(lines[1]["type"], "extern");
    }

    #[test]
    fn token_mode() {
        let (report, output) = drive(Mode::Tokens, "def f(x)\n  x # done");
        assert_eq!(report, Report { units: 0, tokens: 6, errors: 0 });
        assert_eq!(
            output,
            "1:1 'def'\n1:5 identifier `f`\n1:6 '('\n1:7 identifier `x`\n1:8 ')'\n2:3 identifier `x`\n"
        );
    }

    #[test]
    fn incomplete_units_wait_for_more_input() {
        assert!(needs_more_input("def f(x)\n"));
        assert!(needs_more_input("def f(x\n"));
        assert!(needs_more_input("extern sin"));
        assert!(needs_more_input("1 +\n"));
        assert!(needs_more_input("foo(1,\n"));
        assert!(!needs_more_input("def f(x)\nx+1\n"));
        assert!(!needs_more_input("1 + 2\n"));
        assert!(!needs_more_input("# just a comment\n"));
        assert!(!needs_more_input("\n"));
        assert!(!needs_more_input("def f(x, y) x\n"));
        assert!(!needs_more_input("1 + ; def g("));
    }

    #[test]
    fn unit_split_across_lines() {
        let mut driver = Driver::new(Mode::Eval, Vec::new());
        let mut pending = String::new();
        let mut reports = Vec::new();
        for line in &["def f(x)\n", "  x+1\n", "f(\n", "41)\n"] {
            pending.push_str(line);
            if !needs_more_input(&pending) {
                reports.push(driver.run(&pending).unwrap());
                pending.clear();
            }
        }
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.errors == 0));
        let output = String::from_utf8(driver.into_output()).unwrap();
        assert_eq!(output, "defined f(x)\n=> 42\n");
    }

    #[test]
    fn only_comments() {
        let (report, output) = drive(Mode::Eval, "# nothing\n   \n");
        assert_eq!(report, Report::default());
        assert_eq!(output, "");
    }
}
