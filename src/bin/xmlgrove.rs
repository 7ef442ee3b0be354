//! Command shell over an xmlgrove session.
//!
//! Reads operations one per line as `name<TAB>arg<TAB>arg...`, runs them
//! against a single session and prints each result. Arguments may use `\t`,
//! `\n` and `\\` escapes, and an argument of the form `$N` is replaced by
//! the result of the N-th operation run so far (preloaded files count).

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use xmlgrove::command::{AllowAll, DenyAll, Session};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// xmlgrove -- run document-tree operations from scripts or the command line.
#[derive(Parser, Debug)]
#[command(name = "xmlgrove", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Script files to run in order (use `-` for stdin). Stdin is read when
    /// neither scripts nor `-e` are given.
    scripts: Vec<String>,

    /// Run one operation line before any script.
    #[arg(short = 'e', long = "exec", value_name = "LINE")]
    exec: Vec<String>,

    /// Load an XML file into the session before anything else runs.
    #[arg(long, value_name = "FILE")]
    load: Vec<String>,

    /// Parse loaded files tolerantly.
    #[arg(long)]
    tolerant: bool,

    /// Keep `xmlns` attributes as plain attributes in loaded files.
    #[arg(long = "no-namespaces")]
    no_namespaces: bool,

    /// Refuse every file read requested by a script.
    #[arg(long = "deny-files")]
    deny_files: bool,

    /// Stop at the first failing operation.
    #[arg(long = "fail-fast")]
    fail_fast: bool,

    /// Print parse diagnostics and the operation behind each error.
    #[arg(long)]
    verbose: bool,

    /// Print how long each operation took.
    #[arg(long)]
    timing: bool,
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

const EXIT_SUCCESS: u8 = 0;
const EXIT_OPERATION_ERROR: u8 = 1;
const EXIT_INPUT_ERROR: u8 = 2;

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let session = if cli.deny_files {
        Session::new().with_policy(DenyAll)
    } else {
        Session::new().with_policy(AllowAll)
    };
    let mut shell = Shell {
        cli: &cli,
        session,
        results: Vec::new(),
        exit: EXIT_SUCCESS,
        out: io::stdout().lock(),
    };

    for file in &cli.load {
        if !shell.load(file) && cli.fail_fast {
            return ExitCode::from(shell.exit);
        }
    }

    let mut sources: Vec<(String, String)> = cli
        .exec
        .iter()
        .enumerate()
        .map(|(i, line)| (format!("-e #{}", i + 1), line.clone()))
        .collect();
    let scripts: Vec<&str> = if cli.scripts.is_empty() && cli.exec.is_empty() {
        vec!["-"]
    } else {
        cli.scripts.iter().map(String::as_str).collect()
    };
    for script in scripts {
        match read_script(script) {
            Ok(text) => sources.push((script.to_string(), text)),
            Err(e) => {
                eprintln!("{script}: failed to read: {e}");
                return ExitCode::from(EXIT_INPUT_ERROR);
            }
        }
    }

    for (origin, text) in &sources {
        if !shell.run_script(origin, text) {
            break;
        }
    }
    ExitCode::from(shell.exit)
}

/// Reads a script from a file or stdin (when the name is `-`).
fn read_script(name: &str) -> io::Result<String> {
    if name == "-" {
        io::stdin().lock().lines().collect::<io::Result<Vec<_>>>().map(|lines| lines.join("\n"))
    } else {
        fs::read_to_string(name)
    }
}

// ---------------------------------------------------------------------------
// Script execution
// ---------------------------------------------------------------------------

struct Shell<'a, W: Write> {
    cli: &'a Cli,
    session: Session,
    results: Vec<String>,
    exit: u8,
    out: W,
}

impl<W: Write> Shell<'_, W> {
    /// Loads one file through `createDocumentFromFile`. Returns `false` if
    /// it failed.
    fn load(&mut self, file: &str) -> bool {
        let tolerant = bool_word(self.cli.tolerant);
        let namespaces = bool_word(!self.cli.no_namespaces);
        let args = [file, tolerant, "true", "false", namespaces];
        let ok = self.run_operation(file, "createDocumentFromFile", &args);
        if ok && self.cli.verbose {
            self.report_diagnostics(file);
        }
        ok
    }

    /// Runs every line of a script. Returns `false` once execution should
    /// stop.
    fn run_script(&mut self, origin: &str, text: &str) -> bool {
        for (number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').map(unescape);
            let name = fields.next().unwrap_or_default();
            let args: Vec<String> = fields.map(|arg| self.substitute(arg)).collect();
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let place = format!("{origin}:{}", number + 1);
            if !self.run_operation(&place, name.trim(), &args) && self.cli.fail_fast {
                return false;
            }
        }
        true
    }

    /// Runs one operation, prints its result and records it for `$N`.
    fn run_operation(&mut self, place: &str, name: &str, args: &[&str]) -> bool {
        let started = Instant::now();
        let outcome = self.session.execute(name, args);
        if self.cli.timing {
            eprintln!("{place}: {name} took {:?}", started.elapsed());
        }
        match outcome {
            Ok(result) => {
                let _ = writeln!(self.out, "{result}");
                self.results.push(result);
                true
            }
            Err(err) => {
                if self.cli.verbose {
                    eprintln!("{place}: {name} failed");
                }
                eprintln!("{err}");
                self.results.push(err.to_string());
                self.exit = EXIT_OPERATION_ERROR;
                false
            }
        }
    }

    /// Prints what tolerant parsing recovered from in the newest document.
    fn report_diagnostics(&self, file: &str) {
        let registry = self.session.registry();
        let Some(doc) = registry.ids().last().and_then(|id| registry.find(id)) else {
            return;
        };
        for diag in &doc.diagnostics {
            eprintln!("{}: {diag}", Path::new(file).display());
        }
    }

    /// Replaces `$N` with the N-th recorded result.
    fn substitute(&self, arg: String) -> String {
        arg.strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.results.get(i).cloned())
            .unwrap_or(arg)
    }
}

fn bool_word(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Expands `\t`, `\n`, `\r` and `\\`; other backslashes stay as written.
fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
