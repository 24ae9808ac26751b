use clap::{Args, Parser, Subcommand};
use marlin_interp::{initial_state, interpret, register_print, InterpreterOptions};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "marlin", about = "An interpreter for a Standard ML dialect")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct Flags {
    /// Allow `_` digit separators in numeric literals
    #[arg(long = "successor-ml")]
    successor_ml: bool,
    /// Allow `#[...]` vector literals
    #[arg(long = "vectors")]
    vectors: bool,
    /// Allow non-ASCII string and character content
    #[arg(long = "unicode")]
    unicode: bool,
    /// Downgrade rebind-protection violations to warnings
    #[arg(long = "lax")]
    lax: bool,
    /// Abort evaluation after this many visited nodes
    #[arg(long = "step-limit")]
    step_limit: Option<u64>,
}

impl Flags {
    fn options(&self) -> InterpreterOptions {
        InterpreterOptions {
            allow_successor_ml: self.successor_ml,
            allow_vector: self.vectors,
            allow_unicode: self.unicode,
            allow_unicode_type_variables: self.unicode,
            strict_mode: !self.lax,
            step_limit: self.step_limit,
            ..InterpreterOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Parse a file and dump its declarations
    Parse {
        file: PathBuf,
        #[command(flatten)]
        flags: Flags,
    },
    /// Lex, parse, and type-check a file without running it
    Check {
        file: PathBuf,
        #[command(flatten)]
        flags: Flags,
    },
    /// Interpret a file and report its new bindings
    Run {
        file: PathBuf,
        #[command(flatten)]
        flags: Flags,
    },
}

fn read_file(file: &Path) -> String {
    match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: could not read {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

/// Translates a byte offset into 1-based line and column numbers.
fn line_col(source: &str, offset: u32) -> (usize, usize) {
    let offset = (offset as usize).min(source.len());
    let mut line = 1;
    let mut col = 1;
    for c in source[..offset].chars() {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn report_error(
    file: &Path,
    source: &str,
    error: &marlin_interp::InterpreterError,
) -> ! {
    match error.position() {
        Some(offset) => {
            let (line, col) = line_col(source, offset);
            eprintln!("{}:{}:{}: {}", file.display(), line, col, error);
        }
        None => eprintln!("{}: {}", file.display(), error),
    }
    std::process::exit(1);
}

fn report_warnings(file: &Path, source: &str, warnings: &[marlin_interp::Warning]) {
    for warning in warnings {
        if warning.span.is_synthetic() {
            eprintln!("{}: warning: {}", file.display(), warning.message);
        } else {
            let (line, col) = line_col(source, warning.span.start);
            eprintln!(
                "{}:{}:{}: warning: {}",
                file.display(),
                line,
                col,
                warning.message
            );
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Parse { file, flags } => {
            let source = read_file(&file);
            let options = flags.options();
            let state = initial_state(&options);

            let lexer_options = marlin_lexer::LexerOptions {
                allow_unicode: options.allow_unicode,
                allow_unicode_type_variables: options.allow_unicode_type_variables,
                allow_successor_ml: options.allow_successor_ml,
            };
            let tokens = match marlin_lexer::lex(&source, &lexer_options) {
                Ok(tokens) => tokens,
                Err(e) => {
                    let (line, col) = line_col(&source, e.span.start);
                    eprintln!("{}:{}:{}: {}", file.display(), line, col, e.message);
                    std::process::exit(1);
                }
            };
            let parsed = match marlin_parser::parse(
                &tokens,
                &state.fixity_snapshot(),
                &marlin_parser::ParserOptions {
                    allow_vector: options.allow_vector,
                },
            ) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let (line, col) = line_col(&source, e.span.start);
                    eprintln!("{}:{}:{}: {}", file.display(), line, col, e.message);
                    std::process::exit(1);
                }
            };
            for dec in &parsed.decs {
                println!("{:#?}", parsed.tree.decs[*dec]);
            }
        }
        Command::Check { file, flags } => {
            let source = read_file(&file);
            let mut options = flags.options();
            options.disable_evaluation = true;
            let state = initial_state(&options);

            let result = interpret(&source, &state, &options);
            report_warnings(&file, &source, &result.warnings);
            if let Some(error) = &result.error {
                report_error(&file, &source, error);
            }
            println!("OK");
            print!("{}", result.state.bindings_since(state.id));
        }
        Command::Run { file, flags } => {
            let source = read_file(&file);
            let options = flags.options();
            let state = initial_state(&options);
            register_print(
                &state,
                Rc::new(|text: &str| {
                    print!("{}", text);
                }),
            );

            let result = interpret(&source, &state, &options);
            report_warnings(&file, &source, &result.warnings);
            if let Some(error) = &result.error {
                report_error(&file, &source, error);
            }
            if let Some(exn) = &result.uncaught {
                eprintln!("{}: uncaught exception {}", file.display(), exn);
                std::process::exit(1);
            }
            print!("{}", result.state.bindings_since(state.id));
        }
    }
}
