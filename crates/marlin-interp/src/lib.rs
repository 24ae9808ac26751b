//! The Marlin interpreter core.
//!
//! The embedder drives everything through two entry points:
//! [`initial_state`] builds the primordial environment, and [`interpret`]
//! runs one source chunk against a state, returning the updated state or
//! a diagnostic. States are immutable from the caller's point of view:
//! a successful chunk returns a fresh child frame, any failure returns
//! the input state untouched.

pub mod basis;
pub mod elab;
pub mod eval;
pub mod state;
pub mod types;
pub mod value;

pub use basis::{initial_state, register_function, register_print};
pub use elab::{ElabError, ElabErrorKind, Warning};
pub use eval::{EvalError, Halt};
pub use state::{IdStatus, Rebind, State};
pub use types::{Scheme, Ty, TypeDef};
pub use value::Value;

use marlin_ast::lower;
use marlin_lexer::{LexErrorKind, LexerOptions};
use marlin_parser::{ParseErrorKind, ParserOptions};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    pub allow_successor_ml: bool,
    pub allow_vector: bool,
    pub disable_elaboration: bool,
    pub disable_evaluation: bool,
    /// When off, rebinding a protected builtin is a warning instead of an
    /// error.
    pub strict_mode: bool,
    pub allow_unicode: bool,
    pub allow_unicode_type_variables: bool,
    /// Abort evaluation after this many visited nodes.
    pub step_limit: Option<u64>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            allow_successor_ml: false,
            allow_vector: false,
            disable_elaboration: false,
            disable_evaluation: false,
            strict_mode: true,
            allow_unicode: false,
            allow_unicode_type_variables: false,
            step_limit: None,
        }
    }
}

/// Everything that can abort a chunk. Runtime SML exceptions are not
/// errors; they are reported through [`InterpretResult::uncaught`].
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("syntax error at {position}: {message}")]
    Lexer { message: String, position: u32 },
    /// Input ended mid-token; the host may append more input and retry.
    #[error("incomplete input at {position}: {message}")]
    Incomplete { message: String, position: u32 },
    #[error("parse error at {position}: {message}")]
    Parser { message: String, position: u32 },
    #[error("type error at {position}: {message}")]
    Elaboration {
        kind: ElabErrorKind,
        message: String,
        position: u32,
    },
    #[error("evaluation error at {position}: {message}")]
    Evaluation { message: String, position: u32 },
    #[error("disabled feature at {position}: {message}")]
    FeatureDisabled { message: String, position: u32 },
    #[error("internal interpreter error: {message}")]
    Internal { message: String },
}

impl InterpreterError {
    /// Byte offset of the diagnostic, when it has one.
    pub fn position(&self) -> Option<u32> {
        match self {
            InterpreterError::Lexer { position, .. }
            | InterpreterError::Incomplete { position, .. }
            | InterpreterError::Parser { position, .. }
            | InterpreterError::Elaboration { position, .. }
            | InterpreterError::Evaluation { position, .. }
            | InterpreterError::FeatureDisabled { position, .. } => Some(*position),
            InterpreterError::Internal { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct InterpretResult {
    /// The state after the chunk: a fresh child frame on success, the
    /// input state on any failure.
    pub state: Rc<State>,
    /// True when an SML exception escaped to the top level.
    pub evaluation_errored: bool,
    /// The escaped exception value, if any.
    pub uncaught: Option<Value>,
    pub error: Option<InterpreterError>,
    pub warnings: Vec<Warning>,
}

impl InterpretResult {
    fn failure(state: Rc<State>, error: InterpreterError) -> Self {
        Self {
            state,
            evaluation_errored: false,
            uncaught: None,
            error: Some(error),
            warnings: Vec::new(),
        }
    }
}

/// Lex, parse, elaborate, and evaluate one source chunk.
///
/// Declarations take effect in source order inside the chunk, but the
/// chunk is atomic from the outside: any error returns the input state.
pub fn interpret(
    source: &str,
    state: &Rc<State>,
    options: &InterpreterOptions,
) -> InterpretResult {
    let lexer_options = LexerOptions {
        allow_unicode: options.allow_unicode,
        allow_unicode_type_variables: options.allow_unicode_type_variables,
        allow_successor_ml: options.allow_successor_ml,
    };
    let tokens = match marlin_lexer::lex(source, &lexer_options) {
        Ok(tokens) => tokens,
        Err(err) => {
            let position = err.span.start;
            let error = match err.kind {
                LexErrorKind::Incomplete => InterpreterError::Incomplete {
                    message: err.message,
                    position,
                },
                LexErrorKind::Malformed => InterpreterError::Lexer {
                    message: err.message,
                    position,
                },
            };
            return InterpretResult::failure(state.clone(), error);
        }
    };

    let parser_options = ParserOptions {
        allow_vector: options.allow_vector,
    };
    let fixity = state.fixity_snapshot();
    let parsed = match marlin_parser::parse(&tokens, &fixity, &parser_options) {
        Ok(parsed) => parsed,
        Err(err) => {
            let position = err.span.start;
            let error = match err.kind {
                ParseErrorKind::FeatureDisabled => InterpreterError::FeatureDisabled {
                    message: err.message,
                    position,
                },
                ParseErrorKind::Syntax => InterpreterError::Parser {
                    message: err.message,
                    position,
                },
            };
            return InterpretResult::failure(state.clone(), error);
        }
    };

    let core: Vec<_> = parsed
        .decs
        .iter()
        .map(|&dec| lower::lower_dec(&parsed.tree, dec))
        .collect();

    let chunk = state.child();
    let mut warnings = Vec::new();
    let mut evaluator = eval::Evaluator::new(options.step_limit, options.strict_mode);
    // One elaborator per chunk: weak type variables from earlier
    // declarations stay resolvable by later ones.
    let mut elaborator = if options.disable_elaboration {
        None
    } else {
        Some(elab::Elaborator::new(&chunk))
    };

    for dec in &core {
        if options.strict_mode && !options.disable_evaluation {
            if let Err(Halt::Error(err)) = evaluator.pre_check_rebinds(&chunk, dec) {
                let position = if err.span.is_synthetic() {
                    0
                } else {
                    err.span.start
                };
                return InterpretResult::failure(
                    state.clone(),
                    InterpreterError::Evaluation {
                        message: err.message,
                        position,
                    },
                );
            }
        }
        if let Some(elaborator) = elaborator.as_mut() {
            match elaborator.elaborate(dec) {
                Ok(()) => warnings.append(&mut elaborator.take_warnings()),
                Err(err) => {
                    let position = if err.span.is_synthetic() {
                        0
                    } else {
                        err.span.start
                    };
                    return InterpretResult::failure(
                        state.clone(),
                        InterpreterError::Elaboration {
                            kind: err.kind,
                            message: err.message,
                            position,
                        },
                    );
                }
            }
        }
        if !options.disable_evaluation {
            match evaluator.dec(&chunk, dec) {
                Ok(()) => {}
                Err(Halt::Raised { exn, .. }) => {
                    warnings.append(&mut evaluator.warnings);
                    return InterpretResult {
                        state: state.clone(),
                        evaluation_errored: true,
                        uncaught: Some(exn),
                        error: None,
                        warnings,
                    };
                }
                Err(Halt::Error(err)) => {
                    let position = if err.span.is_synthetic() {
                        0
                    } else {
                        err.span.start
                    };
                    let error = if err.message.starts_with("internal") {
                        InterpreterError::Internal {
                            message: err.message,
                        }
                    } else {
                        InterpreterError::Evaluation {
                            message: err.message,
                            position,
                        }
                    };
                    return InterpretResult::failure(state.clone(), error);
                }
            }
        }
    }
    warnings.append(&mut evaluator.warnings);

    InterpretResult {
        state: chunk,
        evaluation_errored: false,
        uncaught: None,
        error: None,
        warnings,
    }
}

#[cfg(test)]
mod tests;
