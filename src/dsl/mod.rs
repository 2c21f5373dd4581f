#[allow(clippy::module_name_repetitions)]
pub mod ast;
#[allow(clippy::indexing_slicing, clippy::module_name_repetitions)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
)]
pub mod lexer;
#[allow(clippy::single_match_else, clippy::needless_pass_by_value)]
pub mod parser;
pub mod classify;
#[allow(clippy::indexing_slicing)]
pub mod scope;
#[allow(clippy::indexing_slicing)]
pub mod asm;
#[allow(clippy::single_match_else, clippy::needless_pass_by_value)]
pub mod compiler;

use ast::ParseNode;
use compiler::{Executable, Module};
use error::CompileError;
use parser::FirstErrorListener;

use crate::settings::CompilerSettings;

/// Parse `source` into a tree, turning the first syntax error into a
/// formatted [`CompileError`].
pub fn parse_tree(source: &str, origin: &str) -> Result<ParseNode, CompileError> {
    let mut listener = FirstErrorListener::default();
    let tree = parser::parse_with_listener(source, &mut listener);
    match (tree, listener.error) {
        (Some(tree), None) => Ok(tree),
        (_, Some(error)) => Err(CompileError::syntax(&error, source, origin)),
        (None, None) => Err(CompileError::new(
            error::ErrorKind::Internal,
            "Parser produced no tree",
            1,
            0,
            source,
            origin,
        )),
    }
}

/// Compile a source unit into a [`Module`].
///
/// source → lex → parse → tree walk → `Module`
pub fn compile_module(source: &str, origin: &str) -> Result<Module, CompileError> {
    let tree = parse_tree(source, origin)?;
    compiler::generate(&tree, source, origin)
}

/// Compile a source unit straight to serialized assembly text.
pub fn compile_executable(
    source: &str,
    origin: &str,
    settings: &CompilerSettings,
) -> Result<Executable, CompileError> {
    let module = compile_module(source, origin)?;
    Ok(Executable {
        origin: origin.to_string(),
        text: module.to_text(settings.debug_info),
    })
}
