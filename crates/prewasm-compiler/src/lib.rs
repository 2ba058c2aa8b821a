//! prewasm compiler: orchestrates the passes between the parser and the
//! binary encoder.
//!
//! ```text
//! ParsedModule → Semantic Analyzer → Desugarer → DCE → Binary Encoder → bytes
//!                 (names, types,      (lowering)  (prune)  (prewasm-codegen)
//!                  memory layout)
//! ```
//!
//! User mistakes are collected in [`Diagnostics`] and stop the pipeline at
//! the end of the pass that found them. Internal failures abort at once as
//! [`CompileError::Fatal`] or [`CompileError::Codegen`].

pub mod dce;
pub mod desugar;
pub mod error;
pub mod memory;
pub mod scope;
pub mod semantic;

use prewasm_codegen::SourceMap;
use prewasm_types::ast::Module;
use prewasm_types::parsed::ParsedModule;
use prewasm_types::{Diagnostic, Diagnostics};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use dce::eliminate_dead_code;
pub use desugar::desugar;
pub use error::CompileError;
pub use memory::{MemoryLayout, NULL_GUARD};

// ══════════════════════════════════════════════════════════════════════════════
// Options
// ══════════════════════════════════════════════════════════════════════════════

/// Driver-level settings that are not part of the source program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Name used in rendered diagnostics.
    pub filename: String,
    /// Overrides the program's `memory.shared` config key when set.
    pub use_shared_memory: Option<bool>,
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Passes
// ══════════════════════════════════════════════════════════════════════════════

/// Resolve and type-check a parsed module.
pub fn analyze(
    parsed: &ParsedModule,
    options: &CompileOptions,
    diags: &mut Diagnostics,
) -> Result<Module, CompileError> {
    if !options.filename.is_empty() {
        diags.set_filename(options.filename.clone());
    }
    let mut module = semantic::analyze(parsed, diags)?;
    if let Some(shared) = options.use_shared_memory {
        module.config.set_shared_memory(shared);
    }
    check(diags)?;
    Ok(module)
}

/// Rewrite high-level constructs into the encoder's subset.
pub fn lower(module: &mut Module) -> Result<(), CompileError> {
    desugar::desugar(module)?;
    Ok(())
}

/// Drop functions and externs unreachable from the exports.
pub fn prune(module: &mut Module) -> Result<(), CompileError> {
    dce::eliminate_dead_code(module)?;
    Ok(())
}

/// Run every pass and return the module ready for encoding.
pub fn build_module(
    parsed: &ParsedModule,
    options: &CompileOptions,
    diags: &mut Diagnostics,
) -> Result<Module, CompileError> {
    let mut module = analyze(parsed, options, diags)?;
    lower(&mut module)?;
    prune(&mut module)?;
    Ok(module)
}

/// Compile a parsed module to the binary format.
pub fn compile(
    parsed: &ParsedModule,
    options: &CompileOptions,
    diags: &mut Diagnostics,
) -> Result<Vec<u8>, CompileError> {
    compile_with_source_map(parsed, options, diags).map(|(bytes, _)| bytes)
}

pub fn compile_with_source_map(
    parsed: &ParsedModule,
    options: &CompileOptions,
    diags: &mut Diagnostics,
) -> Result<(Vec<u8>, SourceMap), CompileError> {
    let mut module = build_module(parsed, options, diags)?;
    Ok(prewasm_codegen::compile_with_source_map(&mut module)?)
}

fn check(diags: &Diagnostics) -> Result<(), CompileError> {
    match diags.error_count() {
        0 => Ok(()),
        count => Err(CompileError::Diagnostics { count }),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Report
// ══════════════════════════════════════════════════════════════════════════════

/// Everything a tool needs to know about one compilation, as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub binary: Option<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
    /// Internal failure message, when compilation aborted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fatal: Option<String>,
    /// Lowercase hex SHA-256 of `binary`.
    pub binary_sha256: Option<String>,
    pub source_map: Option<SourceMap>,
}

impl CompileResult {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Compile and package the outcome, diagnostics included, for tooling.
pub fn compile_to_result(parsed: &ParsedModule, options: &CompileOptions) -> CompileResult {
    let mut diags = Diagnostics::new();
    let outcome = compile_with_source_map(parsed, options, &mut diags);
    let diagnostics = diags.into_errors();

    match outcome {
        Ok((binary, source_map)) => CompileResult {
            success: true,
            binary_sha256: Some(format!("{:x}", Sha256::digest(&binary))),
            binary: Some(binary),
            diagnostics,
            fatal: None,
            source_map: Some(source_map),
        },
        Err(err) => CompileResult {
            success: false,
            binary: None,
            diagnostics,
            fatal: err.is_fatal().then(|| err.to_string()),
            binary_sha256: None,
            source_map: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json_defaults() {
        let options = CompileOptions::from_json("{}").unwrap();
        assert_eq!(options, CompileOptions::default());

        let options =
            CompileOptions::from_json(r#"{"filename":"a.wasm","use_shared_memory":true}"#).unwrap();
        assert_eq!(options.filename, "a.wasm");
        assert_eq!(options.use_shared_memory, Some(true));
    }

    #[test]
    fn test_check_reports_count() {
        let mut diags = Diagnostics::with_sink(|_: &str| {});
        assert!(check(&diags).is_ok());
        diags.error(prewasm_types::DiagnosticKind::Arity, "x", None);
        diags.error(prewasm_types::DiagnosticKind::Arity, "y", None);
        assert_eq!(check(&diags), Err(CompileError::Diagnostics { count: 2 }));
    }
}
