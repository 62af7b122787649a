//! Compile driver.
//!
//! Runs one compilation unit through the whole pipeline: scanning,
//! preprocessing, tree building, classification, the passes of the
//! configuration and emission.

use crate::analysis::classify;
use crate::analysis::KernelInfoMap;
use crate::config::CompilerConfig;
use crate::convert::Unit;
use crate::emit::emit;
use crate::error::CompileError;
use crate::frontend::group;
use crate::frontend::parse;
use crate::frontend::MacroDef;
use crate::frontend::MacroTable;
use crate::frontend::Preprocessor;
use crate::frontend::Scanner;
use crate::ir::StatementTree;
use crate::transform;
use crate::DefaultTransformDispatch;
use anyhow::Context;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Output of one compilation unit.
#[derive(Clone, Debug)]
pub struct CompiledUnit {
    /// Device source for the backend compiler.
    pub source: String,
    pub defines: Vec<(String, String)>,
    pub kernels: KernelInfoMap,
    /// Host source of split-kernel launchers, if any kernel was split.
    pub launcher: Option<String>,
    /// Native compiler and flags, passed through from the configuration.
    pub compiler: Option<String>,
    pub compiler_flags: Option<String>,
}

/// Compiles units with one configuration.
///
/// The builtin macros are set up once; every unit starts from a copy of
/// them, so units never share mutable state.
pub struct Compiler {
    config: Arc<CompilerConfig>,
    macros: MacroTable,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        let mut macros = MacroTable::with_builtins(config.backend)?;
        for (name, value) in &config.defines {
            macros.define(MacroDef::object(name, value)?);
        }
        Ok(Compiler {
            config: Arc::new(config),
            macros,
        })
    }
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }
    /// Scan, preprocess and parse `src` into a statement tree.
    pub fn parse(&self, src: &str, dir: Option<&Path>) -> Result<StatementTree> {
        let rules = self.config.dialect.rules();
        let tokens = rules.scan(src)?;
        let mut preprocessor = Preprocessor::new(self.macros.clone(), rules, &self.config.include_dirs);
        let tokens = preprocessor.run(tokens, dir)?;
        let nodes = group(tokens)?;
        parse(nodes, self.config.tables.as_ref())
    }
    /// Parse and classify `src`.
    pub fn analyze(&self, src: &str, dir: Option<&Path>) -> Result<(StatementTree, KernelInfoMap)> {
        let mut tree = self.parse(src, dir)?;
        let kernels = classify(&mut tree, self.config.tables.as_ref())?;
        Ok((tree, kernels))
    }
    /// Run the configured passes over a classified tree.
    pub fn convert(
        &self,
        tree: StatementTree,
        kernels: KernelInfoMap,
    ) -> Result<(StatementTree, KernelInfoMap)> {
        let mut unit = Unit::new(tree, &self.config, kernels);
        transform::<DefaultTransformDispatch>(&mut unit, &self.config.passes)?;
        Ok((unit.tree, unit.kernels))
    }
    fn compile_unit(&self, src: &str, dir: Option<&Path>) -> Result<CompiledUnit> {
        let (tree, kernels) = self.analyze(src, dir)?;
        let (tree, kernels) = self.convert(tree, kernels)?;
        let emitted = emit(&tree, &self.config)?;
        Ok(CompiledUnit {
            source: emitted.source,
            defines: emitted.defines,
            kernels,
            launcher: emitted.launcher,
            compiler: self.config.compiler.clone(),
            compiler_flags: self.config.compiler_flags.clone(),
        })
    }
    fn with_snippet(src: &str, unit: &str, err: anyhow::Error) -> anyhow::Error {
        let snippet = match CompileError::find(&err) {
            Some(e) if e.location().is_known() => {
                format!("\n{}", Scanner::error(src, &e.location(), e.message()))
            }
            _ => String::new(),
        };
        err.context(format!("Failed to compile {unit}{snippet}"))
    }
    /// Compile in-memory source. `#include`s are searched in the include
    /// directories only.
    pub fn compile_source(&self, src: &str) -> Result<CompiledUnit> {
        let unit = "<memory>";
        info!("Compiling {unit} for {}", self.config.backend);
        self.compile_unit(src, None)
            .map_err(|err| Self::with_snippet(src, unit, err))
    }
    pub fn compile_file(&self, path: &Path) -> Result<CompiledUnit> {
        let unit = path.display().to_string();
        let src = std::fs::read_to_string(path).with_context(|| format!("Failed to read {unit}"))?;
        info!("Compiling {unit} for {}", self.config.backend);
        self.compile_unit(&src, path.parent())
            .map_err(|err| Self::with_snippet(&src, &unit, err))
    }
}

/// Compile `src` with `config`.
pub fn compile(src: &str, config: CompilerConfig) -> Result<CompiledUnit> {
    Compiler::new(config)?.compile_source(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;

    #[test]
    fn test_error_context() {
        let src = "kernel void k(int n) {\n  int x = ;\n";
        let err = compile(src, CompilerConfig::new(Backend::Serial)).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Failed to compile <memory>"));
        assert!(CompileError::find(&err).is_some());
    }

    #[test]
    fn test_snippet_is_rendered_once() {
        let src = "kernel void k(int n) {\n  x = \"open;\n}\n";
        let err = compile(src, CompilerConfig::new(Backend::Serial)).unwrap_err();
        let text = format!("{err:#}");
        assert_eq!(text.matches("```").count(), 2, "{text}");
        assert_eq!(text.matches("^ Unterminated string").count(), 1, "{text}");
        let found = CompileError::find(&err).unwrap();
        assert!(found.is_lex());
        assert_eq!(found.location().line(), 2);
    }

    #[test]
    fn test_user_define() {
        let src = indoc::indoc! {"
        kernel void k(float *a) {
          for (int o = 0; o < 4; ++o; outer0) {
            for (int i = 0; i < N; ++i; inner0) {
              a[i] = 0;
            }
          }
        }
        "};
        let config = CompilerConfig::new(Backend::Serial).with_define("N", "32");
        let compiled = compile(src, config).unwrap();
        assert!(compiled.source.contains("i < 32"));
        assert_eq!(compiled.kernels["k"].inner_bounds, vec!["32".to_string()]);
    }
}
