use crate::compile::CompiledUnit;
use crate::compile::Compiler;
use crate::config::Backend;
use crate::config::CompilerConfig;
use crate::init_subscriber;
use crate::ir::OklFlavor;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::Passes;
use std::cmp::max;
use std::collections::HashSet;
use std::panic::Location;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                let msg = format!("{line}   <== missing");
                result.push_str(&format!("\n{msg}"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let l = max(actual.lines().count(), expected.lines().count());
        for i in 0..l {
            let actual_line = match actual.lines().nth(i) {
                None => {
                    panic!("Expected line {i} not found in output: called from {caller}");
                }
                Some(actual_line) => actual_line,
            };
            let expected_line = match expected.lines().nth(i) {
                None => {
                    panic!("Unexpected line {i} in output: called from {caller}\n{actual}");
                }
                Some(expected_line) => expected_line,
            };
            assert_eq!(actual_line, expected_line, "called from {caller}");
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the expected output.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.lines().enumerate() {
            let expected_line = expected_line.trim();
            // If not skipping these, an empty line will match any line (which
            // can then cause the next expected line to be reported as missing).
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.lines().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected, i);
            panic!("{msg}\nwhen called from {caller}\n```\n{actual}\n```");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    /// Parse `src` with the default configuration and print it back.
    pub fn parse(src: &str) -> (StatementTree, String) {
        let src = src.trim();
        Self::print_heading("Before parse", src);
        let compiler = Compiler::new(CompilerConfig::default()).unwrap();
        let tree = compiler.parse(src, None).unwrap();
        let actual = tree.to_string();
        Self::print_heading("After parse", &actual);
        (tree, actual)
    }
    /// Run the passes in `arguments` (such as `--okl-add-barriers`) for
    /// `backend` and print the resulting tree.
    ///
    /// The tree is printed as OKL; use [Tester::compile] for the spelling of
    /// the backend.
    pub fn transform(arguments: Vec<&str>, backend: Backend, src: &str) -> (StatementTree, String) {
        let src = src.trim();
        let msg = format!("Before (transform {arguments:?} for {backend})");
        Self::print_heading(&msg, src);
        for arg in arguments.clone() {
            if arg.starts_with("okl-") {
                panic!("passes should be prefixed with `--okl-`");
            }
        }
        let passes = Passes::from_convert_vec(arguments.clone());
        let config = CompilerConfig::new(backend).with_passes(passes);
        let compiler = Compiler::new(config).unwrap();
        let (tree, kernels) = compiler.analyze(src, None).unwrap();
        let (tree, _kernels) = compiler.convert(tree, kernels).unwrap();
        let actual = tree.to_string();
        let msg = format!("After (transform {arguments:?} for {backend})");
        Self::print_heading(&msg, &actual);
        (tree, actual)
    }
    /// Run the whole pipeline.
    pub fn compile(config: CompilerConfig, src: &str) -> CompiledUnit {
        let src = src.trim();
        Self::print_heading(&format!("Before (compile for {})", config.backend), src);
        let compiled = Compiler::new(config).unwrap().compile_source(src).unwrap();
        Self::print_heading("After compile", &compiled.source);
        compiled
    }
    /// Run some extra verification on a statement tree.
    ///
    /// Checks what the printed source cannot show: that parent and child
    /// links agree, that no statement is attached twice, and that every
    /// declared variable points back at its declaring statement and is
    /// registered in the scope that the declaration is visible from.
    pub fn verify(tree: &StatementTree) {
        let mut seen = HashSet::new();
        for id in tree.descendants(tree.root()) {
            assert!(seen.insert(id), "statement {id:?} is attached twice");
            let parent = match tree.parent(id) {
                Some(parent) => parent,
                None => {
                    let src = tree.render(id, &OklFlavor);
                    panic!("statement {id:?} without parent:\n{src}");
                }
            };
            assert!(
                tree.children(parent).contains(&id),
                "statement {id:?} is missing from the children of its parent"
            );
            for child in tree.children(id) {
                assert_eq!(tree.parent(*child), Some(id), "child {child:?} of {id:?}");
            }
            let statement = tree.get(id);
            if matches!(statement.kind, StatementKind::Declaration | StatementKind::For) {
                for var in &statement.vars {
                    let descriptor = tree.var(*var);
                    assert_eq!(descriptor.declared_in, id, "`{}`", descriptor.name);
                    assert_eq!(
                        tree.resolve(id, &descriptor.name),
                        Some(*var),
                        "`{}` is not in scope at its declaration",
                        descriptor.name
                    );
                }
            }
            if let Some(sig) = &statement.function {
                for param in &sig.params {
                    let descriptor = tree.var(*param);
                    assert_eq!(tree.resolve(id, &descriptor.name), Some(*param));
                }
            }
        }
    }
}
