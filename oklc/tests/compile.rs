extern crate oklc;

use indoc::indoc;
use oklc::ir::StatementKind;
use oklc::ir::StatementTree;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::Compiler;
use oklc::CompilerConfig;
use oklc::Passes;
use std::panic::Location;

const ADD_VECTORS: &str = indoc! {"
kernel void addVectors(const int entries, const float *a, const float *b, float *ab) {
  for (int group = 0; group < entries; group += 16; outer0) {
    for (int item = 0; item < 16; ++item; inner0) {
      const int n = group + item;
      if (n < entries) {
        ab[n] = a[n] + b[n];
      }
    }
  }
}
"};

#[test]
fn test_every_backend() {
    Tester::init_tracing();
    for backend in Backend::all() {
        let compiled = Tester::compile(CompilerConfig::new(backend), ADD_VECTORS);
        assert!(compiled.source.contains("ab[n] = a[n] + b[n];"), "{backend}");
        assert!(!compiled.source.contains("outer0"), "{backend}");
        assert!(!compiled.source.contains("inner0"), "{backend}");
        assert!(compiled.launcher.is_none());
        let marker = compiled
            .defines
            .iter()
            .find(|(name, _)| name == backend.marker())
            .map(|(_, value)| value.as_str());
        assert_eq!(marker, Some("1"), "{backend}");
    }
}

#[test]
fn test_cuda_source() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" __global__ void addVectors(const int entries, const float *a, const float *b, float *ab) {
      {
        const int group = blockIdx.x * 16;
        {
          const int item = threadIdx.x;
          if (item < 16) {
            const int n = group + item;
            if (n < entries) {
              ab[n] = a[n] + b[n];
            }
          }
        }
      }
    }
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), ADD_VECTORS);
    Tester::check_lines_exact(&compiled.source, expected, Location::caller());
}

#[test]
fn test_split_kernel_launcher() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void twoPhase(const int n, float *a, float *b) {
      for (int i = 0; i < n; ++i; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * i + j] = 1;
        }
      }
      for (int i = 0; i < n; ++i; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          b[16 * i + j] = a[16 * i + j];
        }
      }
    }
    "};
    let expected = indoc! {r#"
    extern "C" __global__ void twoPhase_0(const int n, float *a, float *b) {
      {
        const int i = blockIdx.x;
        {
          const int j = threadIdx.x;
          if (j < 16) {
            a[16 * i + j] = 1;
    extern "C" __global__ void twoPhase_1(const int n, float *a, float *b) {
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    Tester::check_lines_contain(&compiled.source, expected, Location::caller());
    assert!(!compiled.source.contains("nestedKernels"));

    let expected = indoc! {r#"
    extern "C" void twoPhase(occa::kernel *nestedKernels, const int n, float *a, float *b) {
      nestedKernels[0](n, a, b);
      nestedKernels[1](n, a, b);
    }
    "#};
    let launcher = compiled.launcher.unwrap();
    Tester::check_lines_exact(&launcher, expected, Location::caller());
}

#[test]
fn test_configuration_is_passed_through() {
    Tester::init_tracing();
    let config = CompilerConfig::new(Backend::OpenMP)
        .with_debug(true)
        .with_define("TILE", "16")
        .with_compiler("g++")
        .with_compiler_flags("-O3 -fopenmp");
    let compiled = Tester::compile(config, ADD_VECTORS);
    assert_eq!(compiled.compiler.as_deref(), Some("g++"));
    assert_eq!(compiled.compiler_flags.as_deref(), Some("-O3 -fopenmp"));
    let names = compiled
        .defines
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<&str>>();
    let debug = names.iter().position(|n| *n == "OCCA_DEBUG_ENABLED").unwrap();
    let tile = names.iter().position(|n| *n == "TILE").unwrap();
    assert!(debug < tile);
    assert_eq!(compiled.defines[tile].1, "16");
    assert!(!names.contains(&"occaInnerId0"));
}

#[test]
fn test_without_passes() {
    Tester::init_tracing();
    let config = CompilerConfig::new(Backend::CUDA).with_passes(Passes::from_vec(vec![]));
    let compiled = Tester::compile(config, ADD_VECTORS);
    Tester::check_lines_contain(
        &compiled.source,
        "for (int group = 0; group < entries; group += 16; outer0) {",
        Location::caller(),
    );
}

fn kinds(tree: &StatementTree) -> Vec<StatementKind> {
    tree.descendants(tree.root())
        .into_iter()
        .map(|id| tree.kind(id))
        .collect()
}

fn scopes(tree: &StatementTree) -> Vec<Vec<String>> {
    tree.descendants(tree.root())
        .into_iter()
        .map(|id| {
            let mut names = tree.get(id).scope.keys().cloned().collect::<Vec<String>>();
            names.sort();
            names
        })
        .collect()
}

#[test]
fn test_native_kernel_round_trip() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void copy(const int n, const float *a, float *b) {
      const int i = blockIdx.x * blockDim.x + threadIdx.x;
      if (i < n) {
        b[i] = a[i];
      }
    }
    "};
    let (before, printed) = Tester::parse(src);
    Tester::check_lines_exact(&printed, src, Location::caller());

    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    Tester::check_lines_contain(
        &compiled.source,
        indoc! {r#"
        extern "C" __global__ void copy(const int n, const float *a, float *b) {
          const int i = blockIdx.x * blockDim.x + threadIdx.x;
          if (i < n) {
            b[i] = a[i];
        "#},
        Location::caller(),
    );
    let (after, _) = Tester::parse(&compiled.source);
    Tester::verify(&after);
    assert_eq!(kinds(&before), kinds(&after));
    assert_eq!(scopes(&before), scopes(&after));
}

#[test]
fn test_units_are_independent() {
    Tester::init_tracing();
    let compiler = Compiler::new(CompilerConfig::new(Backend::Serial)).unwrap();
    let first = compiler
        .compile_source("#define EXTRA 1\nint x = EXTRA;")
        .unwrap();
    assert_eq!(first.source, "int x = 1;");
    let second = compiler.compile_source("int y = EXTRA;").unwrap();
    assert_eq!(second.source, "int y = EXTRA;");
}
