extern crate oklc;

use indoc::indoc;
use oklc::error::CompileError;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::Compiler;
use oklc::CompilerConfig;

fn semantic_error(src: &str) -> String {
    let compiler = Compiler::new(CompilerConfig::new(Backend::CUDA)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    let found = CompileError::find(&err).unwrap();
    assert!(found.is_semantic(), "{err:#}");
    found.message().to_string()
}

#[test]
fn test_launch_dimensions() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void addVectors(const int n, const float *a, const float *b, float *ab) {
      for (int i = 0; i < n; i += 16; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          if (i + j < n) {
            ab[i + j] = a[i + j] + b[i + j];
          }
        }
      }
    }
    "};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    let info = &compiled.kernels["addVectors"];
    assert_eq!(info.outer_dims, 1);
    assert_eq!(info.inner_dims, 1);
    assert_eq!(info.outer_bounds, vec!["(n + 16 - 1) / 16".to_string()]);
    assert_eq!(info.inner_bounds, vec!["16".to_string()]);
    assert!(!info.native);
    assert!(compiled.source.contains("const int i = blockIdx.x * 16;"));
}

#[test]
fn test_dimension_mismatch() {
    let src = indoc! {"
    kernel void mismatch(const int n, float *a) {
      for (int y = 0; y < n; ++y; outer1) {
        for (int x = 0; x < n; ++x; outer0) {
          for (int i = 0; i < 16; ++i; inner0) {
            a[i] = 0;
          }
        }
      }
    }
    "};
    assert_eq!(
        semantic_error(src),
        "kernel `mismatch` has 2D outer loops but 1D inner loops"
    );
}

#[test]
fn test_storage_rules() {
    let src = indoc! {"
    kernel void misplaced(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          shared float s[16];
          s[j] = a[j];
        }
      }
    }
    "};
    assert!(semantic_error(src).contains("shared variable `s` must be declared inside an outer loop"));
}

#[test]
fn test_kernel_without_parallel_loops() {
    let src = "kernel void serial(int n, float *a) { for (int i = 0; i < n; ++i) { a[i] = 0; } }";
    assert_eq!(semantic_error(src), "kernel `serial` has no outer loop");
}

#[test]
fn test_native_kernel() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void copy(const int n, const float *a, float *b) {
      const int i = blockIdx.x * blockDim.x + threadIdx.x;
      if (i < n) {
        b[i] = a[i];
      }
    }
    "};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    let info = &compiled.kernels["copy"];
    assert!(info.native);
    assert_eq!(info.to_string(), "copy: native");
    let define = |name: &str| {
        compiled
            .defines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(define("occaInnerId0"), Some("threadIdx.x".to_string()));
    assert_eq!(define("occaOuterDim1"), Some("gridDim.y".to_string()));
}
