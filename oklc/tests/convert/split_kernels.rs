use indoc::indoc;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::CompilerConfig;
use std::panic::Location;

fn flags() -> Vec<&'static str> {
    vec!["--okl-split-kernels"]
}

const TWO_PHASE: &str = indoc! {"
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

#[test]
fn test_two_outer_loops() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    kernel void twoPhase_0(const int n, float *a, float *b) {
      for (int i = 0; i < n; ++i; outer0) {
          a[16 * i + j] = 1;
    }
    kernel void twoPhase_1(const int n, float *a, float *b) {
      for (int i = 0; i < n; ++i; outer0) {
          b[16 * i + j] = a[16 * i + j];
    }
    extern "C" void twoPhase(occa::kernel *nestedKernels, const int n, float *a, float *b) {
      nestedKernels[0](n, a, b);
      nestedKernels[1](n, a, b);
    }
    "#};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, TWO_PHASE);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("kernel void twoPhase("));
}

#[test]
fn test_kernel_info() {
    Tester::init_tracing();
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), TWO_PHASE);
    let info = &compiled.kernels["twoPhase"];
    assert_eq!(info.nested_names(), vec!["twoPhase_0", "twoPhase_1"]);
    assert_eq!(info.nested_kernels[1].outer_bounds, vec!["n".to_string()]);
    assert_eq!(info.nested_kernels[1].inner_bounds, vec!["16".to_string()]);
}

#[test]
fn test_kernel_state_becomes_parameter() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void twoPhase(const int n, float *a, float *b) {
      const int mid = n / 2;
      for (int i = 0; i < n; ++i; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * i + j] = 1;
        }
      }
      for (int i = 0; i < mid; ++i; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          b[16 * i + j] = a[16 * i + j];
        }
      }
    }
    "};
    let expected = indoc! {r#"
    kernel void twoPhase_0(const int n, float *a, float *b) {
    kernel void twoPhase_1(const int n, float *a, float *b, const int mid) {
      for (int i = 0; i < mid; ++i; outer0) {
    extern "C" void twoPhase(occa::kernel *nestedKernels, const int n, float *a, float *b) {
      const int mid = n / 2;
      nestedKernels[0](n, a, b);
      nestedKernels[1](n, a, b, mid);
    "#};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_single_outer_loop_is_kept() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void fill(const int n, float *a) {
      for (int i = 0; i < n; ++i; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * i + j] = 0;
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::OpenCL, src);
    Tester::verify(&tree);
    Tester::check_lines_exact(&actual, src, Location::caller());
}

#[test]
fn test_cpu_backends_are_not_split() {
    Tester::init_tracing();
    let (_tree, actual) = Tester::transform(flags(), Backend::Serial, TWO_PHASE);
    Tester::check_lines_exact(&actual, TWO_PHASE, Location::caller());
}
