use indoc::indoc;
use oklc::error::CompileError;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::BarrierPolicy;
use oklc::Compiler;
use oklc::CompilerConfig;
use oklc::Passes;
use std::panic::Location;

fn flags() -> Vec<&'static str> {
    vec!["--okl-add-barriers"]
}

const REVERSE: &str = indoc! {"
kernel void reverse(const int n, float *a) {
  for (int b = 0; b < n; ++b; outer0) {
    shared float s[16];
    for (int j = 0; j < 16; ++j; inner0) {
      s[j] = a[16 * b + j];
    }
    for (int j = 0; j < 16; ++j; inner0) {
      a[16 * b + j] = s[15 - j];
    }
  }
}
"};

#[test]
fn test_barrier_between_inner_loops() {
    Tester::init_tracing();
    let expected = indoc! {"
    kernel void reverse(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[16 * b + j];
        }
        barrier(localMemFence);
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * b + j] = s[15 - j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, REVERSE);
    Tester::verify(&tree);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_idempotent() {
    Tester::init_tracing();
    let (_tree, once) = Tester::transform(flags(), Backend::Serial, REVERSE);
    let (_tree, twice) = Tester::transform(flags(), Backend::Serial, &once);
    Tester::check_lines_exact(&twice, &once, Location::caller());
    assert_eq!(twice.matches("barrier(").count(), 1);
}

#[test]
fn test_hazard_inside_inner_loop() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void shift(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[17];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[j];
          a[j] = s[j + 1];
        }
      }
    }
    "};
    let expected = indoc! {"
          s[j] = a[j];
          barrier(localMemFence);
          a[j] = s[j + 1];
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_same_element_needs_no_barrier() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void square(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[j];
          a[j] = s[j] * s[j];
        }
      }
    }
    "};
    let (_tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    assert!(!actual.contains("barrier"), "{actual}");
}

const DIVERGENT: &str = indoc! {"
kernel void divergent(const int n, float *a) {
  for (int b = 0; b < n; ++b; outer0) {
    shared float s[16];
    for (int j = 0; j < 16; ++j; inner0) {
      s[j] = a[j];
      if (j < 8) {
        barrier(localMemFence);
      }
      a[j] = s[j];
    }
  }
}
"};

#[test]
fn test_divergent_barrier() {
    Tester::init_tracing();
    let config = CompilerConfig::new(Backend::CUDA)
        .with_passes(Passes::from_convert_vec(flags()));
    let compiler = Compiler::new(config).unwrap();
    let (tree, kernels) = compiler.analyze(DIVERGENT, None).unwrap();
    let err = compiler.convert(tree, kernels).unwrap_err();
    let err = CompileError::find(&err).unwrap();
    assert!(err.is_semantic());
    assert_eq!(
        err.message(),
        "barrier inside a divergent conditional: `j < 8` depends on `j`"
    );
}

#[test]
fn test_divergent_barrier_warning() {
    Tester::init_tracing();
    let config = CompilerConfig::new(Backend::CUDA).with_barrier_policy(BarrierPolicy::Warn);
    let compiled = Tester::compile(config, DIVERGENT);
    assert!(compiled.source.contains("__syncthreads();"));
}

#[test]
fn test_uniform_condition() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void uniform(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[j];
          if (n > 0) {
            barrier(localMemFence);
          }
          a[j] = s[15 - j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::verify(&tree);
    assert_eq!(actual.matches("barrier(").count(), 1, "{actual}");
}

#[test]
fn test_barrier_at_end_of_loop_covers_later_reads() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void rounds(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int r = 0; r < 4; ++r) {
          for (int j = 0; j < 16; ++j; inner0) {
            s[j] = a[16 * b + j];
          }
          barrier(localMemFence);
        }
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * b + j] = s[15 - j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::verify(&tree);
    assert_eq!(actual.matches("barrier(").count(), 1, "{actual}");
}

#[test]
fn test_barrier_in_conditional_keeps_earlier_writes() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void maybe(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[16 * b + j];
        }
        if (n > 16) {
          barrier(localMemFence);
        }
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * b + j] = s[15 - j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::verify(&tree);
    assert_eq!(actual.matches("barrier(").count(), 2, "{actual}");
}
