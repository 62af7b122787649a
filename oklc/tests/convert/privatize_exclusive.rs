use indoc::indoc;
use oklc::tester::Tester;
use oklc::Backend;
use std::panic::Location;

fn flags() -> Vec<&'static str> {
    vec!["--okl-privatize-exclusive"]
}

const ROW_SUM: &str = indoc! {"
kernel void rowSum(const int n, const float *a, float *out) {
  for (int b = 0; b < n; ++b; outer0) {
    exclusive float acc = 0;
    for (int j = 0; j < 16; ++j; inner0) {
      acc += a[16 * b + j];
    }
    for (int j = 0; j < 16; ++j; inner0) {
      out[16 * b + j] = acc;
    }
  }
}
"};

#[test]
fn test_exclusive_on_serial() {
    Tester::init_tracing();
    let expected = indoc! {"
    kernel void rowSum(const int n, const float *a, float *out) {
      for (int b = 0; b < n; ++b; outer0) {
        float acc[16];
        for (int occaExclusiveIndex = 0; occaExclusiveIndex < 16; ++occaExclusiveIndex) {
          acc[occaExclusiveIndex] = 0;
        }
        for (int j = 0; j < 16; ++j; inner0) {
          acc[j] += a[16 * b + j];
        }
        for (int j = 0; j < 16; ++j; inner0) {
          out[16 * b + j] = acc[j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::Serial, ROW_SUM);
    Tester::verify(&tree);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_exclusive_on_gpu() {
    Tester::init_tracing();
    let expected = indoc! {"
        float acc = 0;
          acc += a[16 * b + j];
          out[16 * b + j] = acc;
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, ROW_SUM);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("exclusive"));
}

#[test]
fn test_two_inner_dimensions() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void tile(const int n, float *a) {
      for (int c = 0; c < n; ++c; outer1) {
        for (int b = 0; b < n; ++b; outer0) {
          exclusive float acc;
          for (int j = 0; j < 8; ++j; inner1) {
            for (int i = 0; i < 16; ++i; inner0) {
              acc = a[i];
            }
          }
          for (int j = 0; j < 8; ++j; inner1) {
            for (int i = 0; i < 16; ++i; inner0) {
              a[i] = acc;
            }
          }
        }
      }
    }
    "};
    let expected = indoc! {"
          float acc[16 * 8];
              acc[i + 16 * j] = a[i];
              a[i] = acc[i + 16 * j];
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::OpenMP, src);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("occaExclusiveIndex"));
}
