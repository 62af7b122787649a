use indoc::indoc;
use oklc::error::CompileError;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::Compiler;
use oklc::CompilerConfig;
use std::panic::Location;

const SCALE: &str = indoc! {"
kernel void scale(const int n, float *a) {
  for (int b = 0; b < n; ++b; outer0) {
    for (int j = 0; j < 16; ++j; inner0) {
      a[16 * b + j] *= 2;
    }
  }
}
"};

#[test]
fn test_serial() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" void scale(const int n, float *a) {
      for (int b = 0; b < n; ++b) {
        for (int j = 0; j < 16; ++j) {
          a[16 * b + j] *= 2;
        }
      }
    }
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::Serial), SCALE);
    Tester::check_lines_exact(&compiled.source, expected, Location::caller());
}

#[test]
fn test_openmp() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" void scale(const int n, float *a) {
    #pragma omp parallel for
      for (int b = 0; b < n; ++b) {
        for (int j = 0; j < 16; ++j) {
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::OpenMP), SCALE);
    Tester::check_lines_contain(&compiled.source, expected, Location::caller());
    assert_eq!(compiled.source.matches("#pragma omp").count(), 1);
}

#[test]
fn test_openmp_private_scalars() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void scatter(const int n, float *a) {
      int t;
      float unused[4];
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          t = 16 * b + j;
          a[t] = t;
        }
      }
    }
    "};
    let expected = indoc! {r#"
    extern "C" void scatter(const int n, float *a) {
      int t;
      float unused[4];
    #pragma omp parallel for private(t)
      for (int b = 0; b < n; ++b) {
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::OpenMP), src);
    Tester::check_lines_contain(&compiled.source, expected, Location::caller());

    // Without threads the declaration stays as is.
    let compiled = Tester::compile(CompilerConfig::new(Backend::Serial), src);
    assert!(!compiled.source.contains("private"));
}

#[test]
fn test_pthreads() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" void scale(const int occaThreadRank, const int occaThreadCount, const int n, float *a) {
      for (int b = occaThreadRank; b < n; b += occaThreadCount) {
        for (int j = 0; j < 16; ++j) {
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::Pthreads), SCALE);
    Tester::check_lines_contain(&compiled.source, expected, Location::caller());
}

#[test]
fn test_cuda() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" __global__ void scale(const int n, float *a) {
      {
        const int b = blockIdx.x;
        {
          const int j = threadIdx.x;
          if (j < 16) {
            a[16 * b + j] *= 2;
          }
        }
      }
    }
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), SCALE);
    Tester::check_lines_exact(&compiled.source, expected, Location::caller());
}

#[test]
fn test_opencl() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    __kernel void scale(const int n, __global float *a) {
        const int b = get_group_id(0);
          const int j = get_local_id(0);
          if (j < 16) {
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::OpenCL), SCALE);
    Tester::check_lines_contain(&compiled.source, expected, Location::caller());
}

#[test]
fn test_cuda_helpers_are_device_functions() {
    Tester::init_tracing();
    let src = indoc! {"
    float twice(float x) {
      return 2 * x;
    }
    kernel void apply(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * b + j] = twice(a[16 * b + j]);
        }
      }
    }
    "};
    let compiled = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    Tester::check_lines_contain(
        &compiled.source,
        "__device__ float twice(float x) {",
        Location::caller(),
    );
}

#[test]
fn test_shared_memory_keywords() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void stage(const int n, float *a) {
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
    let cuda = Tester::compile(CompilerConfig::new(Backend::CUDA), src);
    Tester::check_lines_contain(
        &cuda.source,
        "__shared__ float s[16];\n__syncthreads();",
        Location::caller(),
    );
    let opencl = Tester::compile(CompilerConfig::new(Backend::OpenCL), src);
    Tester::check_lines_contain(
        &opencl.source,
        "__local float s[16];\nbarrier(CLK_LOCAL_MEM_FENCE);",
        Location::caller(),
    );
    let serial = Tester::compile(CompilerConfig::new(Backend::Serial), src);
    assert!(!serial.source.contains("barrier"));
    assert!(!serial.source.contains("shared"));
}

#[test]
fn test_shared_size_must_be_constant() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void dynamic(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[n];
        for (int j = 0; j < 16; ++j; inner0) {
          s[j] = a[j];
        }
      }
    }
    "};
    let compiler = Compiler::new(CompilerConfig::new(Backend::CUDA)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    let found = CompileError::find(&err).unwrap();
    assert!(found.is_emit());
    assert_eq!(found.message(), "shared array `s` needs a constant size, got `n`");
}

#[test]
fn test_nested_barrier_on_serial() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void nested(const int n, float *a) {
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
    let compiler = Compiler::new(CompilerConfig::new(Backend::Serial)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    let found = CompileError::find(&err).unwrap();
    assert!(found.is_emit());
    assert!(found.message().starts_with("barrier nested in a statement of an inner loop"));
}
