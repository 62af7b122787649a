extern crate oklc;

use indoc::indoc;
use oklc::error::CompileError;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::Compiler;
use oklc::CompilerConfig;
use oklc::Dialect;
use std::panic::Location;

#[test]
fn test_function_macro() {
    Tester::init_tracing();
    let src = indoc! {"
    #define SQR(x) ((x)*(x))
    void f(float a) {
      float y = SQR(a+1);
    }
    "};
    let expected = indoc! {"
    void f(float a) {
      float y = ((a + 1) * (a + 1));
    }
    "};
    let (tree, actual) = Tester::parse(src);
    Tester::verify(&tree);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_conditional_on_backend() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void fill(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
    #if OCCA_USING_GPU
          a[16 * b + j] = 1;
    #else
          a[16 * b + j] = 2;
    #endif
        }
      }
    }
    "};
    let gpu = Tester::compile(CompilerConfig::new(Backend::OpenCL), src);
    assert!(gpu.source.contains("a[16 * b + j] = 1;"));
    assert!(!gpu.source.contains("= 2;"));
    let cpu = Tester::compile(CompilerConfig::new(Backend::OpenMP), src);
    assert!(cpu.source.contains("a[16 * b + j] = 2;"));
    assert!(!cpu.source.contains("= 1;"));
}

#[test]
fn test_unterminated_block() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void f(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        a[b] = 0;
      }
    "};
    let compiler = Compiler::new(CompilerConfig::new(Backend::CUDA)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    let found = CompileError::find(&err).unwrap();
    assert!(found.is_lex());
    assert_eq!(
        found.message(),
        "Unterminated block: `{` opened at line 1 is never closed"
    );
    let text = err.to_string();
    assert!(text.starts_with("Failed to compile <memory>"), "{text}");
}

#[test]
fn test_parse_error() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void f(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        float x = ;
      }
    }
    "};
    let compiler = Compiler::new(CompilerConfig::new(Backend::Serial)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    let found = CompileError::find(&err).unwrap();
    assert!(found.is_parse(), "{err:#}");
    assert_eq!(found.message(), "unexpected `=` in declaration of `x`");
    assert_eq!(found.location().line(), 3);
}

#[test]
fn test_include_next_to_file() {
    Tester::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tile.h"), "#define TILE 16\n").unwrap();
    let src = indoc! {r#"
    #include "tile.h"
    kernel void fill(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < TILE; ++j; inner0) {
          a[TILE * b + j] = 0;
        }
      }
    }
    "#};
    let path = dir.path().join("fill.okl");
    std::fs::write(&path, src).unwrap();
    let compiler = Compiler::new(CompilerConfig::new(Backend::Serial)).unwrap();
    let compiled = compiler.compile_file(&path).unwrap();
    assert_eq!(compiled.kernels["fill"].inner_bounds, vec!["16".to_string()]);
    Tester::check_lines_contain(
        &compiled.source,
        "a[16 * b + j] = 0;",
        Location::caller(),
    );
}

#[test]
fn test_include_dirs() {
    Tester::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scale.h"), "#define SCALE(x) (2 * (x))\n").unwrap();
    let src = indoc! {"
    #include <scale.h>
    kernel void scale(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        for (int j = 0; j < 16; ++j; inner0) {
          a[16 * b + j] = SCALE(a[16 * b + j]);
        }
      }
    }
    "};
    let config = CompilerConfig::new(Backend::Serial).with_include_dir(dir.path().to_path_buf());
    let compiled = Tester::compile(config, src);
    Tester::check_lines_contain(
        &compiled.source,
        "a[16 * b + j] = (2 * (a[16 * b + j]));",
        Location::caller(),
    );

    let compiler = Compiler::new(CompilerConfig::new(Backend::Serial)).unwrap();
    let err = compiler.compile_source(src).unwrap_err();
    assert!(CompileError::find(&err).unwrap().is_macro(), "{err:#}");
}

#[test]
fn test_missing_file() {
    let compiler = Compiler::new(CompilerConfig::default()).unwrap();
    let err = compiler
        .compile_file("does/not/exist.okl".as_ref())
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to read does/not/exist.okl"));
}

#[test]
fn test_fortran_kernel() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel subroutine addVectors(entries, a, b, ab)
      implicit none
      integer, intent(in) :: entries
      real(4), intent(in) :: a(:), b(:)
      real(4), intent(out) :: ab(:)
      integer :: n

      do group = 0, (entries + 15) / 16 - 1, outer0
        do item = 0, 15, inner0
          n = item + 16 * group
          if (n < entries .and. .not. (n /= n)) then
            ab(n + 1) = a(n + 1) + b(n + 1)
          end if
        end do
      end do
    end subroutine addVectors
    "};
    let expected = indoc! {r#"
    extern "C" void addVectors(const int entries, const float *a, const float *b, float *ab) {
      int n;
      for (int group = 0; group <= (entries + 15) / 16 - 1; ++group) {
        for (int item = 0; item <= 15; ++item) {
          n = item + 16 * group;
          if (n < entries && !(n != n)) {
            ab[(n + 1) - 1] = a[(n + 1) - 1] + b[(n + 1) - 1];
          }
        }
      }
    }
    "#};
    let config = CompilerConfig::new(Backend::Serial).with_dialect(Dialect::Fortran);
    let compiled = Tester::compile(config, src);
    Tester::check_lines_exact(&compiled.source, expected, Location::caller());
    let info = &compiled.kernels["addVectors"];
    assert_eq!(info.outer_bounds, vec!["(entries + 15) / 16 - 1 + 1".to_string()]);
    assert_eq!(info.inner_bounds, vec!["15 + 1".to_string()]);
}
