use indoc::indoc;
use oklc::ir::StatementKind;
use oklc::tester::Tester;
use oklc::Backend;
use oklc::Compiler;
use oklc::CompilerConfig;
use oklc::Passes;
use std::panic::Location;

fn flags() -> Vec<&'static str> {
    vec!["--okl-hoist-sections"]
}

const SMOOTH: &str = indoc! {"
kernel void smooth(const int n, float *a) {
  for (int b = 0; b < n; ++b; outer0) {
    shared float s[16];
    for (int j = 0; j < 16; ++j; inner0) {
      const float v = a[16 * b + j];
      s[j] = v;
      barrier(localMemFence);
      a[16 * b + j] = v + s[15 - j];
    }
  }
}
"};

#[test]
fn test_hoist_to_kernel_body() {
    Tester::init_tracing();
    let expected = indoc! {"
    kernel void smooth(const int n, float *a) {
      float v;
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          v = a[16 * b + j];
          s[j] = v;
          barrier(localMemFence);
          a[16 * b + j] = v + s[15 - j];
        }
      }
    }
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::CUDA, SMOOTH);
    Tester::verify(&tree);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_hoisted_variable_keeps_identity() {
    Tester::init_tracing();
    let config = CompilerConfig::new(Backend::CUDA).with_passes(Passes::from_convert_vec(flags()));
    let compiler = Compiler::new(config).unwrap();
    let (tree, kernels) = compiler.analyze(SMOOTH, None).unwrap();
    let declared = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|id| tree.kind(*id) == StatementKind::Declaration)
        .flat_map(|id| tree.get(id).vars.clone())
        .find(|var| tree.var(*var).name == "v")
        .unwrap();

    let (tree, _kernels) = compiler.convert(tree, kernels).unwrap();
    let kernel = tree.kernels()[0];
    let body = tree.body(kernel).unwrap();
    assert_eq!(tree.resolve(body, "v"), Some(declared));
    let var = tree.var(declared);
    assert_eq!(var.typ, "float");
    assert!(!var.qualifiers.constant);
    assert_eq!(tree.parent(var.declared_in), Some(body));
}

#[test]
fn test_hoist_on_cpu_privatizes() {
    Tester::init_tracing();
    let expected = indoc! {"
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        float v[16];
        for (int j = 0; j < 16; ++j; inner0) {
          v[j] = a[16 * b + j];
          s[j] = v[j];
          barrier(localMemFence);
          a[16 * b + j] = v[j] + s[15 - j];
    "};
    let (tree, actual) = Tester::transform(flags(), Backend::Serial, SMOOTH);
    Tester::verify(&tree);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_variable_within_one_section_stays() {
    Tester::init_tracing();
    let src = indoc! {"
    kernel void local(const int n, float *a) {
      for (int b = 0; b < n; ++b; outer0) {
        shared float s[16];
        for (int j = 0; j < 16; ++j; inner0) {
          const float v = a[16 * b + j];
          s[j] = v;
          barrier(localMemFence);
          a[16 * b + j] = s[15 - j];
        }
      }
    }
    "};
    let (_tree, actual) = Tester::transform(flags(), Backend::CUDA, src);
    Tester::check_lines_exact(&actual, src, Location::caller());
}

#[test]
fn test_split_at_barrier_on_serial() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    extern "C" void smooth(const int n, float *a) {
      for (int b = 0; b < n; ++b) {
        float s[16];
        float v[16];
        for (int j = 0; j < 16; ++j) {
          v[j] = a[16 * b + j];
          s[j] = v[j];
        }
        for (int j = 0; j < 16; ++j) {
          a[16 * b + j] = v[j] + s[15 - j];
        }
      }
    }
    "#};
    let compiled = Tester::compile(CompilerConfig::new(Backend::Serial), SMOOTH);
    Tester::check_lines_exact(&compiled.source, expected, Location::caller());
}
