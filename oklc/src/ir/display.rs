use crate::frontend::to_source;
use crate::frontend::Node;
use crate::ir::FunctionSig;
use crate::ir::LoopHint;
use crate::ir::StatementKind;
use crate::ir::StatementTree;
use crate::ir::StmtId;
use crate::ir::Var;
use crate::ir::VarId;
use std::fmt::Display;
use std::fmt::Formatter;

pub fn spaces(indent: usize) -> String {
    "  ".repeat(indent)
}

/// Keywords that differ between the kernel language and the backends.
pub trait Flavor {
    /// Qualifier in front of a kernel definition.
    fn kernel_qualifier(&self) -> &str {
        "kernel"
    }
    fn shared_keyword(&self) -> &str {
        "shared"
    }
    fn exclusive_keyword(&self) -> &str {
        "exclusive"
    }
    fn restrict_keyword(&self) -> &str {
        "restrict"
    }
    fn barrier(&self, fence: &[Node]) -> String {
        format!("barrier({});", to_source(fence))
    }
    fn unroll(&self, hint: &LoopHint) -> Option<String> {
        match hint {
            LoopHint::Unroll(Some(n)) => Some(format!("#pragma unroll {n}")),
            LoopHint::Unroll(None) => Some("#pragma unroll".to_string()),
        }
    }
}

/// Prints the kernel language itself.
pub struct OklFlavor;

impl Flavor for OklFlavor {}

fn push_word(out: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with(' ') {
        out.push(' ');
    }
    out.push_str(word);
}

/// Type and qualifiers in front of the declarator, such as `const float`.
pub fn specifiers(var: &Var, flavor: &dyn Flavor) -> String {
    let q = &var.qualifiers;
    let mut out = String::new();
    if let Some(space) = &q.address_space {
        push_word(&mut out, space);
    }
    if q.is_static {
        push_word(&mut out, "static");
    }
    if q.is_extern {
        push_word(&mut out, "extern");
    }
    if q.shared {
        push_word(&mut out, flavor.shared_keyword());
    }
    if q.exclusive {
        push_word(&mut out, flavor.exclusive_keyword());
    }
    if q.constant {
        push_word(&mut out, "const");
    }
    if q.volatile {
        push_word(&mut out, "volatile");
    }
    for other in &q.other {
        push_word(&mut out, other);
    }
    push_word(&mut out, &var.typ);
    out
}

/// The declarator, such as `*restrict a[16] = 0`.
pub fn declarator(var: &Var, flavor: &dyn Flavor, with_init: bool) -> String {
    let mut out = "*".repeat(var.pointer);
    if var.qualifiers.restrict && var.pointer > 0 && !flavor.restrict_keyword().is_empty() {
        out.push_str(flavor.restrict_keyword());
        out.push(' ');
    }
    out.push_str(&var.name);
    for dim in &var.dims {
        out.push_str(&format!("[{}]", to_source(dim)));
    }
    if with_init {
        if let Some(init) = &var.init {
            out.push_str(&format!(" = {}", to_source(init)));
        }
    }
    out
}

pub fn parameter(var: &Var, flavor: &dyn Flavor) -> String {
    format!("{} {}", specifiers(var, flavor), declarator(var, flavor, false))
}

impl StatementTree {
    /// Declaration text without the trailing `;`.
    pub fn declaration_text(&self, vars: &[VarId], flavor: &dyn Flavor) -> String {
        let first = match vars.first() {
            Some(first) => self.var(*first),
            None => return String::new(),
        };
        let declarators = vars
            .iter()
            .map(|v| declarator(self.var(*v), flavor, true))
            .collect::<Vec<String>>()
            .join(", ");
        format!("{} {declarators}", specifiers(first, flavor))
    }
    pub fn signature_text(&self, sig: &FunctionSig, flavor: &dyn Flavor) -> String {
        let mut out = String::new();
        for qualifier in &sig.qualifiers {
            push_word(&mut out, qualifier);
        }
        if sig.is_kernel && !sig.launcher {
            push_word(&mut out, flavor.kernel_qualifier());
        }
        push_word(&mut out, &sig.return_type);
        let params = sig
            .params
            .iter()
            .map(|p| parameter(self.var(*p), flavor))
            .collect::<Vec<String>>()
            .join(", ");
        push_word(&mut out, &format!("{}({params})", sig.name));
        out
    }
    /// Print the subtree below `id` (inclusive) with the given flavor.
    pub fn render(&self, id: StmtId, flavor: &dyn Flavor) -> String {
        let mut lines = vec![];
        if self.kind(id) == StatementKind::Root {
            self.print_children(id, 0, flavor, &mut lines);
        } else {
            self.print(id, 0, flavor, &mut lines);
        }
        lines.join("\n")
    }
    fn print_children(&self, id: StmtId, indent: usize, flavor: &dyn Flavor, lines: &mut Vec<String>) {
        let children = self.children(id);
        for (i, child) in children.iter().enumerate() {
            let kind = self.kind(*child);
            if matches!(kind, StatementKind::ElseIf | StatementKind::Else) {
                let closing = format!("{}}}", spaces(indent));
                if lines.last() == Some(&closing) {
                    lines.pop();
                    let mut nested = vec![];
                    self.print(*child, indent, flavor, &mut nested);
                    if let Some(first) = nested.first_mut() {
                        *first = format!("{}}} {}", spaces(indent), first.trim_start());
                    }
                    lines.extend(nested);
                    continue;
                }
            }
            self.print(*child, indent, flavor, lines);
            let top_level_function = kind == StatementKind::Function && id == self.root();
            if top_level_function && i + 1 < children.len() {
                lines.push(String::new());
            }
        }
    }
    fn print_compound(
        &self,
        id: StmtId,
        header: String,
        indent: usize,
        flavor: &dyn Flavor,
        lines: &mut Vec<String>,
    ) {
        let prefix = spaces(indent);
        if header.is_empty() {
            lines.push(format!("{prefix}{{"));
        } else {
            lines.push(format!("{prefix}{header} {{"));
        }
        self.print_children(id, indent + 1, flavor, lines);
        lines.push(format!("{prefix}}}"));
    }
    fn print(&self, id: StmtId, indent: usize, flavor: &dyn Flavor, lines: &mut Vec<String>) {
        let statement = self.get(id);
        let prefix = spaces(indent);
        let nodes = to_source(&statement.nodes);
        match statement.kind {
            StatementKind::Root => self.print_children(id, indent, flavor, lines),
            StatementKind::Block => self.print_compound(id, String::new(), indent, flavor, lines),
            StatementKind::Empty => lines.push(format!("{prefix};")),
            StatementKind::Declaration => {
                let text = self.declaration_text(&statement.vars, flavor);
                lines.push(format!("{prefix}{text};"));
            }
            StatementKind::Expression
            | StatementKind::Flow
            | StatementKind::FunctionPrototype
            | StatementKind::TypeDefinition => lines.push(format!("{prefix}{nodes};")),
            StatementKind::If => self.print_compound(id, format!("if ({nodes})"), indent, flavor, lines),
            StatementKind::ElseIf => {
                let header = format!("else if ({nodes})");
                self.print_compound(id, header, indent, flavor, lines)
            }
            StatementKind::Else => self.print_compound(id, "else".to_string(), indent, flavor, lines),
            StatementKind::For => {
                if let Some(pragma) = statement.hint.as_ref().and_then(|h| flavor.unroll(h)) {
                    lines.push(format!("{prefix}{pragma}"));
                }
                self.print_compound(id, format!("for ({nodes})"), indent, flavor, lines)
            }
            StatementKind::While => {
                self.print_compound(id, format!("while ({nodes})"), indent, flavor, lines)
            }
            StatementKind::DoWhile => {
                self.print_compound(id, "do".to_string(), indent, flavor, lines);
                if let Some(last) = lines.last_mut() {
                    last.push_str(&format!(" while ({nodes});"));
                }
            }
            StatementKind::Switch => {
                self.print_compound(id, format!("switch ({nodes})"), indent, flavor, lines)
            }
            StatementKind::Case => lines.push(format!("{prefix}{nodes}:")),
            StatementKind::Function => {
                let header = match &statement.function {
                    Some(sig) => self.signature_text(sig, flavor),
                    None => String::new(),
                };
                match self.body(id) {
                    Some(body) => {
                        lines.push(format!("{prefix}{header} {{"));
                        self.print_children(body, indent + 1, flavor, lines);
                        lines.push(format!("{prefix}}}"));
                    }
                    None => lines.push(format!("{prefix}{header} {{}}")),
                }
            }
            StatementKind::Pragma => {
                let text = statement
                    .nodes
                    .iter()
                    .filter_map(|n| n.token())
                    .map(|t| t.lexeme.clone())
                    .collect::<Vec<String>>()
                    .join(" ");
                lines.push(text);
            }
            StatementKind::Barrier => {
                lines.push(format!("{prefix}{}", flavor.barrier(&statement.nodes)))
            }
        }
    }
}

impl Display for StatementTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(self.root(), &OklFlavor))
    }
}
