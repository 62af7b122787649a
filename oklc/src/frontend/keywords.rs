use std::collections::HashSet;

const BASE_TYPES: &[&str] = &[
    "void", "bool", "char", "short", "int", "long", "float", "double", "half", "signed",
    "unsigned", "size_t", "auto",
];

const VECTOR_BASES: &[&str] = &[
    "char", "uchar", "short", "ushort", "int", "uint", "long", "ulong", "float", "double",
];

const QUALIFIERS: &[&str] = &[
    "const",
    "volatile",
    "static",
    "extern",
    "inline",
    "register",
    "restrict",
    "__restrict__",
    "shared",
    "exclusive",
    "kernel",
];

const CONTROL: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "return", "break",
    "continue", "goto", "typedef", "struct", "class", "union", "enum",
];

/// Identifiers that only appear in kernels written directly for a backend.
const NATIVE: &[&str] = &[
    "occaOuterFor0",
    "occaOuterFor1",
    "occaOuterFor2",
    "occaInnerFor0",
    "occaInnerFor1",
    "occaInnerFor2",
    "occaGlobalFor0",
    "occaGlobalFor1",
    "occaGlobalFor2",
    "occaOuterId0",
    "occaOuterId1",
    "occaOuterId2",
    "occaInnerId0",
    "occaInnerId1",
    "occaInnerId2",
    "occaGlobalId0",
    "occaGlobalId1",
    "occaGlobalId2",
    "threadIdx",
    "blockIdx",
    "blockDim",
    "gridDim",
    "__syncthreads",
    "get_local_id",
    "get_group_id",
    "get_global_id",
];

/// Keyword and type tables of the kernel language.
///
/// Built once per configuration and only read afterwards, so a single
/// instance can be shared by compilations running on different threads.
#[derive(Clone, Debug)]
pub struct LanguageTables {
    types: HashSet<String>,
    qualifiers: HashSet<&'static str>,
    control: HashSet<&'static str>,
    native: HashSet<&'static str>,
}

impl Default for LanguageTables {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageTables {
    pub fn new() -> Self {
        let mut types: HashSet<String> = BASE_TYPES.iter().map(|t| t.to_string()).collect();
        for base in VECTOR_BASES {
            types.insert(base.to_string());
            for n in [2, 3, 4, 8, 16] {
                types.insert(format!("{base}{n}"));
            }
        }
        LanguageTables {
            types,
            qualifiers: QUALIFIERS.iter().copied().collect(),
            control: CONTROL.iter().copied().collect(),
            native: NATIVE.iter().copied().collect(),
        }
    }
    pub fn is_type(&self, word: &str) -> bool {
        self.types.contains(word)
    }
    pub fn is_qualifier(&self, word: &str) -> bool {
        self.qualifiers.contains(word)
    }
    pub fn is_control(&self, word: &str) -> bool {
        self.control.contains(word)
    }
    pub fn is_native(&self, word: &str) -> bool {
        self.native.contains(word)
    }
    /// Words that can never name a variable.
    pub fn is_reserved(&self, word: &str) -> bool {
        self.is_type(word) || self.is_qualifier(word) || self.is_control(word)
    }
}
