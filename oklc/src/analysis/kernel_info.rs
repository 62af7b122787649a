use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

/// Launch metadata of one kernel.
///
/// Bounds are iteration-count expressions in terms of the kernel
/// parameters, indexed by loop dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelInfo {
    pub name: String,
    pub outer_dims: usize,
    pub inner_dims: usize,
    pub outer_bounds: Vec<String>,
    pub inner_bounds: Vec<String>,
    /// Kernels produced by splitting, in launch order.
    pub nested_kernels: Vec<KernelInfo>,
    pub native: bool,
}

pub type KernelInfoMap = BTreeMap<String, KernelInfo>;

impl KernelInfo {
    pub fn new(name: &str) -> Self {
        KernelInfo {
            name: name.to_string(),
            ..KernelInfo::default()
        }
    }
    pub fn nested_names(&self) -> Vec<&str> {
        self.nested_kernels.iter().map(|k| k.name.as_str()).collect()
    }
    /// Find `name` in this entry or its nested kernels.
    pub fn find(&self, name: &str) -> Option<&KernelInfo> {
        if self.name == name {
            return Some(self);
        }
        self.nested_kernels.iter().find_map(|k| k.find(name))
    }
}

/// Look up a kernel that may also be a nested kernel of another entry.
pub fn find_kernel<'a>(map: &'a KernelInfoMap, name: &str) -> Option<&'a KernelInfo> {
    map.values().find_map(|info| info.find(name))
}

impl Display for KernelInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.native {
            return write!(f, "{}: native", self.name);
        }
        write!(
            f,
            "{}: outer {} [{}], inner {} [{}]",
            self.name,
            self.outer_dims,
            self.outer_bounds.join(", "),
            self.inner_dims,
            self.inner_bounds.join(", ")
        )?;
        for nested in &self.nested_kernels {
            write!(f, "\n  {nested}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut info = KernelInfo::new("reduce");
        info.outer_dims = 1;
        info.inner_dims = 1;
        info.outer_bounds = vec!["n".to_string()];
        info.inner_bounds = vec!["16".to_string()];
        let mut nested = info.clone();
        nested.name = "reduce_0".to_string();
        info.nested_kernels.push(nested);
        assert_eq!(
            info.to_string(),
            "reduce: outer 1 [n], inner 1 [16]\n  reduce_0: outer 1 [n], inner 1 [16]"
        );
        let mut map = KernelInfoMap::new();
        map.insert(info.name.clone(), info);
        assert!(find_kernel(&map, "reduce_0").is_some());
        assert!(find_kernel(&map, "missing").is_none());
    }
}
