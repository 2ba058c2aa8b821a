//! Name tables used by the semantic analyzer.
//!
//! [`ModuleScope`] holds every top-level name (functions, externs, TLS
//! globals, memory labels) in a single namespace. [`LocalScope`] holds the
//! locals of the function being analyzed; it is flat, so a name can be
//! declared at most once per function regardless of nesting.

use std::collections::HashMap;

use prewasm_types::ast::{ExternId, FuncId, LocalId, TlsId};

// ══════════════════════════════════════════════════════════════════════════════
// Module scope
// ══════════════════════════════════════════════════════════════════════════════

/// What a module-scope name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleRef {
    Function(FuncId),
    Extern(ExternId),
    Tls(TlsId),
    /// A memory label, already resolved to its address.
    Label(u32),
}

impl ModuleRef {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Extern(_) => "extern",
            Self::Tls(_) => "thread-local",
            Self::Label(_) => "memory label",
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleScope {
    names: HashMap<String, ModuleRef>,
}

impl ModuleScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. Returns the existing binding if the name is taken.
    pub fn define(&mut self, name: &str, target: ModuleRef) -> Result<(), ModuleRef> {
        match self.names.get(name) {
            Some(existing) => Err(*existing),
            None => {
                self.names.insert(name.to_string(), target);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleRef> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Local scope
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct LocalScope {
    names: HashMap<String, LocalId>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `id`. Returns `false` if the name is already declared.
    pub fn define(&mut self, name: &str, id: LocalId) -> bool {
        if self.names.contains_key(name) {
            return false;
        }
        self.names.insert(name.to_string(), id);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<LocalId> {
        self.names.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_redefinition_reports_existing() {
        let mut scope = ModuleScope::new();
        assert!(scope.define("main", ModuleRef::Function(FuncId(0))).is_ok());
        assert_eq!(
            scope.define("main", ModuleRef::Label(8)),
            Err(ModuleRef::Function(FuncId(0)))
        );
        assert_eq!(scope.lookup("main"), Some(ModuleRef::Function(FuncId(0))));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_local_scope_rejects_redeclaration() {
        let mut scope = LocalScope::new();
        assert!(scope.define("x", LocalId(0)));
        assert!(!scope.define("x", LocalId(1)));
        assert_eq!(scope.lookup("x"), Some(LocalId(0)));
        assert_eq!(scope.lookup("y"), None);
    }
}
