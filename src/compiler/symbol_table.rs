use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Names visible while compiling one function (or the top level).
///
/// Block scopes stack inside a table: names defined in a block disappear when
/// the block is left, but their slots stay allocated so indices are never
/// reused within a function.
#[derive(Debug)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    blocks: Vec<FxHashMap<String, Symbol>>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
    /// Global slot names in slot order; only filled in the outermost table.
    global_names: Vec<String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            outer: None,
            blocks: vec![FxHashMap::default()],
            num_definitions: 0,
            free_symbols: vec![],
            global_names: vec![],
        }
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::new()
        }
    }

    pub fn take_outer(&mut self) -> Option<SymbolTable> {
        self.outer.take().map(|outer| *outer)
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    pub fn global_names(&self) -> &[String] {
        &self.global_names
    }

    pub fn enter_block(&mut self) {
        self.blocks.push(FxHashMap::default());
    }

    pub fn leave_block(&mut self) {
        if self.blocks.len() > 1 {
            self.blocks.pop();
        }
    }

    fn insert(&mut self, symbol: Symbol) -> Symbol {
        if let Some(block) = self.blocks.last_mut() {
            block.insert(symbol.name.clone(), symbol.clone());
        }
        symbol
    }

    fn insert_function_level(&mut self, symbol: Symbol) -> Symbol {
        self.blocks[0].insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    fn next_slot(&mut self, name: &str, scope: SymbolScope) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        if scope == SymbolScope::Global {
            self.global_names.push(symbol.name.clone());
        }

        symbol
    }

    /// Defines `name` in the current block. Redefining a name the block
    /// already holds reuses its slot, so closures that read the old binding
    /// see the new value.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = match self.outer {
            Some(_) => SymbolScope::Local,
            None => SymbolScope::Global,
        };

        let existing = self.blocks.last().and_then(|block| block.get(name));
        if let Some(symbol) = existing.filter(|symbol| symbol.scope == scope) {
            return symbol.clone();
        }

        let symbol = self.next_slot(name, scope);
        self.insert(symbol)
    }

    /// Defines `name` as a global at function level of the outermost table,
    /// whatever table or block this is called on.
    pub fn define_in_root(&mut self, name: &str) -> Symbol {
        match &mut self.outer {
            Some(outer) => outer.define_in_root(name),
            None => {
                let symbol = self.next_slot(name, SymbolScope::Global);
                self.insert_function_level(symbol)
            }
        }
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        self.insert_function_level(Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        })
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);

        self.insert_function_level(symbol)
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.blocks.iter().rev().find_map(|block| block.get(name)) {
            return Some(symbol.clone());
        }

        let symbol = self.outer.as_mut()?.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod test_symbol_table {
    use pretty_assertions::assert_eq;

    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));

        let mut first_local = SymbolTable::new_enclosed(global);
        assert_eq!(first_local.define("c"), symbol("c", SymbolScope::Local, 0));
        assert_eq!(first_local.define("d"), symbol("d", SymbolScope::Local, 1));

        let mut second_local = SymbolTable::new_enclosed(first_local);
        assert_eq!(second_local.define("e"), symbol("e", SymbolScope::Local, 0));
    }

    #[test]
    fn test_resolve_nested_local() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");
        first_local.define("d");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        let tests = vec![
            symbol("a", SymbolScope::Global, 0),
            symbol("b", SymbolScope::Global, 1),
            symbol("c", SymbolScope::Free, 0),
            symbol("d", SymbolScope::Free, 1),
            symbol("e", SymbolScope::Local, 0),
            symbol("f", SymbolScope::Local, 1),
        ];

        for expected in tests {
            assert_eq!(second_local.resolve(&expected.name), Some(expected));
        }

        assert_eq!(
            second_local.free_symbols(),
            &[
                symbol("c", SymbolScope::Local, 0),
                symbol("d", SymbolScope::Local, 1)
            ]
        );
    }

    #[test]
    fn test_resolve_unresolvable_free() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");

        assert_eq!(second_local.resolve("b"), None);
        assert_eq!(second_local.resolve("d"), None);
        assert!(second_local.free_symbols().is_empty());
    }

    #[test]
    fn test_builtins_resolve_everywhere() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define_builtin(1, "puts");

        let mut local = SymbolTable::new_enclosed(SymbolTable::new_enclosed(global));

        assert_eq!(local.resolve("puts"), Some(symbol("puts", SymbolScope::Builtin, 1)));
        assert!(local.free_symbols().is_empty());
    }

    #[test]
    fn test_redefinition_reuses_slot() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("len"), symbol("len", SymbolScope::Global, 1));

        let mut local = SymbolTable::new_enclosed(global);
        local.define("x");
        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(local.define("x"), symbol("x", SymbolScope::Local, 0));
    }

    #[test]
    fn test_let_after_capture_defines_new_local() {
        let mut outer = SymbolTable::new_enclosed(SymbolTable::new());
        outer.define("a");

        let mut inner = SymbolTable::new_enclosed(outer);
        assert_eq!(inner.resolve("a"), Some(symbol("a", SymbolScope::Free, 0)));
        assert_eq!(inner.define("a"), symbol("a", SymbolScope::Local, 0));
        assert_eq!(inner.resolve("a"), Some(symbol("a", SymbolScope::Local, 0)));
    }

    #[test]
    fn test_block_scopes() {
        let mut global = SymbolTable::new();
        global.define("a");

        global.enter_block();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 1));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 2));
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 1)));
        global.leave_block();

        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(global.resolve("b"), None);
        assert_eq!(global.define("c"), symbol("c", SymbolScope::Global, 3));
        assert_eq!(global.num_definitions(), 4);
        assert_eq!(global.global_names(), &["a", "a", "b", "c"]);
    }

    #[test]
    fn test_define_in_root() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.enter_block();

        let mut local = SymbolTable::new_enclosed(global);
        local.enter_block();
        assert_eq!(local.define_in_root("x"), symbol("x", SymbolScope::Global, 1));
        assert_eq!(local.resolve("x"), Some(symbol("x", SymbolScope::Global, 1)));

        let mut global = local.take_outer().unwrap();
        global.leave_block();
        assert_eq!(global.resolve("x"), Some(symbol("x", SymbolScope::Global, 1)));
        assert_eq!(global.define("x"), symbol("x", SymbolScope::Global, 1));
        assert_eq!(global.global_names(), &["a", "x"]);
    }
}
