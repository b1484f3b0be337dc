use std::collections::HashMap;

/// Name-to-address lookup for kernel symbols.
pub trait SymbolResolver {
    fn lookup(&self, name: &str) -> Option<u64>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<u64>,
{
    fn lookup(&self, name: &str) -> Option<u64> {
        self(name)
    }
}

/// Resolve `name`, falling back to each ABI-prefixed spelling in turn, since
/// the same routine is exported under different names across kernel builds.
pub fn resolve_symbol<R: SymbolResolver + ?Sized>(
    resolver: &R,
    name: &str,
    prefixes: &[String],
) -> Option<u64> {
    resolver.lookup(name).or_else(|| {
        prefixes
            .iter()
            .find_map(|prefix| resolver.lookup(&format!("{prefix}{name}")))
    })
}

/// In-memory symbol table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, addr: u64) {
        self.symbols.insert(name.into(), addr);
    }
}

impl SymbolResolver for SymbolTable {
    fn lookup(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for SymbolTable {
    fn from_iter<T: IntoIterator<Item = (S, u64)>>(iter: T) -> Self {
        Self {
            symbols: iter.into_iter().map(|(n, a)| (n.into(), a)).collect(),
        }
    }
}
