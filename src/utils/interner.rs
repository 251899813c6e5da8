//! Global String Interner
//!
//! Maps pass names to compact integer [`Symbol`]s. Technique pass tables,
//! scene passes and pipeline state keys all store symbols instead of strings.

use lasso::{Spur, ThreadedRodeo};
use once_cell::sync::Lazy;

static INTERNER: Lazy<ThreadedRodeo> = Lazy::new(ThreadedRodeo::new);

/// Compact integer identifier of an interned string.
pub type Symbol = Spur;

/// Pass names used by the stock scene passes.
pub const STOCK_PASS_NAMES: [&str; 7] = [
    "base", "litbase", "light", "alpha", "litalpha", "shadow", "deferred",
];

/// Interns a string, returning its symbol.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Returns the symbol of an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Interns the stock pass names ahead of the first frame.
pub fn preload_pass_names() {
    for name in STOCK_PASS_NAMES {
        intern(name);
    }
}
