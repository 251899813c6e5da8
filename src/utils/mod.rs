//! Utility Module
//!
//! - [`interner`]: String interning for pass names
//!
//! # String Interning
//!
//! Pass names are compared on every source batch of every drawable. They are
//! interned once and compared as integer [`Symbol`]s afterwards.
//!
//! ```rust,ignore
//! use myth_batch::utils::interner;
//!
//! let base = interner::intern("base");
//! assert_eq!(base, interner::intern("base")); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;
