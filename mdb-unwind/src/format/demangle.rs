//! Symbol demangling

use cpp_demangle::{DemangleOptions, Symbol};
use rustc_demangle::try_demangle;

/// Turns a linker symbol into a readable name
///
/// Returns `None` when the name is not in a recognized mangling scheme.
pub trait Demangler: Send + Sync {
    fn demangle(&self, raw: &str) -> Option<String>;
}

/// Demangles Rust legacy (`_ZN...E`) and v0 (`_R...`) symbols
///
/// Output omits the trailing hash, e.g. `core::ptr::drop_in_place`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustDemangler;

impl Demangler for RustDemangler {
    fn demangle(&self, raw: &str) -> Option<String> {
        try_demangle(raw).ok().map(|d| format!("{d:#}"))
    }
}

/// Demangles Itanium C++ ABI symbols (`_Z...`)
#[derive(Debug, Default, Clone, Copy)]
pub struct CppDemangler;

impl Demangler for CppDemangler {
    fn demangle(&self, raw: &str) -> Option<String> {
        Symbol::new(raw).ok()?.demangle(&DemangleOptions::default()).ok()
    }
}

/// Rust first, then Itanium C++
///
/// Legacy Rust symbols are also well-formed Itanium names, so the order
/// matters: trying C++ first would print the `h<hash>` path segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolDemangler;

impl Demangler for SymbolDemangler {
    fn demangle(&self, raw: &str) -> Option<String> {
        RustDemangler.demangle(raw).or_else(|| CppDemangler.demangle(raw))
    }
}

impl<F> Demangler for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn demangle(&self, raw: &str) -> Option<String> {
        self(raw)
    }
}
