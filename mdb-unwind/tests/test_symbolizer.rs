use mdb_unwind::format::{Demangler, RustDemangler};
use mdb_unwind::maps::{Maps, ProcMaps};
use mdb_unwind::unwinding::{ElfSymbolCache, ModuleSymbols, SymbolLookup};

#[inline(never)]
fn well_known_target(x: u64) -> u64 {
    std::hint::black_box(x.wrapping_mul(31))
}

#[test]
fn test_module_symbols_load_for_test_binary() {
    let exe = std::env::current_exe().expect("Failed to get current exe");
    println!("Loading symbols from: {}", exe.display());

    let symbols = ModuleSymbols::load(&exe);
    assert!(symbols.is_ok(), "Failed to load symbols: {:?}", symbols.err());
    assert!(!symbols.unwrap().is_empty());
}

#[test]
fn test_resolves_and_demangles_function_name() {
    assert_eq!(well_known_target(2), 62);

    let maps = ProcMaps::local();
    maps.parse().expect("Failed to parse /proc/self/maps");

    let target = well_known_target as usize as u64;
    let map = maps.find(target).expect("function should be mapped");
    println!("Target 0x{target:x} in {} (offset 0x{:x})", map.name, map.offset);

    let cache = ElfSymbolCache::new();
    let (raw, offset) = cache.function_name(&map, target + 4).expect("symbol should resolve");
    assert_eq!(offset, 4);

    let demangled = RustDemangler.demangle(&raw).unwrap_or(raw);
    println!("  Resolved: {demangled}+{offset}");
    assert!(demangled.ends_with("well_known_target"), "got {demangled}");
}
