#![allow(unsafe_code)] // libc::qsort takes a raw C comparator

use mdb_unwind::format::BacktraceFormatter;
use mdb_unwind::Backtrace;
use std::cell::RefCell;
use std::ffi::c_void;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Captures a backtrace on its first call, from inside libc's qsort
unsafe extern "C" fn compare_and_capture(a: *const c_void, b: *const c_void) -> libc::c_int {
    CAPTURED.with(|captured| {
        let mut captured = captured.borrow_mut();
        if captured.is_none() {
            let formatter: BacktraceFormatter = BacktraceFormatter::default();
            let lines = Backtrace::capture(32).map(|bt| formatter.render(bt.frame_info())).unwrap_or_default();
            *captured = Some(lines);
        }
    });
    let (a, b) = unsafe { (*a.cast::<i32>(), *b.cast::<i32>()) };
    a.cmp(&b) as libc::c_int
}

#[inline(never)]
fn sort_with_capture(values: &mut [i32]) {
    unsafe {
        libc::qsort(
            values.as_mut_ptr().cast(),
            values.len(),
            std::mem::size_of::<i32>(),
            Some(compare_and_capture),
        );
    }
    std::hint::black_box(values);
}

#[test]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn test_walks_through_libc_callback() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut values = vec![5, 3, 9, 1, 7];
    sort_with_capture(&mut values);
    assert_eq!(values, vec![1, 3, 5, 7, 9]);

    let lines = CAPTURED.with(|c| c.borrow_mut().take()).expect("comparator ran");
    println!("{}", lines.join("\n"));

    let comparator = lines
        .iter()
        .position(|l| l.contains("compare_and_capture"))
        .expect("comparator frame present");
    let caller = lines
        .iter()
        .position(|l| l.contains("sort_with_capture"))
        .expect("walk continues past libc into the qsort caller");
    assert_eq!(comparator, 0);
    assert!(comparator < caller);
    assert!(
        lines[comparator + 1..caller].iter().any(|l| l.contains("libc")),
        "qsort frames sit between comparator and caller"
    );
    println!("✅ unwound through libc in {} frames", lines.len());
}
