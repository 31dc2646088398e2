use mdb_unwind::context::init_state;
use mdb_unwind::format::{BacktraceFormatter, VecSink};
use mdb_unwind::{unwind, unwind_log, Backtrace, FrameData, InitState};
use std::thread;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[inline(never)]
fn capture_from_nested_call(max_frames: usize) -> Backtrace {
    std::hint::black_box(());
    Backtrace::capture(max_frames).expect("capture should succeed")
}

#[test]
fn test_capture_is_bounded_and_paired() {
    init_logging();

    for max_frames in [1, 2, 5, 32] {
        let bt = capture_from_nested_call(max_frames);
        println!("max_frames={max_frames} -> {} frames", bt.len());

        assert!(!bt.is_empty());
        assert!(bt.len() <= max_frames);
        assert_eq!(bt.frames().len(), bt.frame_info().len());
        for (pc, info) in bt.frames().iter().zip(bt.frame_info()) {
            assert_eq!(*pc, info.pc);
        }
    }
}

#[test]
fn test_first_frame_is_the_caller() {
    init_logging();

    let bt = capture_from_nested_call(4);
    let first = &bt.frame_info()[0];
    let module = first.map_info.as_ref().expect("capture site is mapped");
    assert!(module.flags.exec);

    let lines = BacktraceFormatter::new(mdb_unwind::SymbolDemangler).render(bt.frame_info());
    println!("{}", lines.join("\n"));
    assert!(lines[0].contains("capture_from_nested_call"), "frame 0 should be the caller: {}", lines[0]);
    assert!(lines.iter().all(|l| !l.contains("Backtrace::capture")));
}

#[test]
fn test_unwind_entry_point() {
    init_logging();

    let mut frames = Vec::new();
    let mut frame_info: Vec<FrameData> = Vec::new();
    assert!(unwind(&mut frames, &mut frame_info, 16));
    assert_eq!(init_state(), InitState::Ready);
    assert!(frames.len() <= 16);
    assert_eq!(frames.len(), frame_info.len());

    // Goes to the log facade; must not panic.
    unwind_log(&frame_info);

    let sink = VecSink::new();
    BacktraceFormatter::new(mdb_unwind::SymbolDemangler).log(&frame_info, &sink);
    assert_eq!(sink.lines().len(), frame_info.len());
}

#[test]
fn test_zero_frames_fails_with_empty_outputs() {
    let mut frames = vec![0x1234];
    let mut frame_info = vec![FrameData::default()];

    assert!(!unwind(&mut frames, &mut frame_info, 0));
    assert!(frames.is_empty());
    assert!(frame_info.is_empty());
}

#[test]
fn test_concurrent_captures() {
    init_logging();

    let results: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    (0..50).all(|_| {
                        let mut frames = Vec::new();
                        let mut frame_info = Vec::new();
                        unwind(&mut frames, &mut frame_info, 8)
                            && frames.len() == frame_info.len()
                            && frames.len() <= 8
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|ok| *ok));
    assert_eq!(init_state(), InitState::Ready);
    println!("✅ {} threads captured concurrently", results.len());
}
