//! End-to-end request lifecycle scenarios: a threaded engine over the
//! filesystem provider, driven the way a frame loop would drive it.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fetchline::{Config, ConfigBuilder, Engine, FsProvider, IoProvider, Request, Response};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Event {
    opened: bool,
    fetched: bool,
    paused: bool,
    failed: bool,
    finished: bool,
    cancelled: bool,
    content_size: u64,
    content_offset: u64,
    fetched_size: u64,
    data: Vec<u8>,
}

fn snapshot(r: &Response<'_>) -> Event {
    Event {
        opened: r.opened,
        fetched: r.fetched,
        paused: r.paused,
        failed: r.failed,
        finished: r.finished,
        cancelled: r.cancelled,
        content_size: r.content_size,
        content_offset: r.content_offset,
        fetched_size: r.fetched_size,
        data: r.data().to_vec(),
    }
}

type Events = Rc<RefCell<Vec<Event>>>;

fn recorder(events: &Events) -> impl FnMut(&mut Response<'_>) + 'static {
    let events = Rc::clone(events);
    move |r| events.borrow_mut().push(snapshot(r))
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

/// Pump the engine once per simulated frame until `done` holds. The worker
/// threads run at their own pace, so results land on whichever pump follows
/// their completion.
fn pump_until<P: IoProvider>(engine: &mut Engine<P>, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out pumping the engine");
        engine.pump();
        std::thread::sleep(Duration::from_micros(200));
    }
}

fn finished(events: &Events) -> bool {
    events.borrow().iter().any(|e| e.finished)
}

#[test]
fn prebound_buffer_loads_whole_file_in_one_response() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "four.bin", b"abcd");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 4]))
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 1, "exactly one response: {events:?}");
    let e = &events[0];
    assert!(e.fetched && e.finished && !e.opened && !e.failed);
    assert_eq!(e.content_size, 4);
    assert_eq!(e.content_offset, 0);
    assert_eq!(e.fetched_size, 4);
    assert_eq!(e.data, b"abcd");
}

#[test]
fn unbuffered_request_reports_opened_then_fetches() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "four.bin", b"wxyz");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&events);

    engine
        .send(Request::new(&path, move |r| {
            if r.opened {
                // Size is now known; provide a buffer that fits exactly.
                r.bind_buffer(vec![0; r.content_size as usize]);
            }
            log.borrow_mut().push(snapshot(r));
        }))
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 2, "opened then fetched: {events:?}");
    assert!(events[0].opened && !events[0].finished);
    assert_eq!(events[0].content_size, 4);
    assert!(events[1].fetched && events[1].finished);
    assert_eq!(events[1].content_offset, 0);
    assert_eq!(events[1].fetched_size, 4);
    assert_eq!(events[1].data, b"wxyz");
}

#[test]
fn small_buffer_streams_in_monotonic_chunks() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "ten.bin", b"0123456789");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 4]))
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 3, "three chunks: {events:?}");
    assert_eq!((events[0].content_offset, events[0].fetched_size), (0, 4));
    assert_eq!((events[1].content_offset, events[1].fetched_size), (4, 4));
    assert_eq!((events[2].content_offset, events[2].fetched_size), (8, 2));
    assert!(events.iter().all(|e| e.fetched && e.content_size == 10));
    assert!(!events[0].finished && !events[1].finished && events[2].finished);
    assert_eq!(events[0].data, b"0123");
    assert_eq!(events[1].data, b"4567");
    assert_eq!(events[2].data, b"89");

    // The chunks reassemble the file.
    let total: u64 = events.iter().map(|e| e.fetched_size).sum();
    assert_eq!(total, 10);
}

#[test]
fn missing_file_fails_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no-such-file.bin");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    let handle = engine
        .send(Request::new(path.to_str().unwrap(), recorder(&events)).buffer(vec![0; 16]))
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    let e = &events[0];
    assert!(e.failed && e.finished && !e.cancelled && !e.fetched);
    assert_eq!(e.content_size, 0);
    assert!(!engine.is_active(handle));
}

#[test]
fn cancel_from_the_first_chunk_callback() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "ten.bin", b"0123456789");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&events);

    let handle = engine
        .send(
            Request::new(&path, move |r| {
                log.borrow_mut().push(snapshot(r));
                if r.fetched && r.content_offset == 0 {
                    r.cancel();
                }
            })
            .buffer(vec![0; 4]),
        )
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 2, "chunk then cancellation: {events:?}");
    assert!(events[0].fetched && !events[0].finished);
    let last = &events[1];
    assert!(last.failed && last.cancelled && last.finished);
    assert!(!engine.is_active(handle));
}

#[test]
fn cancel_between_pumps_discards_the_raced_chunk() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "ten.bin", b"0123456789");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    let handle = engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 4]))
        .unwrap();
    pump_until(&mut engine, || !events.borrow().is_empty());
    engine.cancel(handle);
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    let last = events.last().unwrap();
    assert!(last.failed && last.cancelled && last.finished);
    // A read the cancel raced with may surface as one more chunk, but
    // never past the one in flight.
    assert!(events.len() <= 3);
    assert!(!engine.is_active(handle));
}

#[test]
fn pause_parks_and_resume_continues_from_the_same_offset() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "twelve.bin", b"0123456789ab");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&events);

    let handle = engine
        .send(
            Request::new(&path, move |r| {
                log.borrow_mut().push(snapshot(r));
                if r.fetched && r.content_offset == 0 {
                    r.pause();
                }
            })
            .buffer(vec![0; 4]),
        )
        .unwrap();

    // Park after the first chunk; the request then reports paused on every
    // pump instead of making progress.
    pump_until(&mut engine, || {
        events.borrow().iter().filter(|e| e.paused).count() >= 3
    });
    assert!(
        !events.borrow().iter().any(|e| e.finished),
        "no progress while paused"
    );
    assert!(engine.is_active(handle));

    engine.resume(handle);
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    let chunks: Vec<_> = events.iter().filter(|e| e.fetched).collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!((chunks[0].content_offset, chunks[0].fetched_size), (0, 4));
    assert_eq!((chunks[1].content_offset, chunks[1].fetched_size), (4, 4));
    assert_eq!((chunks[2].content_offset, chunks[2].fetched_size), (8, 4));
    assert!(chunks[2].finished);
}

#[test]
fn single_lane_serializes_a_channel() {
    let dir = TempDir::new().unwrap();
    let path_a = write_file(&dir, "a.bin", b"aaaa");
    let path_b = write_file(&dir, "b.bin", b"bbbb");
    let mut engine = Engine::new(
        ConfigBuilder::new().lanes(1).build().unwrap(),
        FsProvider,
    )
    .unwrap();

    // Tag events with the request they belong to.
    let order: Rc<RefCell<Vec<(u8, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    for (tag, path) in [(b'a', &path_a), (b'b', &path_b)] {
        let log = Rc::clone(&order);
        engine
            .send(Request::new(path, move |r| {
                log.borrow_mut().push((tag, r.finished));
            })
            .buffer(vec![0; 8]))
            .unwrap();
    }

    let done = Rc::clone(&order);
    pump_until(&mut engine, || {
        done.borrow().iter().filter(|(_, fin)| *fin).count() == 2
    });

    let order = order.borrow();
    // With one lane, request b cannot produce any response until a is done.
    let a_finished = order.iter().position(|&(t, fin)| t == b'a' && fin).unwrap();
    let b_first = order.iter().position(|&(t, _)| t == b'b').unwrap();
    assert!(
        a_finished < b_first,
        "second request started before the first finished: {order:?}"
    );
}

#[test]
fn channel_completes_requests_in_send_order() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(
        ConfigBuilder::new().lanes(2).build().unwrap(),
        FsProvider,
    )
    .unwrap();

    let order: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    for tag in 0..4u8 {
        let path = write_file(&dir, &format!("f{tag}.bin"), &[tag; 6]);
        let log = Rc::clone(&order);
        engine
            .send(Request::new(&path, move |r| {
                if r.finished {
                    log.borrow_mut().push(tag);
                }
            })
            .buffer(vec![0; 8]))
            .unwrap();
    }

    let done = Rc::clone(&order);
    pump_until(&mut engine, || done.borrow().len() == 4);
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn requests_spread_across_channels_all_complete() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(
        ConfigBuilder::new().channels(2).lanes(2).build().unwrap(),
        FsProvider,
    )
    .unwrap();

    let done_count: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
    for i in 0..10u32 {
        let path = write_file(&dir, &format!("g{i}.bin"), &[i as u8; 5]);
        let log = Rc::clone(&done_count);
        engine
            .send(
                Request::new(&path, move |r| {
                    if r.finished {
                        assert!(!r.failed);
                        *log.borrow_mut() += 1;
                    }
                })
                .channel(i % 2)
                .buffer(vec![0; 16]),
            )
            .unwrap();
    }

    let done = Rc::clone(&done_count);
    pump_until(&mut engine, || *done.borrow() == 10);
}

#[test]
fn unbind_returns_the_buffer_with_the_loaded_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "payload.bin", b"payload!");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let reclaimed: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&reclaimed);

    engine
        .send(
            Request::new(&path, move |r| {
                if r.finished {
                    *slot.borrow_mut() = r.unbind_buffer();
                }
            })
            .buffer(vec![0; 8]),
        )
        .unwrap();

    let done = Rc::clone(&reclaimed);
    pump_until(&mut engine, || done.borrow().is_some());
    let buffer = reclaimed.borrow_mut().take().unwrap();
    assert_eq!(buffer, b"payload!");
}

#[test]
fn user_data_persists_across_chunk_callbacks() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "ten.bin", b"0123456789");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let final_count: Rc<RefCell<u64>> = Rc::new(RefCell::new(0));
    let out = Rc::clone(&final_count);

    engine
        .send(
            Request::new(&path, move |r| {
                // Count callbacks inside the request's own user-data block.
                let bytes: [u8; 8] = r.user_data()[..8].try_into().unwrap();
                let count = u64::from_le_bytes(bytes) + 1;
                r.user_data_mut()[..8].copy_from_slice(&count.to_le_bytes());
                if r.finished {
                    *out.borrow_mut() = count;
                }
            })
            .buffer(vec![0; 4])
            .user_data(&0u64.to_le_bytes()),
        )
        .unwrap();

    let done = Rc::clone(&final_count);
    pump_until(&mut engine, || *done.borrow() != 0);
    assert_eq!(*final_count.borrow(), 3);
}

#[test]
fn empty_file_with_prebound_buffer_finishes_in_one_response() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty.bin", b"");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 4]))
        .unwrap();
    pump_until(&mut engine, || finished(&events));

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert!(events[0].finished && !events[0].failed);
    assert_eq!(events[0].content_size, 0);
    assert_eq!(events[0].fetched_size, 0);
}

#[test]
fn finished_handle_is_stale_and_its_slot_is_reused() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a.bin", b"abcd");
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    let first = engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 4]))
        .unwrap();
    pump_until(&mut engine, || finished(&events));
    assert!(!engine.is_active(first));

    // The next request reuses the slot under a new generation; the old
    // handle must stay dead and must not alias the new request.
    let events2: Events = Rc::new(RefCell::new(Vec::new()));
    let second = engine
        .send(Request::new(&path, recorder(&events2)).buffer(vec![0; 4]))
        .unwrap();
    assert_ne!(first, second);
    assert!(!engine.is_active(first));
    assert!(engine.is_active(second));
    engine.cancel(first); // no-op on the stale handle
    pump_until(&mut engine, || finished(&events2));
    assert!(events2.borrow().last().unwrap().fetched);
}

#[test]
fn backlog_absorbs_more_requests_than_lanes() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(
        ConfigBuilder::new().max_requests(16).lanes(2).build().unwrap(),
        FsProvider,
    )
    .unwrap();

    let done_count: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
    for i in 0..8u32 {
        let path = write_file(&dir, &format!("h{i}.bin"), &[1; 3]);
        let log = Rc::clone(&done_count);
        engine
            .send(Request::new(&path, move |r| {
                if r.finished {
                    *log.borrow_mut() += 1;
                }
            })
            .buffer(vec![0; 4]))
            .unwrap();
    }

    let done = Rc::clone(&done_count);
    pump_until(&mut engine, || *done.borrow() == 8);
}

#[test]
fn dropping_the_engine_mid_stream_delivers_no_further_callbacks() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "big.bin", &[7u8; 1024]);
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let events: Events = Rc::new(RefCell::new(Vec::new()));

    engine
        .send(Request::new(&path, recorder(&events)).buffer(vec![0; 16]))
        .unwrap();
    pump_until(&mut engine, || !events.borrow().is_empty());
    let seen = events.borrow().len();
    drop(engine);
    assert_eq!(events.borrow().len(), seen);
    assert!(!events.borrow().iter().any(|e| e.finished));
}

#[test]
fn path_is_reported_back_verbatim() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "exact name.bin", b"x");
    let expected = path.clone();
    let mut engine = Engine::new(Config::default(), FsProvider).unwrap();
    let ok: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));
    let out = Rc::clone(&ok);

    engine
        .send(Request::new(&path, move |r| {
            if r.finished {
                assert_eq!(r.path(), expected);
                assert!(Path::new(r.path()).exists());
                *out.borrow_mut() = true;
            }
        })
        .buffer(vec![0; 4]))
        .unwrap();

    let done = Rc::clone(&ok);
    pump_until(&mut engine, || *done.borrow());
}
