use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use coreactor::{Error, Handler, Interest, MpscStorage, PollHint, Poller, signal};
use futures::executor::block_on;
use pretty_assertions::assert_eq;

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn write_byte(fd: &OwnedFd) {
    let buf = [1u8; 1];
    let wrote = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), 1) };
    assert_eq!(wrote, 1);
}

fn quick_poller() -> Poller {
    Poller::builder()
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap()
}

fn noop(_fd: RawFd, _events: Interest) -> PollHint {
    PollHint::None
}

#[test]
fn test_registration_bookkeeping() {
    let poller = quick_poller();
    let (read, _write) = pipe();
    let fd = read.as_raw_fd();

    assert!(poller.valid());
    assert!(poller.is_empty());

    poller.add(fd, Interest::READ, noop).unwrap();
    assert!(poller.contains(fd));
    assert_eq!(poller.len(), 1);
    assert_eq!(poller.interest(fd), Some(Interest::READ));

    assert!(matches!(
        poller.add(fd, Interest::READ, noop),
        Err(Error::AlreadyRegistered(rejected)) if rejected == fd
    ));

    poller
        .modify(fd, Interest::READ | Interest::EDGE, None)
        .unwrap();
    assert_eq!(poller.interest(fd), Some(Interest::READ | Interest::EDGE));

    poller.remove(fd).unwrap();
    assert!(!poller.contains(fd));
    assert!(matches!(poller.remove(fd), Err(Error::NotRegistered(_))));
    assert!(matches!(
        poller.modify(fd, Interest::READ, None),
        Err(Error::NotRegistered(_))
    ));
}

#[test]
fn test_add_rejects_invalid_descriptor() {
    let poller = quick_poller();

    let error = poller.add(-1, Interest::READ, noop).unwrap_err();
    assert_eq!(error.as_label(), "io");
    assert!(poller.is_empty());
}

#[test]
fn test_poll_times_out_without_readiness() {
    let poller = quick_poller();
    let (read, _write) = pipe();
    poller.add(read.as_raw_fd(), Interest::READ, noop).unwrap();

    let started = Instant::now();
    assert_eq!(poller.poll().unwrap(), 0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_poll_dispatches_readable() {
    let poller = quick_poller();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    poller
        .add(fd, Interest::READ, move |fd: RawFd, events: Interest| {
            seen_clone.lock().unwrap().push((fd, events.is_readable()));
            PollHint::None
        })
        .unwrap();

    write_byte(&write);
    assert_eq!(poller.poll().unwrap(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![(fd, true)]);
}

#[test]
fn test_delete_hint_removes_registration() {
    let poller = quick_poller();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    poller
        .add(fd, Interest::READ, move |_fd: RawFd, _events: Interest| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            PollHint::Delete
        })
        .unwrap();

    write_byte(&write);
    poller.poll().unwrap();
    assert!(!poller.contains(fd));

    // Level-triggered data is still pending, but nobody listens any more.
    assert_eq!(poller.poll().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_modify_hint_changes_interest() {
    let poller = quick_poller();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    poller
        .add(fd, Interest::READ, move |_fd: RawFd, _events: Interest| {
            match calls_clone.fetch_add(1, Ordering::SeqCst) {
                0 => PollHint::Modify(Interest::READ | Interest::ONESHOT),
                _ => PollHint::None,
            }
        })
        .unwrap();

    write_byte(&write);
    assert_eq!(poller.poll().unwrap(), 1);
    assert_eq!(poller.interest(fd), Some(Interest::READ | Interest::ONESHOT));

    // Re-armed one-shot fires once more, then stays silent.
    assert_eq!(poller.poll().unwrap(), 1);
    assert_eq!(poller.poll().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dispatch_proxy_intercepts_handlers() {
    let proxied = Arc::new(AtomicUsize::new(0));
    let proxied_clone = proxied.clone();

    let poller = Poller::builder()
        .timeout(Duration::from_millis(20))
        .dispatch(move |handler: &dyn Handler, fd: RawFd, events: Interest| {
            proxied_clone.fetch_add(1, Ordering::SeqCst);
            handler.handle(fd, events)
        })
        .build()
        .unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let handled_clone = handled.clone();
    let (read, write) = pipe();
    poller
        .add(
            read.as_raw_fd(),
            Interest::READ,
            move |_fd: RawFd, _events: Interest| {
                handled_clone.fetch_add(1, Ordering::SeqCst);
                PollHint::Delete
            },
        )
        .unwrap();

    write_byte(&write);
    poller.poll().unwrap();

    assert_eq!(proxied.load(Ordering::SeqCst), 1);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_notifies_handlers_once() {
    let poller = quick_poller();
    let (first, _first_write) = pipe();
    let (second, _second_write) = pipe();

    let shutdowns = Arc::new(AtomicUsize::new(0));
    for fd in [first.as_raw_fd(), second.as_raw_fd()] {
        let shutdowns = shutdowns.clone();
        poller
            .add(fd, Interest::READ, move |_fd: RawFd, events: Interest| {
                if events.is_empty() {
                    shutdowns.fetch_add(1, Ordering::SeqCst);
                }
                PollHint::None
            })
            .unwrap();
    }

    poller.shutdown();
    assert!(!poller.valid());
    assert!(poller.is_empty());
    assert_eq!(shutdowns.load(Ordering::SeqCst), 2);

    poller.shutdown();
    assert_eq!(shutdowns.load(Ordering::SeqCst), 2);

    assert!(matches!(
        poller.add(first.as_raw_fd(), Interest::READ, noop),
        Err(Error::Shutdown)
    ));
    assert_eq!(poller.poll().unwrap(), 0);
}

#[test]
fn test_readiness_releases_signal_across_threads() {
    let poller = Arc::new(quick_poller());
    let (read, write) = pipe();

    let (tx, mut rx) = signal::<MpscStorage>();
    poller
        .add(
            read.as_raw_fd(),
            Interest::READ,
            move |_fd: RawFd, events: Interest| {
                if events.is_empty() {
                    tx.stop();
                    return PollHint::Delete;
                }
                tx.release();
                PollHint::Delete
            },
        )
        .unwrap();

    let consumer = thread::spawn(move || block_on(rx.recv()));

    write_byte(&write);
    while !consumer.is_finished() {
        poller.poll().unwrap();
    }

    assert!(consumer.join().unwrap());
}

#[test]
fn test_shutdown_wakes_waiter_dead() {
    let poller = quick_poller();
    let (read, _write) = pipe();

    let (tx, mut rx) = signal::<MpscStorage>();
    poller
        .add(
            read.as_raw_fd(),
            Interest::READ,
            move |_fd: RawFd, events: Interest| {
                if events.is_empty() {
                    tx.stop();
                }
                PollHint::None
            },
        )
        .unwrap();

    let consumer = thread::spawn(move || block_on(rx.recv()));
    thread::sleep(Duration::from_millis(10));
    poller.shutdown();

    assert!(!consumer.join().unwrap());
}

#[test]
fn test_add_racing_shutdown_is_never_orphaned() {
    use std::sync::Barrier;
    use std::sync::atomic::AtomicBool;

    for _ in 0..200 {
        let poller = Arc::new(quick_poller());
        let (read, _write) = pipe();
        let fd = read.as_raw_fd();
        let barrier = Arc::new(Barrier::new(2));
        let notified = Arc::new(AtomicBool::new(false));

        let registrant = {
            let poller = poller.clone();
            let barrier = barrier.clone();
            let notified = notified.clone();
            thread::spawn(move || {
                barrier.wait();
                poller.add(fd, Interest::READ, move |_fd: RawFd, events: Interest| {
                    if events.is_empty() {
                        notified.store(true, Ordering::SeqCst);
                    }
                    PollHint::None
                })
            })
        };

        barrier.wait();
        poller.shutdown();

        match registrant.join().unwrap() {
            // Registered before shutdown drained: the handler was told.
            Ok(()) => assert!(notified.load(Ordering::SeqCst)),
            Err(error) => {
                assert!(matches!(error, Error::Shutdown), "unexpected {error}");
                assert!(!notified.load(Ordering::SeqCst));
            }
        }
        assert!(poller.is_empty());
    }
}
