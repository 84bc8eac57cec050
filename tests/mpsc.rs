mod util;

use rhizome::{Chain, MpscQueue, PushError};
use rhizome_alloc::{FailAfter, Tracking};
use std::{
    collections::VecDeque,
    ops::Range,
    sync::{mpsc, Arc, Barrier},
    thread,
    time::Duration,
};
use util::{if_miri, trace_init};

const WAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn fifo_single_producer() {
    trace_init();
    let q = MpscQueue::new();
    for value in ["a", "b", "c"] {
        q.push(value).unwrap();
    }

    let chain = q.flush().expect("three values were pushed");
    assert_eq!(chain.collect::<Vec<_>>(), vec!["a", "b", "c"]);
}

#[test]
fn fresh_queue_is_empty() {
    trace_init();
    let q = MpscQueue::<u64>::new();
    assert!(q.is_empty());
    // must not block.
    assert!(q.flush().is_none());
    assert!(q.is_empty());
}

#[test]
fn empty_after_drain() {
    trace_init();
    let q = MpscQueue::new();
    for round in 0..5 {
        for i in 0..round {
            q.push(i).unwrap();
        }
        drop(q.flush());
        assert!(q.is_empty(), "round {round}");
        assert!(q.flush().is_none(), "round {round}");
    }
}

#[test]
fn no_loss_under_concurrency() {
    trace_init();
    const PRODUCERS: usize = 8;
    let per_producer = if_miri(20, 10_000);

    let alloc = Tracking::new();
    let q = MpscQueue::new_in(alloc.clone());
    let start = Barrier::new(PRODUCERS);
    let mut seen = Vec::with_capacity(PRODUCERS * per_producer);

    thread::scope(|scope| {
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let (q, start) = (&q, &start);
                scope.spawn(move || {
                    start.wait();
                    for i in 0..per_producer {
                        q.push((producer, i)).expect("out of memory");
                    }
                })
            })
            .collect();

        // drain concurrently with the producers. a producer that panics
        // stops pushing, so stop once they have all exited rather than once
        // every value has arrived.
        loop {
            let done = producers.iter().all(|producer| producer.is_finished());
            match q.flush() {
                Some(batch) => seen.extend(batch),
                None if done => break,
                None => thread::yield_now(),
            }
        }

        for producer in producers {
            producer.join().expect("producer panicked");
        }
    });

    assert!(q.is_empty());
    assert_eq!(seen.len(), PRODUCERS * per_producer);

    // each producer's values arrive in push order, exactly once.
    let mut next = [0; PRODUCERS];
    for (producer, i) in seen {
        assert_eq!(i, next[producer], "producer {producer} out of order");
        next[producer] += 1;
    }
    assert!(next.iter().all(|&n| n == per_producer));

    drop(q);
    assert_eq!(alloc.outstanding(), 0);
    assert_eq!(alloc.allocations(), PRODUCERS * per_producer + 1);
}

#[test]
fn blocked_consumer_wakes() {
    trace_init();
    let q = Arc::new(MpscQueue::new());
    let (tx, rx) = mpsc::channel();
    let (waiting_tx, waiting_rx) = mpsc::channel();

    let consumer = thread::spawn({
        let q = q.clone();
        move || {
            waiting_tx.send(()).unwrap();
            let batch = q.flush_wait().collect::<Vec<_>>();
            tx.send(batch).unwrap();
        }
    });

    waiting_rx.recv_timeout(WAKE_TIMEOUT).unwrap();
    // give the consumer a chance to actually block.
    thread::sleep(Duration::from_millis(50));
    q.push(7u32).unwrap();

    let batch = rx
        .recv_timeout(WAKE_TIMEOUT)
        .expect("consumer was not woken by the push");
    assert_eq!(batch, vec![7]);
    consumer.join().unwrap();
    assert!(q.is_empty());
}

#[test]
fn shutdown_with_poison_value() {
    trace_init();

    #[derive(Debug, PartialEq)]
    enum Msg {
        Work(u32),
        Shutdown,
    }

    let q = MpscQueue::new();
    let received = thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            let mut received = Vec::new();
            loop {
                for msg in q.flush_wait() {
                    match msg {
                        Msg::Work(n) => received.push(n),
                        Msg::Shutdown => return received,
                    }
                }
            }
        });

        for n in 0..100 {
            q.push(Msg::Work(n)).unwrap();
        }
        q.push(Msg::Shutdown).unwrap();
        consumer.join().unwrap()
    });

    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

#[test]
fn teardown_releases_everything() {
    trace_init();
    let alloc = Tracking::new();
    let payload = Arc::new(());

    let q = MpscQueue::new_in(alloc.clone());
    for _ in 0..64 {
        q.push(payload.clone()).unwrap();
    }
    // a partially consumed chain, still holding some values.
    let mut chain = q.flush().unwrap();
    chain.next();
    for _ in 0..32 {
        q.push(payload.clone()).unwrap();
    }
    assert_eq!(alloc.outstanding(), 1 + 63 + 32);

    drop(q);
    assert_eq!(alloc.outstanding(), 63);
    drop(chain);

    assert_eq!(alloc.outstanding(), 0);
    assert_eq!(alloc.outstanding_bytes(), 0);
    assert_eq!(Arc::strong_count(&payload), 1);
}

#[test]
fn push_failure_leaves_queue_unchanged() {
    trace_init();
    let alloc = FailAfter::new(3);
    let q = MpscQueue::new_in(alloc.clone());
    q.push(1).unwrap();
    q.push(2).unwrap();

    let err: PushError<i32> = q.push(3).unwrap_err();
    assert_eq!(err.into_inner(), 3);
    assert!(!q.is_empty());
    assert_eq!(q.flush().unwrap().collect::<Vec<_>>(), vec![1, 2]);

    // still fails with an exhausted budget, even on an empty queue.
    assert!(q.push(4).is_err());
    assert!(q.is_empty());
    assert!(q.flush().is_none());

    alloc.set_budget(1);
    q.push(5).unwrap();
    assert_eq!(q.flush().unwrap().collect::<Vec<_>>(), vec![5]);
}

#[test]
fn construction_failure_builds_nothing() {
    trace_init();
    let alloc = Tracking::wrap(FailAfter::new(0));
    let err = MpscQueue::<String, _>::try_new_in(alloc.clone())
        .map(drop)
        .unwrap_err();
    assert!(err.layout().size() > 0);
    assert_eq!(alloc.outstanding(), 0);
    assert_eq!(alloc.failures(), 1);
}

#[test]
fn chain_sent_to_another_thread() {
    trace_init();
    let q = MpscQueue::new();
    for i in 0..10 {
        q.push(i.to_string()).unwrap();
    }
    let chain: Chain<String> = q.flush().unwrap();
    let joined = thread::spawn(move || chain.collect::<Vec<_>>().join(","))
        .join()
        .unwrap();
    assert_eq!(joined, "0,1,2,3,4,5,6,7,8,9");
}

#[derive(Debug)]
enum Op {
    Push,
    Flush { take: usize },
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..100;

proptest::proptest! {
    #[test]
    fn fuzz_push_flush(ops in proptest::collection::vec(proptest::prelude::any::<usize>(), FUZZ_RANGE)) {
        let ops = ops
            .iter()
            .map(|&i| match i % 3 {
                0 | 1 => Op::Push,
                _ => Op::Flush { take: i / 3 },
            })
            .collect::<Vec<_>>();

        trace_init();
        let _span = tracing::info_span!("fuzz").entered();
        tracing::info!(?ops);
        run_fuzz(ops);
    }
}

fn run_fuzz(ops: Vec<Op>) {
    let alloc = Tracking::new();
    let q = MpscQueue::new_in(alloc.clone());
    let mut reference = VecDeque::new();

    for (i, op) in ops.iter().enumerate() {
        let _span = tracing::info_span!("op", ?i, ?op).entered();
        match op {
            Op::Push => {
                q.push(i).unwrap();
                reference.push_back(i);
            }
            Op::Flush { take } => {
                let Some(chain) = q.flush() else {
                    assert!(reference.is_empty());
                    continue;
                };
                let expected = reference.drain(..).collect::<Vec<_>>();
                // only consume part of the chain; the rest is dropped.
                let taken = chain.take(*take % (expected.len() + 1)).collect::<Vec<_>>();
                assert_eq!(taken[..], expected[..taken.len()]);
            }
        }
        assert_eq!(q.is_empty(), reference.is_empty());
        assert_eq!(alloc.outstanding(), 1 + reference.len());
    }

    let rest = q
        .flush()
        .map(|chain| chain.collect::<Vec<_>>())
        .unwrap_or_default();
    assert_eq!(rest, reference.into_iter().collect::<Vec<_>>());
    drop(q);
    assert_eq!(alloc.outstanding(), 0);
}
