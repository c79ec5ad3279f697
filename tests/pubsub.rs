use coreactor::{PubSub, Receiver, SignalStorage, UnsyncStorage};

use futures::executor::block_on;
use pretty_assertions::assert_eq;

use std::sync::Arc;
use std::thread;

const FANOUT: usize = 100;

fn count_until_dead<S: SignalStorage>(mut receiver: Receiver<S>) -> usize {
    block_on(async move {
        let mut count = 0;
        while receiver.recv().await {
            count += 1;
        }
        count
    })
}

#[test]
fn test_exact_key_delivery() {
    let pubsub = Arc::new(PubSub::<usize>::exact(0..10));

    let consumers: Vec<_> = (0..10)
        .map(|key| {
            let receiver = pubsub.subscribe(key).unwrap();
            thread::spawn(move || count_until_dead(receiver))
        })
        .collect();

    for key in 0..10 {
        for _ in 0..FANOUT {
            assert!(pubsub.publish(&key));
        }
    }
    // Dropping the registry stops every signal without an extra release.
    drop(pubsub);

    let counts: Vec<usize> = consumers
        .into_iter()
        .map(|consumer| consumer.join().unwrap())
        .collect();
    assert_eq!(counts, vec![FANOUT; 10]);
}

#[test]
fn test_publish_reaches_only_its_key() {
    let pubsub = PubSub::<usize, UnsyncStorage>::exact(0..10);
    let mut receivers: Vec<_> = (0..10).map(|key| pubsub.subscribe(key).unwrap()).collect();

    assert!(pubsub.publish(&4));

    let ready: Vec<Option<bool>> = receivers.iter_mut().map(Receiver::try_recv).collect();
    let mut expected = vec![None; 10];
    expected[4] = Some(true);
    assert_eq!(ready, expected);
}

#[test]
fn test_predicate_delivery_then_stop() {
    let pubsub = PubSub::<u32>::new();
    let receivers: Vec<_> = (0..10).map(|key| pubsub.subscribe(key).unwrap()).collect();

    assert!(pubsub.publish_if(|key| key % 3 == 0));
    assert!(!pubsub.publish_if(|key| *key > 100));
    pubsub.stop();

    let total: usize = receivers.into_iter().map(count_until_dead).sum();
    // Keys 0, 3, 6 and 9 got the published release, and every key got the
    // final release delivered by `stop`.
    assert_eq!(total, 14);
}

#[test]
fn test_many_publishers_one_listener() {
    let pubsub = Arc::new(PubSub::<&'static str>::new());
    let receiver = pubsub.subscribe("listener").unwrap();
    let consumer = thread::spawn(move || count_until_dead(receiver));

    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let pubsub = pubsub.clone();
            thread::spawn(move || {
                for _ in 0..1_000 {
                    assert!(pubsub.publish(&"listener"));
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.join().unwrap();
    }

    assert!(pubsub.unsubscribe(&"listener"));
    assert_eq!(consumer.join().unwrap(), 4_000);
}

#[test]
fn test_inline_consumer_may_reenter_registry() {
    use coreactor::{InlineExecutor, MpscStorage, Task};
    use std::sync::mpsc;

    let pubsub = Arc::new(PubSub::<u32, MpscStorage>::new());
    let mut receiver = pubsub.subscribe(1).unwrap();
    let (done_tx, done_rx) = mpsc::channel();

    let registry = pubsub.clone();
    Task::new(async move {
        assert!(receiver.recv().await);
        // Resumed from inside `publish`; the registry lock must be free.
        done_tx.send(registry.subscribe(2)).unwrap();
    })
    .detach_by(Arc::new(InlineExecutor));

    assert!(pubsub.publish(&1));
    let second = done_rx.try_recv().unwrap();
    assert!(second.is_some());
    assert!(pubsub.contains(&2));
}

#[test]
fn test_short_lived_keys_do_not_accumulate() {
    let pubsub = PubSub::<u16>::new();

    for transaction in 0..1_000 {
        let mut receiver = pubsub.subscribe(transaction).unwrap();
        assert!(pubsub.publish(&transaction));
        assert_eq!(receiver.try_recv(), Some(true));
    }

    assert_eq!(pubsub.len(), 0);
    assert!(pubsub.is_empty());
    assert!(!pubsub.contains(&7));
    assert!(!pubsub.publish_if(|_| true));
    assert!(pubsub.subscribe(7).is_some());
}
