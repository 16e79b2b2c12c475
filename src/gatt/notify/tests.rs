use tokio::sync::mpsc;

use crate::host::mock::{central, MockPlatform};
use crate::host::Event;

use super::*;

fn h(v: u16) -> Handle {
    Handle::new(v).unwrap()
}

/// Returns a notifier whose completions are delivered by a background task.
fn notifier() -> (Arc<MockPlatform>, Arc<Notifier>) {
    let p = MockPlatform::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    p.attach(tx);
    let n = Arc::new(Notifier::new(p.clone(), NotifyParams::default()));
    let c = Arc::clone(&n);
    tokio::spawn(async move {
        while let Some(e) = rx.recv().await {
            if let Event::NotificationSent { ok, .. } = e {
                c.complete(ok);
            }
        }
    });
    (p, n)
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn no_connection() {
    let (p, n) = notifier();
    n.set_cccd(h(3), true, false);
    assert!(matches!(n.send(h(3), &[1]).await, Err(Error::NoConnection)));
    assert!(p.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cccd() {
    let (p, n) = notifier();
    n.connect(central(1));
    assert!(matches!(n.send(h(3), &[1]).await, Err(Error::NotReady(x)) if x == h(3)));
    assert_eq!(n.cccd_value(h(3)), cccd::DISABLE);

    assert!(n.set_cccd(h(3), true, false));
    assert!(!n.set_cccd(h(3), true, false));
    assert_eq!(n.cccd_value(h(3)), cccd::NOTIFY);
    n.send(h(3), &[1, 2]).await.unwrap();
    assert!(matches!(n.send(h(5), &[1]).await, Err(Error::NotReady(_))));
    assert_eq!(p.notifications(), [vec![1, 2]]);

    n.set_cccd(h(3), false, false);
    assert!(matches!(n.send(h(3), &[1]).await, Err(Error::NotReady(_))));
    assert_eq!(p.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn priming() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, true);
    assert_eq!(n.state(h(3)), CccdState::Priming);
    let e = n.priming_epoch(h(3)).unwrap();
    assert!(n.check(h(3)).is_err());
    assert!(matches!(n.send(h(3), &[1]).await, Err(Error::NotReady(_))));
    n.send_priming(h(3), e, &[1, 0]).await.unwrap();
    assert!(n.finish_priming(h(3), e));
    assert_eq!(n.state(h(3)), CccdState::Enabled);
    assert_eq!(n.priming_epoch(h(3)), None);
    n.send(h(3), &[1, 1]).await.unwrap();
    assert_eq!(p.notifications(), [vec![1, 0], vec![1, 1]]);

    // Enabled characteristics accept no priming reports
    assert!(matches!(n.send_priming(h(3), e, &[1, 0]).await, Err(Error::NotReady(_))));
    assert!(!n.finish_priming(h(3), e));

    // Re-enabling an enabled characteristic does not restart priming
    n.set_cccd(h(3), true, true);
    assert_eq!(n.state(h(3)), CccdState::Enabled);
    assert_eq!(n.priming_epoch(h(3)), None);
    assert!(!n.finish_priming(h(4), e));
    assert_eq!(p.notifications().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn superseded_priming() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, true);
    let old = n.priming_epoch(h(3)).unwrap();
    n.set_cccd(h(3), false, true);
    assert_eq!(n.priming_epoch(h(3)), None);
    n.set_cccd(h(3), true, true);
    let e = n.priming_epoch(h(3)).unwrap();
    assert_ne!(e, old);
    assert!(matches!(n.send_priming(h(3), old, &[1]).await, Err(Error::NotReady(_))));
    assert!(!n.finish_priming(h(3), old));
    assert_eq!(n.state(h(3)), CccdState::Priming);

    // Reconnecting invalidates priming of the previous connection
    n.reset();
    n.connect(central(1));
    n.set_cccd(h(3), true, true);
    assert!(!n.finish_priming(h(3), e));
    assert!(matches!(n.send_priming(h(3), e, &[1]).await, Err(Error::NotReady(_))));
    let e = n.priming_epoch(h(3)).unwrap();
    n.send_priming(h(3), e, &[2]).await.unwrap();
    assert!(n.finish_priming(h(3), e));
    assert_eq!(p.notifications(), [vec![2]]);
}

#[tokio::test(start_paused = true)]
async fn retry() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, false);

    p.set_busy(2);
    let t = tokio::time::Instant::now();
    n.send(h(3), &[7]).await.unwrap();
    assert!(t.elapsed() >= Duration::from_millis(20 + 40));
    assert_eq!(p.notifications().len(), 1);

    p.set_failed(1);
    n.send(h(3), &[8]).await.unwrap();
    assert_eq!(p.notifications(), [vec![7], vec![8], vec![8]]);
}

#[tokio::test(start_paused = true)]
async fn exhausted() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, false);
    p.set_failed(3);
    let e = n.send(h(3), &[7]).await.unwrap_err();
    assert!(matches!(e, Error::Gatt { op: GattOp::Notify, .. }));
    assert_eq!(p.notifications().len(), 3);

    p.clear();
    p.withhold_completions(true);
    let e = n.send(h(3), &[7]).await.unwrap_err();
    assert!(matches!(e, Error::Gatt { ref reason, .. } if reason == "completion timeout"));
    assert_eq!(p.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_completion() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, false);
    p.withhold_completions(true);
    assert!(n.send(h(3), &[1]).await.is_err());

    // The next send waits for the late completion of the first one
    p.withhold_completions(false);
    let c = Arc::clone(&n);
    let t = tokio::spawn(async move { c.send(h(3), &[2]).await });
    settle().await;
    assert_eq!(p.notifications(), [vec![1]]);
    n.complete(true);
    t.await.unwrap().unwrap();
    assert_eq!(p.notifications(), [vec![1], vec![2]]);

    // A lost completion delays the next send by at most one timeout
    p.withhold_completions(true);
    assert!(n.send(h(3), &[3]).await.is_err());
    p.withhold_completions(false);
    let t = tokio::time::Instant::now();
    n.send(h(3), &[4]).await.unwrap();
    assert!(t.elapsed() >= Duration::from_millis(250));
    assert_eq!(p.notifications().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts() {
    let p = MockPlatform::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    p.attach(tx);
    let params = NotifyParams {
        attempts: 0,
        ..NotifyParams::default()
    };
    let n = Arc::new(Notifier::new(p.clone(), params));
    let c = Arc::clone(&n);
    tokio::spawn(async move {
        while let Some(e) = rx.recv().await {
            if let Event::NotificationSent { ok, .. } = e {
                c.complete(ok);
            }
        }
    });
    n.connect(central(1));
    n.set_cccd(h(3), true, false);
    n.send(h(3), &[1]).await.unwrap();
    assert_eq!(p.notifications(), [vec![1]]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_in_flight() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, false);
    p.withhold_completions(true);
    let c = Arc::clone(&n);
    let t = tokio::spawn(async move { c.send(h(3), &[1]).await });
    while p.notifications().is_empty() {
        tokio::task::yield_now().await;
    }
    n.reset();
    assert!(matches!(t.await.unwrap(), Err(Error::NoConnection)));
    assert_eq!(n.peer(), None);
    assert_eq!(n.state(h(3)), CccdState::Disabled);
}

#[tokio::test(start_paused = true)]
async fn coalesce_moves() {
    let (p, n) = notifier();
    n.connect(central(1));
    n.set_cccd(h(3), true, false);
    p.withhold_completions(true);
    let seq = Arc::new(AtomicU64::new(0));
    let mv = |v: u8| {
        let (n, seq) = (Arc::clone(&n), Arc::clone(&seq));
        tokio::spawn(async move { n.send_move(h(3), &[1, 0, v], &seq).await })
    };
    let a = mv(1);
    settle().await;
    let b = mv(2);
    settle().await;
    let c = mv(3);
    settle().await;
    assert_eq!(p.notifications().len(), 1);

    p.withhold_completions(false);
    n.complete(true);
    assert!(a.await.unwrap().unwrap());
    assert!(!b.await.unwrap().unwrap());
    assert!(c.await.unwrap().unwrap());
    assert_eq!(p.notifications(), [vec![1, 0, 1], vec![1, 0, 3]]);
}
