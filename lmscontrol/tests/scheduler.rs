//! Observer scheduling on a paused clock.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lmscontrol::{Observer, ObserverScheduler, ObserverTask};
use tokio::time::Instant;

/// Records when each cycle started and asks for a fixed next delay.
struct Recorder {
    started: Instant,
    starts: Mutex<Vec<u64>>,
    next: Option<Duration>,
    work: Duration,
}

impl Recorder {
    fn new(next: Option<Duration>, work: Duration) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            starts: Mutex::new(Vec::new()),
            next,
            work,
        })
    }

    fn starts(&self) -> Vec<u64> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObserverTask for Recorder {
    async fn run(&self, _observer: &Observer) -> Option<Duration> {
        let at = self.started.elapsed().as_millis() as u64;
        self.starts.lock().unwrap().push(at);
        tokio::time::sleep(self.work).await;
        self.next
    }
}

#[tokio::test(start_paused = true)]
async fn test_returned_delay_overrides_interval() {
    let scheduler = ObserverScheduler::new();
    let task = Recorder::new(Some(Duration::from_secs(30)), Duration::ZERO);
    scheduler.add_observer("serverstatus", Duration::from_secs(10), task.clone());

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(task.starts(), vec![0, 30_000, 60_000]);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_explicit_rearm_wins_over_returned_delay() {
    let scheduler = ObserverScheduler::new();
    // each cycle takes 1s and asks for 30s
    let task = Recorder::new(Some(Duration::from_secs(30)), Duration::from_secs(1));
    let observer = scheduler.add_observer("serverstatus", Duration::from_secs(10), task.clone());

    // re-armed while the first cycle is running
    tokio::time::sleep(Duration::from_millis(500)).await;
    observer.delay(Duration::from_millis(750));

    tokio::time::sleep(Duration::from_secs(3)).await;
    // first cycle ends at 1000, next starts 750 later and ends at 2750
    assert_eq!(task.starts(), vec![0, 1_750]);
    assert_eq!(observer.cycles(), 2);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_fire_all_and_independent_cadences() {
    let scheduler = ObserverScheduler::new();
    let fast = Recorder::new(None, Duration::ZERO);
    let slow = Recorder::new(None, Duration::ZERO);
    scheduler.add_observer("playtimeticker", Duration::from_millis(950), fast.clone());
    scheduler.add_observer("playerstatus", Duration::from_secs(5), slow.clone());

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(fast.starts(), vec![0, 950, 1_900]);
    assert_eq!(slow.starts(), vec![0]);

    scheduler.fire_all();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fast.starts().last(), Some(&2_000));
    assert_eq!(slow.starts(), vec![0, 2_000]);

    scheduler.shutdown();
    scheduler.join().await;
}
