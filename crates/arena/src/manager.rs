//! The bounded-concurrency game scheduler.
//!
//! A fixed pool of worker threads plays games pulled from a FIFO queue, so
//! at most `concurrency` games run at any time. Each worker slot owns its
//! engine-process cache and enforces the inter-game start delay on its own
//! wall clock. Results flow back to the owner over a single channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::adjudicator::TablebaseProbe;
use crate::game::{GameTimeouts, PlayedGame, ProcessCache};

/// What a queued game gets to borrow from its worker slot.
pub struct Slot<'a> {
    pub cache: &'a mut ProcessCache,
    pub timeouts: &'a GameTimeouts,
    pub probe: Option<&'a dyn TablebaseProbe>,
    pub stop: &'a AtomicBool,
}

/// A queued game, resolved to a result when a slot picks it up.
pub type GameFn = Box<dyn FnOnce(&mut Slot<'_>) -> PlayedGame + Send + 'static>;

/// A finished game tagged with its submission ticket.
pub struct Completed {
    pub ticket: usize,
    pub game: PlayedGame,
}

enum WorkerMsg {
    Run { ticket: usize, game: GameFn },
    Exit,
}

/// Bounded pool that schedules games against a concurrency budget.
pub struct GameManager {
    jobs_tx: Option<Sender<WorkerMsg>>,
    results_rx: Receiver<Completed>,
    /// Kept for spawning additional workers on concurrency growth.
    grow_channels: Option<(Receiver<WorkerMsg>, Sender<Completed>)>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    concurrency: usize,
    start_delay: Duration,
    timeouts: GameTimeouts,
    probe: Option<Arc<dyn TablebaseProbe>>,
}

impl GameManager {
    pub fn new(
        concurrency: usize,
        start_delay: Duration,
        timeouts: GameTimeouts,
        probe: Option<Arc<dyn TablebaseProbe>>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let mut manager = Self {
            jobs_tx: Some(jobs_tx),
            results_rx,
            grow_channels: None,
            workers: Vec::new(),
            stop,
            concurrency: 0,
            start_delay,
            timeouts,
            probe,
        };
        for _ in 0..concurrency {
            manager.spawn_worker(&jobs_rx, &results_tx);
        }
        manager.concurrency = concurrency;
        manager.grow_channels = Some((jobs_rx, results_tx));
        manager
    }

    fn spawn_worker(
        &mut self,
        jobs_rx: &Receiver<WorkerMsg>,
        results_tx: &Sender<Completed>,
    ) {
        let rx = jobs_rx.clone();
        let tx = results_tx.clone();
        let stop = Arc::clone(&self.stop);
        let delay = self.start_delay;
        let timeouts = self.timeouts.clone();
        let probe = self.probe.clone();
        let id = self.workers.len();
        let handle = std::thread::Builder::new()
            .name(format!("game-slot-{}", id))
            .spawn(move || worker_loop(rx, tx, stop, delay, timeouts, probe))
            .expect("failed to spawn game worker");
        self.workers.push(handle);
    }

    /// Queues a game. Submissions are played in FIFO order as slots free.
    pub fn submit(&self, ticket: usize, game: GameFn) {
        if let Some(tx) = &self.jobs_tx {
            let _ = tx.send(WorkerMsg::Run { ticket, game });
        }
    }

    /// Adjusts the number of parallel slots.
    ///
    /// Growing spawns new workers immediately; shrinking retires slots as
    /// they finish their current game.
    pub fn set_concurrency(&mut self, n: usize) {
        let n = n.max(1);
        if n > self.concurrency {
            if let Some((jobs_rx, results_tx)) = self.grow_channels.clone() {
                for _ in self.concurrency..n {
                    self.spawn_worker(&jobs_rx, &results_tx);
                }
            }
        } else if let Some(tx) = &self.jobs_tx {
            for _ in n..self.concurrency {
                let _ = tx.send(WorkerMsg::Exit);
            }
        }
        self.concurrency = n;
    }

    /// The channel on which finished games arrive.
    pub fn results(&self) -> &Receiver<Completed> {
        &self.results_rx
    }

    /// Shared flag that running games watch for cancellation.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Stops accepting submissions and waits for running games to finish.
    pub fn drain(&mut self) {
        self.grow_channels = None;
        self.jobs_tx = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    /// Aborts all games: running ones observe the stop flag, send their
    /// protocol quit and are killed after the grace window; queued ones
    /// are discarded.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.drain();
    }
}

impl Drop for GameManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.grow_channels = None;
        self.jobs_tx = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    jobs: Receiver<WorkerMsg>,
    results: Sender<Completed>,
    stop: Arc<AtomicBool>,
    delay: Duration,
    timeouts: GameTimeouts,
    probe: Option<Arc<dyn TablebaseProbe>>,
) {
    let mut cache = ProcessCache::default();
    let mut first = true;
    while let Ok(msg) = jobs.recv() {
        let (ticket, game) = match msg {
            WorkerMsg::Exit => break,
            WorkerMsg::Run { ticket, game } => (ticket, game),
        };
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if !first && !delay.is_zero() {
            interruptible_sleep(delay, &stop);
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
        first = false;

        let played = {
            let mut slot = Slot {
                cache: &mut cache,
                timeouts: &timeouts,
                probe: probe.as_deref(),
                stop: &stop,
            };
            game(&mut slot)
        };
        if results.send(Completed { ticket, game: played }).is_err() {
            break;
        }
    }
    cache.clear(timeouts.shutdown);
}

fn interruptible_sleep(total: Duration, stop: &AtomicBool) {
    let mut left = total;
    while !left.is_zero() && !stop.load(Ordering::Relaxed) {
        let chunk = left.min(Duration::from_millis(50));
        std::thread::sleep(chunk);
        left = left.saturating_sub(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Outcome;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn canned(ticket: usize) -> PlayedGame {
        let mut game = PlayedGame::skipped(ticket, 1, "a", "b");
        game.outcome = Outcome::Draw;
        game
    }

    #[test]
    fn test_all_submissions_complete() {
        let mut manager = GameManager::new(3, Duration::ZERO, GameTimeouts::default(), None);
        for ticket in 0..10 {
            manager.submit(ticket, Box::new(move |_slot| canned(ticket)));
        }
        let mut seen = Vec::new();
        for _ in 0..10 {
            let done = manager
                .results()
                .recv_timeout(Duration::from_secs(5))
                .expect("result");
            seen.push(done.ticket);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        manager.drain();
    }

    #[test]
    fn test_single_slot_preserves_fifo_order() {
        let mut manager = GameManager::new(1, Duration::ZERO, GameTimeouts::default(), None);
        for ticket in 0..6 {
            manager.submit(ticket, Box::new(move |_slot| canned(ticket)));
        }
        for expected in 0..6 {
            let done = manager
                .results()
                .recv_timeout(Duration::from_secs(5))
                .expect("result");
            assert_eq!(done.ticket, expected);
        }
        manager.drain();
    }

    #[test]
    fn test_concurrency_budget_is_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut manager = GameManager::new(2, Duration::ZERO, GameTimeouts::default(), None);

        for ticket in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            manager.submit(
                ticket,
                Box::new(move |_slot| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    canned(ticket)
                }),
            );
        }
        for _ in 0..8 {
            manager
                .results()
                .recv_timeout(Duration::from_secs(5))
                .expect("result");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        manager.drain();
    }

    #[test]
    fn test_stop_discards_queued_games() {
        let mut manager = GameManager::new(1, Duration::ZERO, GameTimeouts::default(), None);
        manager.submit(
            0,
            Box::new(|_slot| {
                std::thread::sleep(Duration::from_millis(100));
                canned(0)
            }),
        );
        for ticket in 1..5 {
            manager.submit(ticket, Box::new(move |_slot| canned(ticket)));
        }
        std::thread::sleep(Duration::from_millis(20));
        manager.stop();

        let mut finished = 0;
        while manager.results().try_recv().is_ok() {
            finished += 1;
        }
        assert!(finished <= 1, "queued games should be dropped on stop");
    }

    #[test]
    fn test_inter_game_delay_per_slot() {
        let mut manager = GameManager::new(
            1,
            Duration::from_millis(80),
            GameTimeouts::default(),
            None,
        );
        let begin = Instant::now();
        manager.submit(0, Box::new(move |_slot| canned(0)));
        manager.submit(1, Box::new(move |_slot| canned(1)));
        let _ = manager.results().recv_timeout(Duration::from_secs(5));
        let _ = manager.results().recv_timeout(Duration::from_secs(5));
        assert!(begin.elapsed() >= Duration::from_millis(80));
        manager.drain();
    }

    #[test]
    fn test_set_concurrency_grows_pool() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut manager = GameManager::new(1, Duration::ZERO, GameTimeouts::default(), None);
        manager.set_concurrency(4);

        for ticket in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            manager.submit(
                ticket,
                Box::new(move |_slot| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(40));
                    running.fetch_sub(1, Ordering::SeqCst);
                    canned(ticket)
                }),
            );
        }
        for _ in 0..8 {
            manager
                .results()
                .recv_timeout(Duration::from_secs(5))
                .expect("result");
        }
        assert!(peak.load(Ordering::SeqCst) > 1);
        manager.drain();
    }
}
