use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::error::{PlaybackError, Result};

/*
Timer Pool
==========

Every scheduled note-on, note-off, envelope ramp and metronome tick is a timer
on one worker thread. The pool owns them all, so a global stop can cancel
every outstanding timer in one step.

    caller threads                       worker thread
    --------------                       -------------
    schedule(delay, cb) --Command-->     queue: min-heap of (deadline, seq, id)
    cancel(id)          --Command-->     entries: id -> callback
    cancel_all()        --Command-->
                                         recv_timeout(until earliest deadline)
                                         fire everything that is due

Deadlines are computed on the calling thread, so channel latency does not
push events later. Timers with equal deadlines fire in the order they were
scheduled: `seq` breaks ties in the heap.

A cancelled timer is removed from `entries` only. Its heap slot stays behind
and is skipped when it surfaces.

Callbacks run on the worker. A callback that blocks delays every timer
behind it; one that panics is logged and dropped.
*/

/// Stand-in for delays too long for `Instant` to represent. Timers that far
/// out never fire in practice.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline_after(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Handle for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

type Callback = Box<dyn FnMut() + Send + 'static>;

enum Command {
    Schedule {
        id: TimerId,
        deadline: Instant,
        interval: Option<Duration>,
        callback: Callback,
    },
    SetInterval {
        id: TimerId,
        interval: Duration,
    },
    Cancel(TimerId),
    CancelAll(Option<Sender<()>>),
    Pending(Sender<usize>),
    Shutdown,
}

struct Entry {
    deadline: Instant,
    interval: Option<Duration>,
    callback: Callback,
}

pub struct TimerPool {
    commands: Sender<Command>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TimerPool {
    pub fn new() -> Result<Self> {
        let (commands, receiver) = unbounded();
        let worker = thread::Builder::new()
            .name("accordium-timer".into())
            .spawn(move || Worker::new(receiver).run())
            .map_err(|e| PlaybackError::Device(format!("cannot start timer thread: {e}")))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            commands,
            next_id: AtomicU64::new(0),
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("timer pool is shut down, command ignored");
        }
    }

    /// Run `callback` once after `delay`. A zero delay fires as soon as possible.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.next_id();
        self.send(Command::Schedule {
            id,
            deadline: deadline_after(Instant::now(), delay),
            interval: None,
            callback: Box::new(callback),
        });
        id
    }

    /// Run `callback` every `interval`, first after one interval, until cancelled.
    pub fn schedule_repeating<F>(&self, interval: Duration, callback: F) -> Result<TimerId>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(PlaybackError::InvalidInterval);
        }
        let id = self.next_id();
        self.send(Command::Schedule {
            id,
            deadline: deadline_after(Instant::now(), interval),
            interval: Some(interval),
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Change the period of a repeating timer. Takes effect after its next firing.
    pub fn set_interval(&self, id: TimerId, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(PlaybackError::InvalidInterval);
        }
        self.send(Command::SetInterval { id, interval });
        Ok(())
    }

    /// Cancelling a timer that already fired is a no-op.
    pub fn cancel(&self, id: TimerId) {
        self.send(Command::Cancel(id));
    }

    /// Drop every pending timer.
    ///
    /// Returns once the worker has cleared its queue, except when called from
    /// a timer callback, where the clear happens right after that callback.
    pub fn cancel_all(&self) {
        if thread::current().id() == self.worker_id {
            self.send(Command::CancelAll(None));
            return;
        }
        let (done, wait) = bounded(1);
        self.send(Command::CancelAll(Some(done)));
        let _ = wait.recv();
    }

    /// Timers still waiting to fire (0 once the pool is shut down).
    pub fn pending(&self) -> usize {
        if thread::current().id() == self.worker_id {
            return 0;
        }
        let (reply, wait) = bounded(1);
        self.send(Command::Pending(reply));
        wait.recv().unwrap_or(0)
    }

    /// Stop the worker. Pending timers are dropped without firing.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.send(Command::Shutdown);
        if thread::current().id() == self.worker_id {
            return;
        }
        if worker.join().is_err() {
            error!("timer thread panicked");
        }
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    receiver: Receiver<Command>,
    entries: HashMap<TimerId, Entry>,
    queue: BinaryHeap<Reverse<(Instant, u64, TimerId)>>,
    seq: u64,
}

impl Worker {
    fn new(receiver: Receiver<Command>) -> Self {
        Self {
            receiver,
            entries: HashMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn push(&mut self, deadline: Instant, id: TimerId) {
        self.queue.push(Reverse((deadline, self.seq, id)));
        self.seq += 1;
    }

    fn run(mut self) {
        loop {
            self.fire_due();

            let command = match self.queue.peek() {
                Some(Reverse((deadline, _, _))) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.receiver.recv_timeout(timeout) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.receiver.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.apply(command) {
                break;
            }
            while let Ok(command) = self.receiver.try_recv() {
                if !self.apply(command) {
                    return;
                }
            }
        }
        debug!("timer thread exiting");
    }

    /// Returns false on shutdown.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Schedule {
                id,
                deadline,
                interval,
                callback,
            } => {
                self.entries.insert(
                    id,
                    Entry {
                        deadline,
                        interval,
                        callback,
                    },
                );
                self.push(deadline, id);
            }
            Command::SetInterval { id, interval } => match self.entries.get_mut(&id) {
                Some(entry) if entry.interval.is_some() => entry.interval = Some(interval),
                Some(_) => warn!("timer {id:?} is not repeating, interval unchanged"),
                None => {}
            },
            Command::Cancel(id) => {
                self.entries.remove(&id);
            }
            Command::CancelAll(done) => {
                debug!("cancelling {} pending timer(s)", self.entries.len());
                self.entries.clear();
                self.queue.clear();
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Command::Pending(reply) => {
                let _ = reply.send(self.entries.len());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(&Reverse((deadline, _, id))) = self.queue.peek() {
            if deadline > now {
                break;
            }
            self.queue.pop();

            let Some(entry) = self.entries.get_mut(&id) else {
                continue; // cancelled
            };
            if entry.deadline != deadline {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(&mut entry.callback)).is_err() {
                error!("timer callback {id:?} panicked, dropping it");
                self.entries.remove(&id);
                continue;
            }

            match entry.interval {
                Some(interval) => {
                    let next = deadline_after(deadline, interval);
                    entry.deadline = next;
                    self.push(next, id);
                }
                None => {
                    self.entries.remove(&id);
                }
            }
        }
    }
}
