use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of charging one detection against a client's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug)]
struct Ledger {
    clients: HashMap<String, VecDeque<Instant>>,
    next_sweep: Option<Instant>,
}

/// Sliding-window detection budget keyed by client address.
///
/// Clients whose whole history has aged out are dropped on a sweep that runs
/// at most once per window, so spoofed or one-off addresses do not accumulate.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    ledger: Arc<Mutex<Ledger>>,
    window: Duration,
    max_requests: usize,
}

impl IpRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                clients: HashMap::new(),
                next_sweep: None,
            })),
            window,
            max_requests,
        }
    }

    pub fn admit(&self, client: &str) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Number of clients currently holding history.
    pub fn tracked_clients(&self) -> usize {
        self.ledger.lock().clients.len()
    }

    fn admit_at(&self, client: &str, now: Instant) -> Admission {
        let mut ledger = self.ledger.lock();
        self.sweep(&mut ledger, now);

        let history = ledger.clients.entry(client.to_string()).or_default();
        expire(history, now, self.window);

        if history.len() >= self.max_requests {
            let retry_after = history
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            if history.is_empty() {
                // A zero budget never admits; keep no history for it.
                ledger.clients.remove(client);
            }
            return Admission::Limited { retry_after };
        }

        history.push_back(now);
        Admission::Allowed {
            remaining: self.max_requests - history.len(),
        }
    }

    fn sweep(&self, ledger: &mut Ledger, now: Instant) {
        if ledger.next_sweep.is_some_and(|due| now < due) {
            return;
        }
        let window = self.window;
        ledger.clients.retain(|_, history| {
            expire(history, now, window);
            !history.is_empty()
        });
        ledger.next_sweep = Some(now + window);
    }
}

fn expire(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while history
        .front()
        .is_some_and(|stamp| now.duration_since(*stamp) >= window)
    {
        history.pop_front();
    }
}
