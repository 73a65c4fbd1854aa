//! Single-flight execution table.
//!
//! Concurrent tasks doing the same work share one execution:
//!
//! ```text
//!   task A ──join──► ┌──────────────┐
//!   task B ──join──► │ Flight (key) │ ──► one pipeline execution ──► result
//!   task C ──join──► └──────────────┘          (leader spawns it)
//! ```
//!
//! Every task holds a [`FlightTicket`]. Dropping a ticket leaves the flight;
//! when the last ticket leaves before a result exists, the flight's token is
//! cancelled and the entry is removed, so a later joiner starts fresh.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

enum Outcome<T> {
    Pending,
    Done(T),
    Abandoned,
}

impl<T> Outcome<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

struct Flight<T> {
    token: CancellationToken,
    result: watch::Sender<Outcome<T>>,
}

struct FlightEntry<T> {
    flight: Arc<Flight<T>>,
    waiters: usize,
}

/// Map of in-flight executions keyed by the work they do.
pub struct FlightTable<K, T> {
    flights: Mutex<HashMap<K, FlightEntry<T>>>,
}

impl<K, T> FlightTable<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flights: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, FlightEntry<T>>> {
        self.flights.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Join the flight for `key`, creating it if there is none (or only a
    /// cancelled one). The creator is the leader and must start the
    /// execution.
    pub fn join(self: &Arc<Self>, key: K) -> FlightTicket<K, T> {
        let mut flights = self.lock();

        if let Some(entry) = flights.get_mut(&key) {
            if !entry.flight.token.is_cancelled() {
                entry.waiters += 1;
                return FlightTicket {
                    table: Arc::clone(self),
                    key,
                    flight: Arc::clone(&entry.flight),
                    leader: false,
                };
            }
        }

        let (result, _) = watch::channel(Outcome::Pending);
        let flight = Arc::new(Flight {
            token: CancellationToken::new(),
            result,
        });
        flights.insert(
            key.clone(),
            FlightEntry {
                flight: Arc::clone(&flight),
                waiters: 1,
            },
        );

        FlightTicket {
            table: Arc::clone(self),
            key,
            flight,
            leader: true,
        }
    }

    /// Number of flights currently in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove_if_same(&self, key: &K, flight: &Arc<Flight<T>>) {
        let mut flights = self.lock();
        let same = flights
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.flight, flight));
        if same {
            flights.remove(key);
        }
    }

    fn leave(&self, key: &K, flight: &Arc<Flight<T>>) {
        let mut flights = self.lock();
        let Some(entry) = flights.get_mut(key) else {
            return;
        };
        if !Arc::ptr_eq(&entry.flight, flight) {
            return;
        }

        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            if entry.flight.result.borrow().is_pending() {
                entry.flight.token.cancel();
            }
            flights.remove(key);
        }
    }
}

/// Completion side of a flight, owned by the execution.
pub struct FlightCompletion<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    table: Arc<FlightTable<K, T>>,
    key: K,
    flight: Arc<Flight<T>>,
    completed: bool,
}

impl<K, T> FlightCompletion<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    /// Cancelled once every ticket has left.
    pub fn token(&self) -> &CancellationToken {
        &self.flight.token
    }

    /// Publish the result to every ticket and retire the flight.
    pub fn complete(mut self, value: T) {
        self.flight.result.send_replace(Outcome::Done(value));
        self.table.remove_if_same(&self.key, &self.flight);
        self.completed = true;
    }
}

impl<K, T> Drop for FlightCompletion<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn drop(&mut self) {
        // Execution ended without a result (panic or abort)
        if !self.completed {
            self.flight.result.send_replace(Outcome::Abandoned);
            self.table.remove_if_same(&self.key, &self.flight);
        }
    }
}

/// A task's membership in a flight.
pub struct FlightTicket<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    table: Arc<FlightTable<K, T>>,
    key: K,
    flight: Arc<Flight<T>>,
    leader: bool,
}

impl<K, T> FlightTicket<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    /// Whether this ticket created the flight.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Handle the leader passes to the execution it starts.
    ///
    /// Dropping it without completing abandons the flight.
    pub fn completion(&self) -> FlightCompletion<K, T> {
        FlightCompletion {
            table: Arc::clone(&self.table),
            key: self.key.clone(),
            flight: Arc::clone(&self.flight),
            completed: false,
        }
    }

    /// Wait for the flight's result.
    ///
    /// `None` if the execution went away without publishing one.
    pub async fn wait(&self) -> Option<T> {
        let mut rx = self.flight.result.subscribe();
        let outcome = match rx.wait_for(|outcome| !outcome.is_pending()).await {
            Ok(outcome) => outcome,
            Err(_) => return None,
        };
        let value = match &*outcome {
            Outcome::Done(value) => Some(value.clone()),
            Outcome::Pending | Outcome::Abandoned => None,
        };
        value
    }
}

impl<K, T> Drop for FlightTicket<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn drop(&mut self) {
        self.table.leave(&self.key, &self.flight);
    }
}
