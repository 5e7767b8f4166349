use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
#[cfg(test)]
use std::time::Duration;

use tracing::debug;

use crate::currency::ExchangeRates;
use crate::expenses::{ExpenseRecord, Mutation, MutationKind, MutationResult};
use crate::remote::{LedgerStore, RateSource, RemoteError};

#[derive(Debug)]
pub enum TaskEvent {
    Loaded(Result<Vec<ExpenseRecord>, RemoteError>),
    Rates(Result<ExchangeRates, RemoteError>),
    Mutated(MutationResult),
}

/// Shared flag telling workers whether anyone still listens for results.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn end(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs store and rate calls off the UI thread. Results that arrive after
/// teardown are dropped without being delivered.
pub struct TaskRunner {
    store: Arc<dyn LedgerStore>,
    rates: Arc<dyn RateSource>,
    liveness: Liveness,
    sender: Sender<TaskEvent>,
    receiver: Receiver<TaskEvent>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn LedgerStore>, rates: Arc<dyn RateSource>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            store,
            rates,
            liveness: Liveness::new(),
            sender,
            receiver,
        }
    }

    #[cfg(test)]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Starts the expense list fetch and the rate fetch concurrently.
    pub fn spawn_startup(&mut self) {
        let store = Arc::clone(&self.store);
        self.spawn("load expenses", move || TaskEvent::Loaded(store.list()));
        let rates = Arc::clone(&self.rates);
        self.spawn("fetch rates", move || TaskEvent::Rates(rates.latest()));
    }

    pub fn spawn_mutation(&mut self, mutation: Mutation) {
        let store = Arc::clone(&self.store);
        let label = match mutation.kind() {
            MutationKind::Create => "create expense",
            MutationKind::Update => "update expense",
            MutationKind::Delete => "delete expense",
        };
        self.spawn(label, move || TaskEvent::Mutated(mutation.execute(store.as_ref())));
    }

    fn spawn<F>(&mut self, label: &'static str, job: F)
    where
        F: FnOnce() -> TaskEvent + Send + 'static,
    {
        if !self.liveness.is_alive() {
            return;
        }
        let liveness = self.liveness.clone();
        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = job();
            if liveness.is_alive() {
                let _ = sender.send(event);
            } else {
                debug!(task = label, "dropping result after teardown");
            }
        });
    }

    /// Events that are ready now, without blocking.
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        self.receiver.try_iter().collect()
    }

    /// Blocks until one event arrives or the timeout passes.
    #[cfg(test)]
    pub fn wait(&mut self, timeout: Duration) -> Option<TaskEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn teardown(&mut self) {
        self.liveness.end();
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::NaiveDate;

    use crate::currency::ExchangeRates;
    use crate::expenses::{ExpenseFields, ExpenseRecord, Mutation, MutationResult};
    use crate::remote::{LedgerStore, RateSource, RemoteError};

    use super::{TaskEvent, TaskRunner};

    struct GatedStore {
        gate: Mutex<()>,
    }

    impl LedgerStore for GatedStore {
        fn list(&self) -> Result<Vec<ExpenseRecord>, RemoteError> {
            let _guard = self.gate.lock().expect("gate");
            Ok(Vec::new())
        }

        fn create(&self, fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
            let _guard = self.gate.lock().expect("gate");
            Ok(ExpenseRecord {
                id: "1".to_string(),
                purchase_date: fields.purchase_date,
                product_name: fields.product_name.clone(),
                category: fields.category.clone(),
                price: fields.price,
                created_at: None,
            })
        }

        fn update(&self, _id: &str, _fields: &ExpenseFields) -> Result<ExpenseRecord, RemoteError> {
            Err(RemoteError::Decode("unused".to_string()))
        }

        fn delete(&self, _id: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    struct FixedRates;

    impl RateSource for FixedRates {
        fn latest(&self) -> Result<ExchangeRates, RemoteError> {
            Ok(ExchangeRates { twd: 0.21, usd: 0.0067 })
        }
    }

    fn runner() -> (Arc<GatedStore>, TaskRunner) {
        let store = Arc::new(GatedStore {
            gate: Mutex::new(()),
        });
        let runner = TaskRunner::new(store.clone(), Arc::new(FixedRates));
        (store, runner)
    }

    #[test]
    fn startup_delivers_list_and_rates() {
        let (_store, mut runner) = runner();
        runner.spawn_startup();

        let mut loaded = false;
        let mut rated = false;
        for _ in 0..2 {
            match runner.wait(Duration::from_secs(5)) {
                Some(TaskEvent::Loaded(Ok(rows))) => loaded = rows.is_empty(),
                Some(TaskEvent::Rates(Ok(rates))) => rated = rates.twd == 0.21,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(loaded && rated);
        assert!(runner.drain().is_empty());
    }

    #[test]
    fn results_after_teardown_are_dropped() {
        let (store, mut runner) = runner();
        let liveness = runner.liveness();
        {
            let _held = store.gate.lock().expect("gate");
            runner.spawn_mutation(Mutation::Create(ExpenseFields {
                purchase_date: NaiveDate::from_ymd_opt(2026, 2, 21).unwrap(),
                product_name: "Tea".to_string(),
                category: "food".to_string(),
                price: 180,
            }));
            runner.teardown();
        }
        assert!(!liveness.is_alive());
        assert!(runner.wait(Duration::from_millis(200)).is_none());
        assert!(runner.drain().is_empty());
    }

    #[test]
    fn mutation_result_comes_back() {
        let (_store, mut runner) = runner();
        runner.spawn_mutation(Mutation::Delete { id: "9".to_string() });
        match runner.wait(Duration::from_secs(5)) {
            Some(TaskEvent::Mutated(MutationResult::Deleted { id, result })) => {
                assert_eq!(id, "9");
                assert!(result.is_ok());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
