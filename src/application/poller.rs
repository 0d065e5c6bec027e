use crate::domain::ports::TransactionBackendRef;
use crate::domain::transaction::{Direction, TransactionId, TransactionStatus};
use crate::error::{RampError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type ActiveSet = Arc<Mutex<HashSet<TransactionId>>>;

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashSet<TransactionId>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to poll one transaction id. Released on drop, including
/// when the polling task is aborted.
#[derive(Debug)]
pub struct PollClaim {
    id: TransactionId,
    active: ActiveSet,
}

impl PollClaim {
    pub fn id(&self) -> &TransactionId {
        &self.id
    }
}

impl Drop for PollClaim {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.id);
    }
}

/// Re-fetches the status of submitted transactions on a fixed interval.
///
/// Fetch errors are logged and retried on the next tick only. At most one
/// loop runs per transaction id.
#[derive(Clone)]
pub struct TransactionStatusPoller {
    backend: TransactionBackendRef,
    interval: Duration,
    active: ActiveSet,
}

impl TransactionStatusPoller {
    pub fn new(backend: TransactionBackendRef, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_polling(&self, id: &TransactionId) -> bool {
        lock(&self.active).contains(id)
    }

    /// Reserves `id` for a polling loop.
    pub fn claim(&self, id: &TransactionId) -> Result<PollClaim> {
        if !lock(&self.active).insert(id.clone()) {
            return Err(RampError::AlreadyPolling(id.clone()));
        }
        Ok(PollClaim {
            id: id.clone(),
            active: Arc::clone(&self.active),
        })
    }

    /// A single status fetch.
    pub async fn poll_once(
        &self,
        direction: Direction,
        id: &TransactionId,
    ) -> Result<TransactionStatus> {
        let receipt = self.backend.fetch_status(direction, id).await?;
        Ok(receipt.status)
    }

    /// Polls the claimed id until the backend reports a terminal status,
    /// handing every fetched status to `on_update`.
    ///
    /// The first fetch happens one interval after the call.
    pub async fn watch<F>(
        &self,
        claim: PollClaim,
        direction: Direction,
        mut on_update: F,
    ) -> TransactionStatus
    where
        F: FnMut(TransactionStatus) + Send,
    {
        let id = claim.id().clone();
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once(direction, &id).await {
                Ok(status) => {
                    debug!(%id, %status, "Polled transaction status");
                    on_update(status);
                    if status.is_terminal() {
                        info!(%id, %status, "Transaction reached terminal status");
                        return status;
                    }
                }
                Err(err) => {
                    warn!(%id, error = %err, "Status poll failed, retrying on next tick");
                }
            }
        }
    }

    /// Claims `id` and polls it until terminal.
    pub async fn poll_until_terminal<F>(
        &self,
        direction: Direction,
        id: &TransactionId,
        on_update: F,
    ) -> Result<TransactionStatus>
    where
        F: FnMut(TransactionStatus) + Send,
    {
        let claim = self.claim(id)?;
        Ok(self.watch(claim, direction, on_update).await)
    }
}

/// The two scheduled tasks of a flow: the status poll loop and the
/// auto-reset timer. Both are aborted together on [`FlowTasks::cancel`] and
/// on drop.
#[derive(Debug, Default)]
pub struct FlowTasks {
    poll: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
}

impl FlowTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_poll(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.poll.replace(handle) {
            previous.abort();
        }
    }

    pub fn set_reset(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.reset.replace(handle) {
            previous.abort();
        }
    }

    pub fn has_reset(&self) -> bool {
        self.reset.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.poll.is_none() && self.reset.is_none()
    }

    /// Forgets the reset timer without aborting it; used by the timer itself
    /// once it fired.
    pub fn release_reset(&mut self) {
        self.reset = None;
    }

    pub fn cancel(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        if let Some(reset) = self.reset.take() {
            reset.abort();
        }
    }
}

impl Drop for FlowTasks {
    fn drop(&mut self) {
        self.cancel();
    }
}
