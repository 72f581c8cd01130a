use super::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Outcome of a settled promise: fulfilled value or rejection reason
pub type Settlement = std::result::Result<Value, Value>;

/// Settle-once state shared by a promise object and its resolver
#[derive(Clone)]
pub struct PromiseCell {
    state: Arc<watch::Sender<Option<Settlement>>>,
}

impl PromiseCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { state: Arc::new(tx) }
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.state.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Wait for the outcome
    pub async fn settled(&self) -> Settlement {
        let mut rx = self.state.subscribe();
        let settlement = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone().unwrap_or(Ok(Value::Undefined)),
            // the sender lives as long as this cell
            Err(_) => Ok(Value::Undefined),
        };
        settlement
    }

    fn settle(&self, settlement: Settlement) -> bool {
        self.state.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(settlement);
            true
        })
    }
}

impl fmt::Debug for PromiseCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseCell")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Write side of a promise. Only the first settlement counts.
#[derive(Debug, Clone)]
pub struct PromiseResolver {
    cell: PromiseCell,
}

impl PromiseResolver {
    pub(crate) fn new(cell: PromiseCell) -> Self {
        Self { cell }
    }

    /// Fulfil with `value`; a promise value is adopted once it settles
    pub fn resolve(&self, value: Value) -> bool {
        let adopted = value.as_object().and_then(|o| o.as_promise()).cloned();
        let Some(inner) = adopted else {
            return self.cell.settle(Ok(value));
        };

        if let Some(settlement) = inner.settlement() {
            return self.cell.settle(settlement);
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cell = self.cell.clone();
                handle.spawn(async move {
                    let settlement = inner.settled().await;
                    cell.settle(settlement);
                });
                true
            }
            Err(_) => {
                trace!("no runtime to adopt a pending promise; fulfilling with it");
                self.cell.settle(Ok(value))
            }
        }
    }

    pub fn reject(&self, reason: Value) -> bool {
        self.cell.settle(Err(reason))
    }
}
