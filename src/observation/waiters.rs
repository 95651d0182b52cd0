use crate::core::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle of a consumer waiting for locations (one per open view).
pub type ConsumerId = u64;

/// Delivered to every consumer waiting on `identity` once it is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationFound {
    pub identity: String,
    pub location: Option<String>,
}

#[derive(Default)]
struct Registry {
    consumers: HashMap<ConsumerId, mpsc::UnboundedSender<LocationFound>>,
    waiting: HashMap<String, HashSet<ConsumerId>>,
}

impl Registry {
    fn forget(&mut self, consumer: ConsumerId) {
        self.consumers.remove(&consumer);
        self.waiting.retain(|_, waiters| {
            waiters.remove(&consumer);
            !waiters.is_empty()
        });
    }
}

/// Registry of consumers waiting for an identity's location.
///
/// Each resolution is delivered once; the identity's waiter set is cleared
/// afterwards, and a consumer must `wait_for` again to hear about later
/// observations.
#[derive(Default)]
pub struct LocationWaiters {
    registry: Mutex<Registry>,
}

impl LocationWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `consumer` and returns the stream its notifications arrive
    /// on. Subscribing again replaces the previous stream.
    pub fn subscribe(&self, consumer: ConsumerId) -> Result<mpsc::UnboundedReceiver<LocationFound>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock()?.consumers.insert(consumer, tx);
        Ok(rx)
    }

    pub fn wait_for(&self, identity: &str, consumer: ConsumerId) -> Result<()> {
        self.registry
            .lock()?
            .waiting
            .entry(identity.to_string())
            .or_default()
            .insert(consumer);
        Ok(())
    }

    /// Delivers a resolution to every waiter of `identity` and clears them.
    ///
    /// Returns how many consumers received it. Consumers whose receiver is
    /// gone are removed from the registry.
    pub fn notify(&self, identity: &str, location: Option<&str>) -> Result<usize> {
        let mut registry = self.registry.lock()?;
        let Some(waiters) = registry.waiting.remove(identity) else {
            return Ok(0);
        };

        let message = LocationFound {
            identity: identity.to_string(),
            location: location.map(str::to_string),
        };
        let mut delivered = 0;
        let mut gone = Vec::new();
        for consumer in waiters {
            match registry.consumers.get(&consumer) {
                Some(tx) if tx.send(message.clone()).is_ok() => delivered += 1,
                Some(_) => gone.push(consumer),
                None => {}
            }
        }
        for consumer in gone {
            debug!(consumer, "dropping consumer with closed receiver");
            registry.forget(consumer);
        }
        Ok(delivered)
    }

    /// Drops a consumer and every wait it registered.
    pub fn remove_consumer(&self, consumer: ConsumerId) -> Result<()> {
        self.registry.lock()?.forget(consumer);
        Ok(())
    }

    pub fn waiting_on(&self, identity: &str) -> Result<usize> {
        Ok(self
            .registry
            .lock()?
            .waiting
            .get(identity)
            .map_or(0, HashSet::len))
    }

    pub fn consumer_count(&self) -> Result<usize> {
        Ok(self.registry.lock()?.consumers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_once_then_clear() {
        let waiters = LocationWaiters::new();
        let mut rx = waiters.subscribe(1).unwrap();
        waiters.wait_for("alice", 1).unwrap();

        assert_eq!(waiters.notify("alice", Some("usa")).unwrap(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            LocationFound {
                identity: "alice".to_string(),
                location: Some("usa".to_string())
            }
        );
        assert_eq!(waiters.notify("alice", Some("peru")).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_consumer_prunes_empty_sets() {
        let waiters = LocationWaiters::new();
        let _rx1 = waiters.subscribe(1).unwrap();
        let _rx2 = waiters.subscribe(2).unwrap();
        waiters.wait_for("alice", 1).unwrap();
        waiters.wait_for("bob", 1).unwrap();
        waiters.wait_for("bob", 2).unwrap();

        waiters.remove_consumer(1).unwrap();
        assert_eq!(waiters.waiting_on("alice").unwrap(), 0);
        assert_eq!(waiters.waiting_on("bob").unwrap(), 1);
        assert_eq!(waiters.consumer_count().unwrap(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_forgotten() {
        let waiters = LocationWaiters::new();
        let rx = waiters.subscribe(7).unwrap();
        waiters.wait_for("alice", 7).unwrap();
        waiters.wait_for("bob", 7).unwrap();
        drop(rx);

        assert_eq!(waiters.notify("alice", None).unwrap(), 0);
        assert_eq!(waiters.consumer_count().unwrap(), 0);
        assert_eq!(waiters.waiting_on("bob").unwrap(), 0);
    }
}
