use anyhow::{anyhow, Result};
use rumqttc::{Event, Outgoing, Packet};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type AckSender = oneshot::Sender<Result<()>>;

/// Matches QoS 1 publishes with the broker's PubAck
///
/// rumqttc assigns packet ids inside the event loop, so a waiter sits in
/// request order until the event loop reports `Outgoing::Publish(pkid)`,
/// then waits under that id for the PubAck.
#[derive(Default)]
pub(crate) struct PublishAcks {
    connected: AtomicBool,
    state: Mutex<AckState>,
}

#[derive(Default)]
struct AckState {
    unassigned: VecDeque<AckSender>,
    in_flight: HashMap<u16, AckSender>,
    // Failed on disconnect; the event loop resends these after reconnecting
    abandoned: HashSet<u16>,
}

impl PublishAcks {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Register a waiter for the publish about to be queued
    pub(crate) fn enqueue(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.lock().unassigned.push_back(tx);
        rx
    }

    /// Undo the last [`enqueue`](Self::enqueue) when the request never reached the event loop
    pub(crate) fn cancel_last(&self) {
        self.lock().unassigned.pop_back();
    }

    pub(crate) fn observe(&self, event: &Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                self.connected.store(true, Ordering::Release);
            }
            Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
                self.connection_lost();
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                let mut state = self.lock();
                if state.abandoned.remove(pkid) {
                    return;
                }
                if let Some(tx) = state.unassigned.pop_front() {
                    state.in_flight.insert(*pkid, tx);
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                if let Some(tx) = self.lock().in_flight.remove(&ack.pkid) {
                    let _ = tx.send(Ok(()));
                }
            }
            _ => {}
        }
    }

    /// Fail every publish already handed to the broker
    pub(crate) fn connection_lost(&self) {
        self.connected.store(false, Ordering::Release);

        let mut state = self.lock();
        let in_flight: Vec<_> = state.in_flight.drain().collect();
        for (pkid, tx) in in_flight {
            state.abandoned.insert(pkid);
            let _ = tx.send(Err(anyhow!(
                "connection lost before PubAck for packet {}",
                pkid
            )));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        let state = self.lock();
        state.unassigned.len() + state.in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, AckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
