// src/core/pubsub/mod.rs

//! The publish/subscribe hub.
//!
//! Unlike a broadcast-channel based hub, this one tracks each subscriber's
//! `Connection` handle directly and writes to it from inside `publish`, so
//! that unsubscribing a connection provably stops further delivery to it
//! (invariant I4) without waiting for a receiver to be dropped.

use crate::connection::{Connection, ConnId};
use crate::core::protocol::RespFrame;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// `PubSubHub` owns both halves of the subscription table described in §3:
/// channel -> subscribers, and connection -> its subscribed channels (kept
/// for O(k) cleanup on disconnect).
#[derive(Default)]
pub struct PubSubHub {
    channels: DashMap<Bytes, Vec<Connection>>,
    subscribed: DashMap<ConnId, HashSet<Bytes>>,
}

impl PubSubHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `conn` to each channel in `channels`, returning one
    /// (channel, new_subscription_count) pair per channel in order, which
    /// the caller turns into the per-channel acknowledgment frames.
    pub fn subscribe(&self, conn: &Connection, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let mut acks = Vec::with_capacity(channels.len());
        let mut my_subs = self.subscribed.entry(conn.id).or_default();
        for channel in channels {
            let mut subscribers = self.channels.entry(channel.clone()).or_default();
            if !subscribers.iter().any(|c| c.id == conn.id) {
                subscribers.push(conn.clone());
            }
            if my_subs.insert(channel.clone()) {
                crate::core::metrics::METRICS.active_subscriptions.inc();
            }
            acks.push((channel.clone(), my_subs.len()));
        }
        acks
    }

    /// Unsubscribes `conn` from `channels`. An empty slice means "every
    /// channel this connection currently subscribes to", per spec.
    pub fn unsubscribe(&self, conn: &Connection, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let targets: Vec<Bytes> = if channels.is_empty() {
            self.subscribed
                .get(&conn.id)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            channels.to_vec()
        };

        let mut acks = Vec::with_capacity(targets.len());
        let mut my_subs = self.subscribed.entry(conn.id).or_default();
        for channel in &targets {
            if let Some(mut subscribers) = self.channels.get_mut(channel) {
                subscribers.retain(|c| c.id != conn.id);
                if subscribers.is_empty() {
                    drop(subscribers);
                    self.channels.remove(channel);
                }
            }
            if my_subs.remove(channel) {
                crate::core::metrics::METRICS.active_subscriptions.dec();
            }
            acks.push((channel.clone(), my_subs.len()));
        }
        acks
    }

    /// Drops `conn` from every channel it subscribed to, without sending
    /// acknowledgments. Called from `AfterClientClose`.
    pub fn unsubscribe_all(&self, conn_id: ConnId) {
        let Some((_, channels)) = self.subscribed.remove(&conn_id) else {
            return;
        };
        crate::core::metrics::METRICS.active_subscriptions.sub(channels.len() as i64);
        for channel in channels {
            if let Some(mut subscribers) = self.channels.get_mut(&channel) {
                subscribers.retain(|c| c.id != conn_id);
                if subscribers.is_empty() {
                    drop(subscribers);
                    self.channels.remove(&channel);
                }
            }
        }
    }

    /// Delivers `payload` to every current subscriber of `channel`, one at a
    /// time and in the order they're stored, awaiting each connection's
    /// outbox. Returns how many subscribers actually received it. Delivery
    /// is deliberately synchronous: a slow subscriber slows this call, which
    /// is how backpressure reaches the publisher (see §4.4).
    pub async fn publish(&self, channel: &Bytes, payload: Bytes) -> usize {
        let subscribers = match self.channels.get(channel) {
            Some(subs) => subs.clone(),
            None => return 0,
        };
        let mut delivered = 0;
        for conn in &subscribers {
            let frame = RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"message")),
                RespFrame::BulkString(channel.clone()),
                RespFrame::BulkString(payload.clone()),
            ]);
            if conn.send(frame).await {
                delivered += 1;
            }
        }
        if delivered < subscribers.len() {
            debug!(
                "publish to '{}' reached {}/{} subscribers",
                String::from_utf8_lossy(channel),
                delivered,
                subscribers.len()
            );
        }
        delivered
    }

    pub fn subscription_count(&self, conn_id: ConnId) -> usize {
        self.subscribed.get(&conn_id).map_or(0, |s| s.len())
    }
}
