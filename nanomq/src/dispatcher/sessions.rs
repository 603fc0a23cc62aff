// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Cached sessions of clients that connected with clean-start=false.
//!
//! A record is created at disconnect and consumed at the next CONNECT of
//! the same client id. While it exists, QoS > 0 publishes matching its
//! subscriptions queue up to the per-pipe bound.

use codec::v3::PublishPacket;
use codec::{QoS, TopicFilter};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Subscription snapshot carried across disconnects.
#[derive(Debug, Clone)]
pub struct CachedSubscription {
    pub filter: TopicFilter,
    pub qos: QoS,
}

#[derive(Debug)]
pub struct CachedSession {
    subscriptions: Vec<CachedSubscription>,

    /// Deliveries that were sent but not acknowledged when the connection
    /// died. They keep their original packet ids and are re-sent with the
    /// dup flag on reconnect [MQTT-4.4.0-1].
    inflight: Vec<PublishPacket>,

    /// Deliveries that arrived while the client was offline; packet ids
    /// are assigned at send time.
    pending: VecDeque<PublishPacket>,

    cached_at: Instant,
}

impl CachedSession {
    #[must_use]
    pub fn new(subscriptions: Vec<CachedSubscription>, inflight: Vec<PublishPacket>) -> Self {
        Self {
            subscriptions,
            inflight,
            pending: VecDeque::new(),
            cached_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn subscriptions(&self) -> &[CachedSubscription] {
        &self.subscriptions
    }

    /// Drain the unacknowledged deliveries in packet-id order of the old
    /// connection.
    #[must_use]
    pub fn take_inflight(&mut self) -> Vec<PublishPacket> {
        std::mem::take(&mut self.inflight)
    }

    /// Drain queued deliveries in arrival order.
    #[must_use]
    pub fn take_pending(&mut self) -> Vec<PublishPacket> {
        self.pending.drain(..).collect()
    }
}

#[derive(Debug)]
pub struct CachedSessions {
    map: HashMap<String, CachedSession>,

    /// Pending-queue bound per session, same limit as a live pipe.
    msq_len: usize,
}

impl CachedSessions {
    #[must_use]
    pub fn new(msq_len: usize) -> Self {
        Self {
            map: HashMap::new(),
            msq_len,
        }
    }

    pub fn cache(&mut self, client_id: &str, session: CachedSession) {
        // At most one session per client id.
        self.map.insert(client_id.to_string(), session);
    }

    pub fn pop(&mut self, client_id: &str) -> Option<CachedSession> {
        self.map.remove(client_id)
    }

    pub fn discard(&mut self, client_id: &str) {
        if self.map.remove(client_id).is_some() {
            log::debug!("sessions: Discarded cached session of {client_id}");
        }
    }

    /// Queue a publish for every cached session whose subscriptions match
    /// `topic`. Only QoS > 0 deliveries survive a disconnect; a full queue
    /// drops the message.
    pub fn route_publish(&mut self, packet: &PublishPacket) {
        for (client_id, session) in &mut self.map {
            let granted = session
                .subscriptions
                .iter()
                .filter(|sub| sub.filter.is_match(packet.topic()))
                .map(|sub| sub.qos)
                .max();
            let Some(granted) = granted else {
                continue;
            };
            let qos = packet.qos().degrade(granted);
            if qos == QoS::AtMostOnce {
                continue;
            }
            if session.pending.len() >= self.msq_len {
                log::debug!(
                    "sessions: Pending queue of {client_id} full, dropping publish on {}",
                    packet.topic()
                );
                continue;
            }
            let mut queued = packet.clone();
            queued.set_qos(qos);
            queued.set_retain(false);
            session.pending.push_back(queued);
        }
    }

    /// Drop records older than `ttl`.
    pub fn expire(&mut self, ttl: Duration) {
        let before = self.map.len();
        self.map.retain(|_, session| session.cached_at.elapsed() < ttl);
        let dropped = before - self.map.len();
        if dropped > 0 {
            log::info!("sessions: Expired {dropped} cached sessions");
        }
    }

    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.map.contains_key(client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(filter: &str, qos: QoS) -> CachedSubscription {
        CachedSubscription {
            filter: TopicFilter::parse(filter).unwrap(),
            qos,
        }
    }

    fn publish(topic: &str, qos: QoS) -> PublishPacket {
        PublishPacket::new(topic, qos, b"payload").unwrap()
    }

    #[test]
    fn test_route_publish() {
        let mut sessions = CachedSessions::new(8);
        sessions.cache(
            "x1",
            CachedSession::new(vec![subscription("alerts/#", QoS::AtLeastOnce)], vec![]),
        );

        sessions.route_publish(&publish("alerts/fire", QoS::AtLeastOnce));
        // QoS degrades to 0 for this one and is dropped.
        sessions.route_publish(&publish("alerts/smoke", QoS::AtMostOnce));
        sessions.route_publish(&publish("other/topic", QoS::AtLeastOnce));

        let mut session = sessions.pop("x1").unwrap();
        let pending = session.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].topic(), "alerts/fire");
    }

    #[test]
    fn test_pending_bounded() {
        let mut sessions = CachedSessions::new(2);
        sessions.cache(
            "x1",
            CachedSession::new(vec![subscription("#", QoS::ExactOnce)], vec![]),
        );
        for _ in 0..5 {
            sessions.route_publish(&publish("t", QoS::AtLeastOnce));
        }
        let mut session = sessions.pop("x1").unwrap();
        assert_eq!(session.take_pending().len(), 2);
    }

    #[test]
    fn test_inflight_kept_apart_from_pending() {
        let mut sessions = CachedSessions::new(8);
        let mut unacked = publish("alerts/fire", QoS::AtLeastOnce);
        unacked.set_packet_id(codec::PacketId::new(7));
        sessions.cache(
            "x1",
            CachedSession::new(
                vec![subscription("alerts/#", QoS::AtLeastOnce)],
                vec![unacked],
            ),
        );

        sessions.route_publish(&publish("alerts/smoke", QoS::AtLeastOnce));

        let mut session = sessions.pop("x1").unwrap();
        let inflight = session.take_inflight();
        assert_eq!(inflight.len(), 1);
        assert_eq!(inflight[0].packet_id(), codec::PacketId::new(7));
        let pending = session.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].topic(), "alerts/smoke");
    }

    #[test]
    fn test_expire() {
        let mut sessions = CachedSessions::new(8);
        sessions.cache("x1", CachedSession::new(vec![], vec![]));
        sessions.expire(Duration::from_secs(3600));
        assert!(sessions.contains("x1"));
        sessions.expire(Duration::ZERO);
        assert!(!sessions.contains("x1"));
    }
}
