/*!
 * Message Transport
 * Frame-level abstraction under the remote bridge, plus an in-memory duplex
 * link that can be severed and reopened
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::events::EventBroadcaster;
use crate::types::{FsError, FsResult};

/// A bidirectional frame channel.
///
/// `subscribe_connections` fires once per (re)connection; the first firing is
/// the initial connect.
pub trait MessageTransport: Send + Sync {
    /// Send one frame to the peer
    fn send(&self, frame: Vec<u8>) -> FsResult<()>;

    /// Receiver of frames from the peer
    fn incoming(&self) -> flume::Receiver<Vec<u8>>;

    /// Connection-opened events
    fn subscribe_connections(&self) -> broadcast::Receiver<()>;
}

/// One end of an in-memory duplex link
pub struct DuplexTransport {
    to_peer: flume::Sender<Vec<u8>>,
    inbox: flume::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    connections: EventBroadcaster<()>,
}

impl MessageTransport for DuplexTransport {
    fn send(&self, frame: Vec<u8>) -> FsResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(FsError::Unavailable("link is down".to_string()));
        }
        self.to_peer
            .send(frame)
            .map_err(|_| FsError::Unavailable("peer is gone".to_string()))
    }

    fn incoming(&self) -> flume::Receiver<Vec<u8>> {
        self.inbox.clone()
    }

    fn subscribe_connections(&self) -> broadcast::Receiver<()> {
        self.connections.subscribe()
    }
}

/// Controller over an in-memory duplex pair.
///
/// Both ends share one connectivity flag; `open` after `sever` models a
/// reconnect and fires a connection event on both ends.
pub struct Link {
    connected: Arc<AtomicBool>,
    end_a_events: EventBroadcaster<()>,
    end_b_events: EventBroadcaster<()>,
}

impl Link {
    /// Build a link and its two transport ends (client side, server side)
    #[must_use]
    pub fn new() -> (Link, DuplexTransport, DuplexTransport) {
        let (a_to_b, b_inbox) = flume::unbounded();
        let (b_to_a, a_inbox) = flume::unbounded();
        let connected = Arc::new(AtomicBool::new(false));
        let end_a_events = EventBroadcaster::default();
        let end_b_events = EventBroadcaster::default();

        let end_a = DuplexTransport {
            to_peer: a_to_b,
            inbox: a_inbox,
            connected: Arc::clone(&connected),
            connections: end_a_events.clone(),
        };
        let end_b = DuplexTransport {
            to_peer: b_to_a,
            inbox: b_inbox,
            connected: Arc::clone(&connected),
            connections: end_b_events.clone(),
        };

        (
            Link {
                connected,
                end_a_events,
                end_b_events,
            },
            end_a,
            end_b,
        )
    }

    /// Bring the link up and notify both ends
    pub fn open(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.end_a_events.emit(());
        self.end_b_events.emit(());
    }

    /// Drop the link; sends fail until the next `open`
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_cross_the_link() {
        let (link, client_end, server_end) = Link::new();
        link.open();

        client_end.send(b"ping".to_vec()).unwrap();
        assert_eq!(server_end.incoming().recv().unwrap(), b"ping");

        server_end.send(b"pong".to_vec()).unwrap();
        assert_eq!(client_end.incoming().recv().unwrap(), b"pong");
    }

    #[test]
    fn test_severed_link_rejects_sends() {
        let (link, client_end, _server_end) = Link::new();
        link.open();
        link.sever();
        assert!(matches!(
            client_end.send(b"x".to_vec()),
            Err(FsError::Unavailable(_))
        ));

        link.open();
        assert!(client_end.send(b"x".to_vec()).is_ok());
    }

    #[test]
    fn test_reconnect_fires_connection_events() {
        let (link, client_end, _server_end) = Link::new();
        let mut rx = client_end.subscribe_connections();

        link.open();
        link.sever();
        link.open();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
