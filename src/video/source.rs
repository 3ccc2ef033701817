//! UDP packet source
//!
//! The robot pushes one compressed packet per datagram to a fixed local
//! port. Binding the port counts as the connection event.

use crate::video::{VideoError, VideoEvent};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 2048;

pub struct VideoSource {
    socket: UdpSocket,
}

impl VideoSource {
    pub async fn bind(addr: SocketAddr) -> Result<Self, VideoError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| VideoError::Bind { addr, source })?;
        info!("Listening for video on {}", addr);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Emits `Connected`, then one `Frame` per datagram until cancelled
    ///
    /// Returns the number of packets forwarded.
    pub async fn run(self, events: mpsc::Sender<VideoEvent>, cancel: CancellationToken) -> u64 {
        if events.send(VideoEvent::Connected).await.is_err() {
            return 0;
        }

        let mut buf = [0u8; MAX_DATAGRAM];
        let mut packets = 0u64;
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) => {
                    let packet = Bytes::copy_from_slice(&buf[..len]);
                    if events.send(VideoEvent::Frame(packet)).await.is_err() {
                        debug!("Relay gone, video source stopping");
                        break;
                    }
                    packets += 1;
                    if packets == 1 {
                        info!("First video packet from {}", from);
                    }
                }
                Err(e) => warn!("Video socket receive failed: {}", e),
            }
        }

        info!("Video source stopped after {} packets", packets);
        packets
    }

    pub fn spawn(
        self,
        events: mpsc::Sender<VideoEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<u64> {
        tokio::spawn(self.run(events, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn datagrams_become_frames_after_connected() {
        let source = VideoSource::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = source.local_addr().unwrap();
        let (events_tx, mut events) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = source.spawn(events_tx, cancel.clone());

        assert_eq!(events.recv().await, Some(VideoEvent::Connected));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"h264", addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(VideoEvent::Frame(Bytes::from_static(b"h264"))));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = VideoSource::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();
        let second = VideoSource::bind(addr).await;
        assert!(matches!(second, Err(VideoError::Bind { .. })));
    }
}
