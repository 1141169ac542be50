use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::track::track_remote::TrackRemote;

/// Inbound media packets feeding a playback sink.
#[async_trait]
pub trait PacketSource: Send + 'static {
    /// Payload size of the next packet, or `None` once the source ends.
    async fn next_packet(&mut self) -> Option<usize>;
}

#[async_trait]
impl PacketSource for Arc<TrackRemote> {
    async fn next_packet(&mut self) -> Option<usize> {
        match self.read_rtp().await {
            Ok((packet, _)) => Some(packet.payload.len()),
            Err(err) => {
                debug!(%err, ssrc = self.ssrc(), "rtp read ended");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct Counters {
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// Drains an inbound track and accounts what was received.
pub struct PlaybackSink {
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl PlaybackSink {
    pub fn spawn<S: PacketSource>(mut source: S) -> Self {
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);

        let task = tokio::spawn(async move {
            while let Some(len) = source.next_packet().await {
                let packets = task_counters.packets.fetch_add(1, Ordering::Relaxed) + 1;
                task_counters.bytes.fetch_add(len as u64, Ordering::Relaxed);
                if packets == 1 {
                    info!("audio stream started");
                }
            }
            info!(
                packets = task_counters.packets.load(Ordering::Relaxed),
                bytes = task_counters.bytes.load(Ordering::Relaxed),
                "audio stream ended"
            );
        });

        Self { counters, task }
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            packets: self.counters.packets.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the source to end and returns the final counts.
    pub async fn finish(self) -> PlaybackStats {
        let counters = Arc::clone(&self.counters);
        let _ = self.task.await;
        PlaybackStats {
            packets: counters.packets.load(Ordering::Relaxed),
            bytes: counters.bytes.load(Ordering::Relaxed),
        }
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelSource(mpsc::UnboundedReceiver<Vec<u8>>);

    #[async_trait]
    impl PacketSource for ChannelSource {
        async fn next_packet(&mut self) -> Option<usize> {
            self.0.recv().await.map(|payload| payload.len())
        }
    }

    #[tokio::test]
    async fn counts_packets_until_source_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = PlaybackSink::spawn(ChannelSource(rx));

        tx.send(vec![0u8; 160]).unwrap();
        tx.send(vec![0u8; 80]).unwrap();
        drop(tx);

        let stats = sink.finish().await;
        assert_eq!(stats, PlaybackStats { packets: 2, bytes: 240 });
    }

    #[tokio::test]
    async fn close_stops_draining() {
        let (_tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let sink = PlaybackSink::spawn(ChannelSource(rx));

        sink.close();
        tokio::task::yield_now().await;
        let stats = sink.finish().await;
        assert_eq!(stats, PlaybackStats::default());
    }
}
