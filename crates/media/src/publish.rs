use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use tokio::{task::JoinHandle, time};
use tracing::{debug, warn};
use webrtc::{
    api::media_engine::MIME_TYPE_OPUS, media::Sample,
    rtp_transceiver::rtp_codec::RTCRtpCodecCapability,
    track::track_local::track_local_static_sample::TrackLocalStaticSample,
};

/// One 20 ms Opus frame of digital silence (TOC 0xf8, CELT fullband).
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const FRAME_DURATION: Duration = Duration::from_millis(20);

pub fn opus_track(stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        "audio".to_owned(),
        stream_id.to_owned(),
    ))
}

/// Keeps an outbound audio track alive by pacing Opus silence into it.
pub struct SilencePublisher {
    frames: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SilencePublisher {
    pub fn spawn(track: Arc<TrackLocalStaticSample>) -> Self {
        let frames = Arc::new(AtomicU64::new(0));
        let written = Arc::clone(&frames);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(FRAME_DURATION);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: Bytes::from_static(&OPUS_SILENCE),
                    duration: FRAME_DURATION,
                    timestamp: SystemTime::now(),
                    ..Default::default()
                };
                if let Err(err) = track.write_sample(&sample).await {
                    warn!(%err, "outbound audio track rejected sample; stopping");
                    break;
                }
                if written.fetch_add(1, Ordering::Relaxed) == 0 {
                    debug!("outbound silence started");
                }
            }
        });

        Self { frames, task }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.task.abort();
    }
}
