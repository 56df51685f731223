//! # WebRTC Bridge
//!
//! Created on `OFFER`: a peer connection plus an outbound video
//! track, both owned by a dedicated OS thread running its own
//! single-threaded `tokio` runtime, so the worker's pipeline thread is
//! never blocked by the media stack — one event-loop thread per
//! attached WebRTC viewer.
//!
//! This is not a transcoder: the outbound track carries
//! JPEG-encoded samples rather than a real H.264/VP8 bitstream, the same
//! scoping decision `VideoSink` makes for recorded segments.

use crate::config::Tunables;
use crate::sinks::BufferSink;
use crate::webrtc::merger::merge_frames;
use crate::webrtc::track::{overlay_too_slow, FrameTimer, SlowWorkflowTracker};
use bytes::Bytes;
use orchestrator_domain::protocol::TurnConfig;
use orchestrator_domain::value_objects::FrameImage;
use orchestrator_domain::OrchestratorError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Handle to a running bridge; dropping it does not stop the event
/// loop — call `stop()` explicitly (worker TERMINATE / connection
/// lifecycle both do).
pub struct WebrtcBridge {
    stop: CancellationToken,
    thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl WebrtcBridge {
    /// Spawns the bridge's dedicated thread, negotiates the session
    /// inside it, and returns once the SDP answer is ready.
    pub async fn create(
        sdp_offer: String,
        turn_config: Option<TurnConfig>,
        stream_output: Option<String>,
        buffer_sink: Arc<BufferSink>,
        tunables: &Tunables,
    ) -> Result<(Arc<Self>, String), OrchestratorError> {
        let stop = CancellationToken::new();
        let processing_timeout = tunables.webrtc_processing_timeout();
        let max_consecutive_timeouts = tunables.webrtc_max_consecutive_timeouts;
        let min_consecutive_on_time = tunables.webrtc_min_consecutive_on_time;
        let (answer_tx, answer_rx) = oneshot::channel::<Result<String, String>>();

        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("webrtc-bridge".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = answer_tx.send(Err(format!("building bridge runtime: {e}")));
                        return;
                    }
                };
                runtime.block_on(run_bridge(
                    sdp_offer,
                    turn_config,
                    stream_output,
                    buffer_sink,
                    thread_stop,
                    processing_timeout,
                    max_consecutive_timeouts,
                    min_consecutive_on_time,
                    answer_tx,
                ));
            })
            .map_err(|e| OrchestratorError::internal_error(format!("spawning webrtc bridge thread: {e}")))?;

        let answer = answer_rx
            .await
            .map_err(|_| OrchestratorError::internal_error("webrtc bridge thread exited before answering"))?
            .map_err(OrchestratorError::operation_error)?;

        Ok((Arc::new(Self { stop, thread: std::sync::Mutex::new(Some(thread)) }), answer))
    }

    pub fn stop(&self) {
        self.stop.cancel();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_bridge(
    sdp_offer: String,
    turn_config: Option<TurnConfig>,
    stream_output: Option<String>,
    buffer_sink: Arc<BufferSink>,
    stop: CancellationToken,
    processing_timeout: std::time::Duration,
    max_consecutive_timeouts: u32,
    min_consecutive_on_time: u32,
    answer_tx: oneshot::Sender<Result<String, String>>,
) {
    let setup = negotiate(sdp_offer, turn_config, &stop).await;
    let (peer_connection, track, answer_sdp) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            let _ = answer_tx.send(Err(e));
            return;
        }
    };
    let _ = answer_tx.send(Ok(answer_sdp));

    let mut timer = FrameTimer::new(None);
    let mut slow_tracker = SlowWorkflowTracker::new(max_consecutive_timeouts, min_consecutive_on_time);
    let mut last_good: Option<FrameImage> = None;

    loop {
        if stop.is_cancelled() {
            break;
        }
        match peer_connection.connection_state() {
            webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState::Failed
            | webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState::Closed => break,
            _ => {}
        }

        let drained = drain_latest_per_source(&buffer_sink, stream_output.as_deref());
        if drained.is_empty() {
            tokio::time::sleep(processing_timeout.min(std::time::Duration::from_millis(20))).await;
            if !slow_tracker.record_timeout() {
                continue;
            }
            if let Some(frame) = &last_good {
                let overlay = overlay_too_slow(frame);
                let _ = write_frame(&track, &overlay, &mut timer).await;
            }
            continue;
        }

        slow_tracker.record_success();
        let merged = merge_frames(&drained);
        last_good = Some(merged.clone());
        if write_frame(&track, &merged, &mut timer).await.is_err() {
            break;
        }
    }

    let _ = peer_connection.close().await;
}

async fn negotiate(
    sdp_offer: String,
    turn_config: Option<TurnConfig>,
    stop: &CancellationToken,
) -> Result<(Arc<webrtc::peer_connection::RTCPeerConnection>, Arc<TrackLocalStaticSample>, String), String> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().map_err(|e| format!("registering codecs: {e}"))?;
    let api = APIBuilder::new().with_media_engine(media_engine).build();

    let mut ice_servers = Vec::new();
    if let Some(turn) = turn_config {
        ice_servers.push(RTCIceServer {
            urls: turn.urls,
            username: turn.username.unwrap_or_default(),
            credential: turn.credential.unwrap_or_default(),
            ..Default::default()
        });
    }
    let config = RTCConfiguration { ice_servers, ..Default::default() };

    let peer_connection =
        Arc::new(api.new_peer_connection(config).await.map_err(|e| format!("creating peer connection: {e}"))?);

    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability { mime_type: "image/jpeg".to_owned(), ..Default::default() },
        "video".to_owned(),
        "orchestrator".to_owned(),
    ));

    let rtp_sender = peer_connection
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| format!("adding track: {e}"))?;
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
    });

    let on_state_stop = stop.clone();
    peer_connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let on_state_stop = on_state_stop.clone();
        Box::pin(async move {
            if matches!(state, RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed) {
                on_state_stop.cancel();
            }
        })
    }));

    let offer = RTCSessionDescription::offer(sdp_offer).map_err(|e| format!("parsing SDP offer: {e}"))?;
    peer_connection.set_remote_description(offer).await.map_err(|e| format!("setting remote description: {e}"))?;

    let answer = peer_connection.create_answer(None).await.map_err(|e| format!("creating answer: {e}"))?;
    let mut gather_complete = peer_connection.gathering_complete_promise().await;
    peer_connection.set_local_description(answer).await.map_err(|e| format!("setting local description: {e}"))?;
    let _ = gather_complete.recv().await;

    let local_description =
        peer_connection.local_description().await.ok_or_else(|| "no local description after negotiation".to_string())?;

    Ok((peer_connection, track, local_description.sdp))
}

/// Drains every frame currently on the WebRTC ring, keeping only the
/// most recent per source this tick, and selects each one's visual
/// field.
fn drain_latest_per_source(
    buffer_sink: &Arc<BufferSink>,
    stream_output: Option<&str>,
) -> Vec<(orchestrator_domain::value_objects::SourceId, FrameImage)> {
    let mut latest: HashMap<orchestrator_domain::value_objects::SourceId, FrameImage> = HashMap::new();
    while let Some(frame) = buffer_sink.try_recv_webrtc() {
        let visual = frame.select_visual(stream_output).clone();
        latest.insert(frame.source_id, visual);
    }
    latest.into_iter().collect()
}

async fn write_frame(track: &Arc<TrackLocalStaticSample>, image: &FrameImage, timer: &mut FrameTimer) -> Result<(), String> {
    let mut jpeg_bytes = Vec::new();
    if let Some(buf) =
        image::ImageBuffer::<image::Rgb<u8>, _>::from_raw(image.width, image.height, image.data.to_vec())
    {
        let _ = buf.write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg);
    }
    let (_pts, duration) = timer.next();
    track
        .write_sample(&Sample { data: Bytes::from(jpeg_bytes), duration, ..Default::default() })
        .await
        .map_err(|e| format!("writing sample: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_latest_per_source_keeps_newest_per_source() {
        let sink = BufferSink::new(8);
        use orchestrator_domain::value_objects::{FrameImage as Img, SourceId};
        use std::collections::HashMap as Map;
        let frame = |source: &str, id: u64| orchestrator_domain::value_objects::FrameEnvelope {
            source_id: SourceId::new(source),
            frame_id: id,
            frame_timestamp_ms: 0,
            image: Img::new(2, 2, vec![0u8; 12]),
            prediction: Map::new(),
        };
        use orchestrator_domain::ports::Sink;
        sink.on_prediction(frame("a", 1));
        sink.on_prediction(frame("a", 2));
        sink.on_prediction(frame("b", 1));

        let drained = drain_latest_per_source(&sink, None);
        assert_eq!(drained.len(), 2);
    }
}
