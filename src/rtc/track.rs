//! Forwarded broadcaster tracks

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use crate::peer::{MediaTrack, TrackKind};

/// A broadcaster track, re-published as a local track viewers can attach
///
/// All clones share the forwarding task; stopping any clone stops it.
#[derive(Clone)]
pub struct RelayTrack {
    id: String,
    kind: TrackKind,
    local: Arc<TrackLocalStaticRTP>,
    cancel: CancellationToken,
}

impl RelayTrack {
    /// Start forwarding `remote` into a new local track
    ///
    /// For video, a keyframe is requested from the broadcaster every
    /// `keyframe_interval` so viewers joining mid-stream can start decoding.
    /// Returns None for tracks of unknown kind.
    pub(crate) fn forward(
        remote: Arc<TrackRemote>,
        pc: Weak<RTCPeerConnection>,
        keyframe_interval: Duration,
    ) -> Option<Self> {
        let kind = match remote.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            RTPCodecType::Unspecified => return None,
        };

        let id = remote.id();
        let local = Arc::new(TrackLocalStaticRTP::new(
            remote.codec().capability,
            id.clone(),
            remote.stream_id(),
        ));
        let cancel = CancellationToken::new();

        tokio::spawn(forward_rtp(
            Arc::clone(&remote),
            Arc::clone(&local),
            cancel.clone(),
        ));
        if kind == TrackKind::Video {
            tokio::spawn(request_keyframes(
                pc,
                remote.ssrc(),
                keyframe_interval,
                cancel.clone(),
            ));
        }

        Some(Self {
            id,
            kind,
            local,
            cancel,
        })
    }

    /// Local track written to by the forwarder
    pub fn local(&self) -> &Arc<TrackLocalStaticRTP> {
        &self.local
    }

    /// Check if forwarding was stopped
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl MediaTrack for RelayTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for RelayTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn forward_rtp(
    remote: Arc<TrackRemote>,
    local: Arc<TrackLocalStaticRTP>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = remote.read_rtp() => match read {
                Ok((packet, _)) => {
                    // Viewers come and go; a closed binding is not fatal
                    if let Err(e) = local.write_rtp(&packet).await {
                        if !matches!(e, webrtc::Error::ErrClosedPipe) {
                            tracing::debug!(track_id = %local.id(), error = %e, "RTP write failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(track_id = %local.id(), error = %e, "Remote track ended");
                    break;
                }
            },
        }
    }
    cancel.cancel();
}

async fn request_keyframes(
    pc: Weak<RTCPeerConnection>,
    media_ssrc: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(pc) = pc.upgrade() else {
                    break;
                };
                let pli = PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc,
                };
                if let Err(e) = pc.write_rtcp(&[Box::new(pli)]).await {
                    tracing::debug!(ssrc = media_ssrc, error = %e, "Keyframe request failed");
                    break;
                }
            }
        }
    }
}
