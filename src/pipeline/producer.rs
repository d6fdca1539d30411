//! Production loop
//!
//! Waits for the next captured frame (`awaiting-frame`), handles it
//! (`frame-available`) and goes back to waiting, until cancellation or the
//! end of the capture stream (`terminated`). Handling a frame:
//!
//! - empty payload: dropped, not an error
//! - no viewers attached: stored at full resolution only, never transcoded
//! - viewers attached: transcoded to the viewer resolution, both slots
//!   replaced together, watchers notified
//! - transcode failure: logged and dropped; the next frame is unaffected
//!
//! The captured frame is dropped at the end of every branch, which returns
//! its buffer to the capture source.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::config::PipelineConfig;
use crate::capture::{CapturedFrame, FrameReceiver};
use crate::error::{Error, Result};
use crate::hub::{Frame, FrameHub, Resolution};
use crate::transcode::{Transcode, TranscodeError};

/// What happened to one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Empty payload, discarded
    Empty,
    /// No viewers; only the full-resolution slot was updated
    Idle,
    /// Both slots updated and watchers notified
    Published,
    /// Transcode failed; frame discarded
    TranscodeFailed,
}

/// Single writer of the frame hub
pub struct Producer {
    hub: Arc<FrameHub>,
    transcoder: Arc<dyn Transcode>,
    target: Resolution,
}

impl Producer {
    /// Create a producer publishing into `hub`
    pub fn new(hub: Arc<FrameHub>, transcoder: Arc<dyn Transcode>, config: &PipelineConfig) -> Self {
        Self {
            hub,
            transcoder,
            target: config.viewer_resolution,
        }
    }

    /// Run until cancelled or until the capture stream ends
    ///
    /// End of stream means the capture device went away and is returned as
    /// [`Error::DeviceLost`]. Cancellation returns `Ok(())`.
    pub async fn run(&self, mut frames: FrameReceiver, cancel: CancellationToken) -> Result<()> {
        tracing::info!(viewer_resolution = %self.target, "Frame production started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Frame production cancelled");
                    return Ok(());
                }
                next = frames.recv() => next,
            };

            let Some(frame) = next else {
                tracing::error!("Frame channel closed, capture device disconnected");
                return Err(Error::DeviceLost);
            };

            self.process(frame).await;
        }
    }

    /// Handle one captured frame
    pub async fn process(&self, frame: CapturedFrame) -> FrameOutcome {
        let stats = self.hub.stats();
        stats.record_received();

        if frame.is_empty() {
            stats.record_empty();
            return FrameOutcome::Empty;
        }

        let full = Frame::from(frame.data().clone());

        if !self.hub.demand().has_viewers() {
            self.hub.store().store_full(full);
            stats.record_idle();
            return FrameOutcome::Idle;
        }

        match self.transcode(full.data().clone()).await {
            Ok(viewer) => {
                self.hub.store().store_pair(full, Frame::from(viewer));
                self.hub.notifier().notify();
                stats.record_transcoded();
                FrameOutcome::Published
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = full.len(), "Failed to transcode frame");
                stats.record_transcode_failure();
                FrameOutcome::TranscodeFailed
            }
        }
    }

    async fn transcode(&self, data: Bytes) -> std::result::Result<Bytes, TranscodeError> {
        let transcoder = Arc::clone(&self.transcoder);
        let Resolution { width, height } = self.target;

        tokio::task::spawn_blocking(move || transcoder.transcode(&data, width, height))
            .await
            .map_err(|e| TranscodeError::Aborted(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::capture::{self, ReleaseHandle};

    /// Prefixes the payload with "sd:" and rejects payloads starting with "bad"
    #[derive(Default)]
    struct TagTranscoder {
        calls: AtomicUsize,
    }

    impl Transcode for TagTranscoder {
        fn transcode(&self, jpeg: &[u8], _w: u32, _h: u32) -> std::result::Result<Bytes, TranscodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if jpeg.starts_with(b"bad") {
                return Err(TranscodeError::Decode("corrupt".into()));
            }
            let mut out = b"sd:".to_vec();
            out.extend_from_slice(jpeg);
            Ok(out.into())
        }
    }

    fn producer() -> (Producer, Arc<FrameHub>, Arc<TagTranscoder>) {
        let hub = Arc::new(FrameHub::new());
        let transcoder = Arc::new(TagTranscoder::default());
        let producer = Producer::new(
            Arc::clone(&hub),
            transcoder.clone(),
            &PipelineConfig::default(),
        );
        (producer, hub, transcoder)
    }

    fn counted(data: &'static [u8], released: &Arc<AtomicUsize>) -> CapturedFrame {
        let released = Arc::clone(released);
        CapturedFrame::with_release(
            data,
            ReleaseHandle::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test]
    async fn test_idle_frame_not_transcoded() {
        let (producer, hub, transcoder) = producer();

        let outcome = producer.process(CapturedFrame::new(vec![0xAA; 100])).await;

        assert_eq!(outcome, FrameOutcome::Idle);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(hub.store().read_full().unwrap().len(), 100);
        assert!(hub.store().read_viewer().is_none());
        assert_eq!(hub.notifier().sequence(), 0);
    }

    #[tokio::test]
    async fn test_idle_frame_keeps_previous_viewer_frame() {
        let (producer, hub, _) = producer();

        let guard = hub.demand().attach();
        producer.process(CapturedFrame::new(&b"frame-1"[..])).await;
        drop(guard);
        producer.process(CapturedFrame::new(&b"frame-2"[..])).await;

        assert_eq!(hub.store().read_full().unwrap().data().as_ref(), b"frame-2");
        assert_eq!(
            hub.store().read_viewer().unwrap().data().as_ref(),
            b"sd:frame-1"
        );
    }

    #[tokio::test]
    async fn test_viewer_frame_published() {
        let (producer, hub, transcoder) = producer();
        let _guard = hub.demand().attach();
        let mut watcher = hub.notifier().subscribe();

        let outcome = producer.process(CapturedFrame::new(&b"frame-b"[..])).await;

        assert_eq!(outcome, FrameOutcome::Published);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
        assert!(timeout(Duration::from_secs(1), watcher.changed()).await.unwrap());

        let (full, viewer) = hub.store().read_pair();
        assert_eq!(full.unwrap().data().as_ref(), b"frame-b");
        assert_eq!(viewer.unwrap().data().as_ref(), b"sd:frame-b");
    }

    #[tokio::test]
    async fn test_empty_frame_ignored() {
        let (producer, hub, _) = producer();
        let _guard = hub.demand().attach();

        let outcome = producer.process(CapturedFrame::new(Bytes::new())).await;

        assert_eq!(outcome, FrameOutcome::Empty);
        assert!(hub.store().read_full().is_none());
        assert_eq!(hub.snapshot().empty_frames, 1);
    }

    #[tokio::test]
    async fn test_transcode_failure_does_not_stop_next_frame() {
        let (producer, hub, _) = producer();
        let _guard = hub.demand().attach();
        let (tx, rx) = capture::channel(4);

        tx.send(CapturedFrame::new(&b"bad-frame"[..])).await.unwrap();
        tx.send(CapturedFrame::new(&b"good-frame"[..])).await.unwrap();
        drop(tx);

        let result = producer.run(rx, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::DeviceLost)));

        assert_eq!(
            hub.store().read_viewer().unwrap().data().as_ref(),
            b"sd:good-frame"
        );
        let snap = hub.snapshot();
        assert_eq!(snap.transcode_failures, 1);
        assert_eq!(snap.frames_transcoded, 1);
    }

    #[tokio::test]
    async fn test_failed_frame_leaves_slots_untouched() {
        let (producer, hub, _) = producer();
        let _guard = hub.demand().attach();

        producer.process(CapturedFrame::new(&b"frame-1"[..])).await;
        let outcome = producer.process(CapturedFrame::new(&b"bad"[..])).await;

        assert_eq!(outcome, FrameOutcome::TranscodeFailed);
        assert_eq!(hub.store().read_full().unwrap().data().as_ref(), b"frame-1");
        assert_eq!(hub.notifier().sequence(), 1);
    }

    #[tokio::test]
    async fn test_frames_released_on_every_path() {
        let (producer, hub, _) = producer();
        let released = Arc::new(AtomicUsize::new(0));

        producer.process(counted(b"", &released)).await;
        producer.process(counted(b"idle", &released)).await;
        let guard = hub.demand().attach();
        producer.process(counted(b"published", &released)).await;
        producer.process(counted(b"bad", &released)).await;
        drop(guard);

        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_device_lost() {
        let (producer, _, _) = producer();
        let (tx, rx) = capture::channel(1);
        drop(tx);

        let err = producer.run(rx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::DeviceLost));
        assert_eq!(err.exit_status(), crate::ExitStatus::DeviceError);
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let (producer, _, _) = producer();
        let (_tx, rx) = capture::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = timeout(Duration::from_secs(1), producer.run(rx, cancel)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_all_watchers_see_final_frame() {
        let (producer, hub, _) = producer();
        let _guard = hub.demand().attach();
        let mut watchers: Vec<_> = (0..5).map(|_| hub.notifier().subscribe()).collect();
        let (tx, rx) = capture::channel(16);

        for i in 0..10u8 {
            tx.send(CapturedFrame::new(vec![b'f', i])).await.unwrap();
        }
        drop(tx);
        let _ = producer.run(rx, CancellationToken::new()).await;

        for watcher in watchers.iter_mut() {
            assert!(timeout(Duration::from_secs(1), watcher.changed()).await.unwrap());
            let viewer = hub.store().read_viewer().unwrap();
            assert_eq!(viewer.data().as_ref(), b"sd:f\x09");
        }
    }
}
