use std::sync::mpsc;
use std::sync::Arc;

use super::reorder::ReorderBuffer;
use super::{CancelToken, Scene};
use crate::audio::store::SampleStore;
use crate::encode::sink::{ExportFrame, VideoSink};
use crate::error::{AbortReason, Error, Result};
use crate::render::frame::FrameRenderer;
use crate::render::target::FrameBuffer;

#[derive(Clone, Copy, Debug)]
pub struct ExportSettings {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Frames rendered ahead of the sink; 0 picks twice the pool size
    pub max_in_flight: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportReport {
    pub frames: usize,
}

/// Number of frames `i` with `i / fps < duration`, i.e. `floor(D * fps)`,
/// computed from the sample count so it is exact.
pub fn frame_count(store: &SampleStore, fps: u32) -> usize {
    let samples = store.len() as u128;
    let rate = store.sample_rate().max(1) as u128;
    (samples * fps as u128 / rate) as usize
}

pub fn frame_time(index: usize, fps: u32) -> f64 {
    index as f64 / fps.max(1) as f64
}

type FrameResult = std::result::Result<ExportFrame, String>;

/// Render every frame of the track and feed the sink in order.
///
/// Frames are computed on the rayon pool and reassembled by index. Any
/// failure or cancellation aborts the sink and nothing partial survives.
pub fn run(
    scene: Arc<Scene>,
    settings: ExportSettings,
    sink: &mut dyn VideoSink,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<ExportReport> {
    let fps = settings.fps.max(1);
    let total = frame_count(scene.store(), fps);
    let window = if settings.max_in_flight == 0 {
        rayon::current_num_threads() * 2
    } else {
        settings.max_in_flight
    };

    log::info!(
        "Exporting {} frames at {}fps ({}x{}, {} in flight)",
        total, fps, settings.width, settings.height, window
    );

    // Workers check both tokens: the caller's and our own abort flag
    let abort = CancelToken::new();
    let (tx, rx) = mpsc::channel::<(usize, FrameResult)>();
    let mut reorder: ReorderBuffer<ExportFrame> = ReorderBuffer::new();
    let mut dispatched = 0usize;
    let mut in_flight = 0usize;
    let mut written = 0usize;

    while written < total {
        if cancel.is_cancelled() {
            return Err(abort_export(sink, &abort, total, AbortReason::Cancelled, written));
        }

        while dispatched < total && dispatched < written + window {
            let index = dispatched;
            let scene = scene.clone();
            let tx = tx.clone();
            let user_cancel = cancel.clone();
            let abort = abort.clone();
            rayon::spawn(move || {
                if user_cancel.is_cancelled() || abort.is_cancelled() {
                    let _ = tx.send((index, Err("skipped after cancellation".into())));
                    return;
                }
                let _ = tx.send((index, render_frame(&scene, index, fps, settings)));
            });
            dispatched += 1;
            in_flight += 1;
        }

        let (index, result) = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => {
                let reason = AbortReason::FrameFailed {
                    index: written,
                    message: "worker channel closed".into(),
                };
                return Err(abort_export(sink, &abort, total, reason, written));
            }
        };
        in_flight -= 1;

        let frame = match result {
            Ok(frame) => frame,
            Err(_) if cancel.is_cancelled() => {
                return Err(abort_export(sink, &abort, total, AbortReason::Cancelled, written));
            }
            Err(message) => {
                return Err(abort_export(sink, &abort, total, AbortReason::FrameFailed { index, message }, written));
            }
        };
        if reorder.insert(index, frame).is_err() {
            let reason = AbortReason::FrameFailed {
                index,
                message: "frame delivered twice".into(),
            };
            return Err(abort_export(sink, &abort, total, reason, written));
        }

        while let Some((_, frame)) = reorder.pop_ready() {
            if cancel.is_cancelled() {
                return Err(abort_export(sink, &abort, total, AbortReason::Cancelled, written));
            }
            if let Err(e) = sink.write_frame(&frame) {
                return Err(abort_export(sink, &abort, total, AbortReason::SinkFailed(format!("{:#}", e)), written));
            }
            written += 1;
            on_progress(written, total);
        }
    }

    debug_assert_eq!(in_flight, 0);

    if let Err(e) = sink.finish() {
        sink.abort();
        return Err(Error::ExportAborted {
            reason: AbortReason::SinkFailed(format!("{:#}", e)),
            frames_written: written,
            total,
        });
    }

    log::info!("Export complete: {} frames", written);
    Ok(ExportReport { frames: written })
}

fn abort_export(
    sink: &mut dyn VideoSink,
    abort: &CancelToken,
    total: usize,
    reason: AbortReason,
    frames_written: usize,
) -> Error {
    abort.cancel();
    sink.abort();
    log::warn!("Export aborted after {}/{} frames: {}", frames_written, total, reason);
    Error::ExportAborted {
        reason,
        frames_written,
        total,
    }
}

fn render_frame(scene: &Scene, index: usize, fps: u32, settings: ExportSettings) -> FrameResult {
    let time = frame_time(index, fps);
    let mut buffer = FrameBuffer::new(settings.width, settings.height);
    let descriptor = scene
        .tick(&mut FrameRenderer::export(), time, &mut buffer)
        .map_err(|e| e.to_string())?;
    Ok(ExportFrame {
        index,
        timestamp_seconds: time,
        descriptor,
        buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::sink::MemorySink;
    use crate::render_loop::tests::{scene, tone_store};

    fn settings(fps: u32) -> ExportSettings {
        ExportSettings {
            fps,
            width: 32,
            height: 16,
            max_in_flight: 0,
        }
    }

    #[test]
    fn frame_count_is_floor_of_duration_times_fps() {
        assert_eq!(frame_count(&tone_store(10.0, 44100), 30), 300);
        assert_eq!(frame_count(&tone_store(1.0, 8000), 24), 24);
        // 1.01s at 30fps -> 30.3 -> 30
        assert_eq!(frame_count(&tone_store(1.01, 8000), 30), 30);
        // shorter than one frame period still covers t=0 only when 1/fps fits
        assert_eq!(frame_count(&tone_store(0.02, 8000), 30), 0);
    }

    #[test]
    fn ten_second_asset_exports_300_ordered_frames() {
        let scene = Arc::new(scene(tone_store(10.0, 44100), 128));
        let mut sink = MemorySink::default();
        let mut last_progress = 0;
        let report = run(scene, settings(30), &mut sink, &CancelToken::new(), |done, total| {
            assert_eq!(total, 300);
            last_progress = done;
        })
        .unwrap();

        assert_eq!(report.frames, 300);
        assert_eq!(last_progress, 300);
        assert!(sink.finished);
        assert_eq!(sink.indices, (0..300).collect::<Vec<_>>());
        assert_eq!(sink.timestamps[0], 0.0);
        assert!((sink.timestamps[299] - 9.9667).abs() < 1e-3);
        for pair in sink.timestamps.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!((pair[1] - pair[0] - 1.0 / 30.0).abs() < 1e-9);
        }
        assert!(sink.descriptors.iter().all(|d| d.magnitudes.len() == 128));
    }

    #[test]
    fn export_is_deterministic_across_runs() {
        let store = tone_store(2.0, 8000);
        let mut first = MemorySink::default();
        let mut second = MemorySink::default();
        run(Arc::new(scene(store.clone(), 32)), settings(12), &mut first, &CancelToken::new(), |_, _| {}).unwrap();
        run(Arc::new(scene(store, 32)), settings(12), &mut second, &CancelToken::new(), |_, _| {}).unwrap();
        assert_eq!(first.descriptors, second.descriptors);
    }

    #[test]
    fn small_in_flight_window_still_orders_frames() {
        let scene = Arc::new(scene(tone_store(1.0, 8000), 8));
        let mut sink = MemorySink::default();
        let s = ExportSettings {
            max_in_flight: 1,
            ..settings(20)
        };
        run(scene, s, &mut sink, &CancelToken::new(), |_, _| {}).unwrap();
        assert_eq!(sink.indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_export_discards_output() {
        let scene = Arc::new(scene(tone_store(5.0, 8000), 16));
        let cancel = CancelToken::new();
        let mut sink = MemorySink::default();
        let trigger = cancel.clone();
        let err = run(scene, settings(30), &mut sink, &cancel, |done, _| {
            if done == 10 {
                trigger.cancel();
            }
        })
        .unwrap_err();

        match err {
            Error::ExportAborted {
                reason: AbortReason::Cancelled,
                frames_written,
                total,
            } => {
                assert_eq!(frames_written, 10);
                assert_eq!(total, 150);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.aborted);
        assert!(!sink.finished);
        assert!(sink.indices.is_empty());
    }

    #[test]
    fn sink_failure_aborts_whole_export() {
        let scene = Arc::new(scene(tone_store(1.0, 8000), 16));
        let mut sink = MemorySink {
            fail_at: Some(7),
            ..Default::default()
        };
        let err = run(scene, settings(30), &mut sink, &CancelToken::new(), |_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::ExportAborted {
                reason: AbortReason::SinkFailed(_),
                frames_written: 7,
                ..
            }
        ));
        assert!(sink.aborted);
        assert!(sink.timestamps.is_empty());
    }

    #[test]
    fn render_failure_aborts_export() {
        let scene = Arc::new(scene(tone_store(1.0, 8000), 16));
        let mut sink = MemorySink::default();
        let bad = ExportSettings {
            width: 0,
            ..settings(30)
        };
        let err = run(scene, bad, &mut sink, &CancelToken::new(), |_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::ExportAborted {
                reason: AbortReason::FrameFailed { .. },
                frames_written: 0,
                ..
            }
        ));
        assert!(sink.aborted);
    }
}
