//! Threaded receiver pipeline
//!
//! Flow: source thread → bounded channel → DSP thread (owns the `Receiver`)
//! → bounded channel → caller's thread → sink.
//!
//! Backpressure comes from the bounded channels: a slow sink stalls the DSP
//! thread, which stalls the reader. Shutdown is checked once per block, either
//! through the shared `running` flag or at end of stream. A frame still being
//! collected at shutdown is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use log::{debug, error, info};

use crate::domain::{PlFrame, ReceiverConfig, RxError, RxResult, Sample};
use crate::plsync::{Receiver, ReceiverStats};
use crate::ports::{FrameSink, IqSource};

/// Samples per block handed from the reader to the DSP thread
pub const BLOCK_SIZE: usize = 16_384;

/// Blocks (or frames) each channel may hold before its sender waits
pub const CHANNEL_DEPTH: usize = 8;

/// Run the receiver over `source` until end of stream or until `running` is
/// cleared, writing frames to `sink` in order. Returns the final statistics.
pub fn run<S, K>(
    config: ReceiverConfig,
    source: S,
    sink: &mut K,
    running: Arc<AtomicBool>,
) -> RxResult<ReceiverStats>
where
    S: IqSource + 'static,
    K: FrameSink + ?Sized,
{
    // Build before spawning so configuration errors surface here
    let mut receiver = Receiver::new(config)?;

    let (sample_tx, sample_rx) = bounded::<Vec<Sample>>(CHANNEL_DEPTH);
    let (frame_tx, frame_rx) = bounded::<PlFrame>(CHANNEL_DEPTH);

    let reader_running = running.clone();
    let reader = thread::spawn(move || -> RxResult<u64> {
        let mut source = source;
        let mut total = 0u64;
        while reader_running.load(Ordering::SeqCst) {
            let mut block = vec![Sample::new(0.0, 0.0); BLOCK_SIZE];
            let n = source.read_samples(&mut block)?;
            if n == 0 {
                debug!("Sample source exhausted after {total} samples");
                break;
            }
            block.truncate(n);
            total += n as u64;
            if sample_tx.send(block).is_err() {
                break;
            }
        }
        Ok(total)
    });

    let dsp_running = running.clone();
    let dsp = thread::spawn(move || -> ReceiverStats {
        let mut frames = Vec::new();
        for block in sample_rx {
            if !dsp_running.load(Ordering::SeqCst) {
                break;
            }
            receiver.process_into(&block, &mut frames);
            for frame in frames.drain(..) {
                if frame_tx.send(frame).is_err() {
                    return receiver.stats();
                }
            }
        }
        receiver.stats()
    });

    let mut sink_result = Ok(());
    for frame in frame_rx.iter() {
        if let Err(e) = sink.write_frame(&frame) {
            error!("Frame sink failed: {e}");
            running.store(false, Ordering::SeqCst);
            sink_result = Err(e);
            break;
        }
    }
    // Unblocks the DSP thread if we stopped early
    drop(frame_rx);

    let stats = dsp
        .join()
        .map_err(|_| RxError::Pipeline("DSP thread panicked".into()))?;
    let samples = reader
        .join()
        .map_err(|_| RxError::Pipeline("Reader thread panicked".into()))??;

    sink_result?;
    sink.flush()?;

    info!(
        "Pipeline finished: {samples} samples, {} frames, {} lock losses",
        stats.frames, stats.lock_losses
    );
    Ok(stats)
}
