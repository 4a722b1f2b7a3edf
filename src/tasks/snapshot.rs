use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{ExportRequest, ProcessorEvent, ProcessorJob, SnapshotRequest};
use crate::export;
use crate::processing::saturation::{SaturationFilter, SaturationParams};
use crate::source::load_source_image;

/// Longest shutdown waits for in-flight jobs, exports included.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Decodes `source_path` afresh and evaluates the filter on the CPU.
pub fn process(source_path: &Path, params: SaturationParams) -> crate::Result<RgbaImage> {
    let source = load_source_image(source_path)?;
    let image = SaturationFilter.apply(&source, params)?.rasterize();
    debug!(
        path = %source_path.display(),
        saturation = params.saturation(),
        width = image.width(),
        height = image.height(),
        "processed snapshot"
    );
    Ok(image)
}

/// Background processor: each job runs to completion on the blocking pool
/// and reports back through `results`. Jobs are never cancelled once started;
/// the receiver decides which results are still wanted. On shutdown, jobs
/// already accepted are awaited for up to [`SHUTDOWN_GRACE`] so a queued
/// export still lands on disk.
pub async fn run(
    source_path: PathBuf,
    mut jobs: UnboundedReceiver<ProcessorJob>,
    results: UnboundedSender<ProcessorEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let source_path: Arc<Path> = Arc::from(source_path);
    let mut tasks: JoinSet<ProcessorEvent> = JoinSet::new();
    let mut jobs_open = true;

    loop {
        if !jobs_open && tasks.is_empty() {
            break;
        }
        // queued jobs are accepted before cancellation is observed
        select! {
            biased;

            job = jobs.recv(), if jobs_open => match job {
                Some(job) => {
                    debug!(seq = job.seq(), "processor job accepted");
                    let path = Arc::clone(&source_path);
                    tasks.spawn_blocking(move || execute(&path, job));
                }
                None => jobs_open = false,
            },

            Some(joined) = tasks.join_next() => match joined {
                Ok(event) => {
                    if results.send(event).is_err() {
                        debug!("result receiver dropped; stopping processor");
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "processor job panicked"),
            },

            _ = cancel.cancelled() => break,
        }
    }

    if !tasks.is_empty() {
        drain(&mut tasks, &results).await;
    }
    info!(pending = tasks.len(), "snapshot processor stopped");
    Ok(())
}

async fn drain(tasks: &mut JoinSet<ProcessorEvent>, results: &UnboundedSender<ProcessorEvent>) {
    info!(pending = tasks.len(), "waiting for in-flight processor jobs");
    let finish = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(event) => report_late(event, results),
                Err(err) => warn!(error = %err, "processor job panicked"),
            }
        }
    };
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, finish).await.is_ok();
    if !drained {
        warn!(
            pending = tasks.len(),
            "processor jobs still running at shutdown; their results are lost"
        );
    }
}

/// Results finishing during shutdown may have no receiver left, so exports
/// are logged here as well.
fn report_late(event: ProcessorEvent, results: &UnboundedSender<ProcessorEvent>) {
    if let ProcessorEvent::ExportFinished {
        seq,
        destination,
        result: Ok(()),
    } = &event
    {
        info!(seq, path = %destination.display(), "export finished during shutdown");
    }
    // failures were already logged by `execute`
    let _ = results.send(event);
}

fn execute(source_path: &Path, job: ProcessorJob) -> ProcessorEvent {
    match job {
        ProcessorJob::Snapshot(SnapshotRequest { seq, params }) => {
            match process(source_path, params) {
                Ok(image) => ProcessorEvent::SnapshotReady { seq, image },
                Err(error) => {
                    warn!(seq, error = %error, "snapshot evaluation failed");
                    ProcessorEvent::SnapshotFailed { seq, error }
                }
            }
        }
        ProcessorJob::Export(ExportRequest {
            seq,
            params,
            destination,
        }) => {
            let result =
                process(source_path, params).and_then(|image| export::save(&image, &destination));
            if let Err(error) = &result {
                warn!(seq, error = %error, path = %destination.display(), "export failed");
            }
            ProcessorEvent::ExportFinished {
                seq,
                destination,
                result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::Rgba;
    use tokio::sync::mpsc;

    fn write_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("source.png");
        RgbaImage::from_fn(6, 4, |x, _| {
            if x % 2 == 0 {
                Rgba([220, 40, 40, 255])
            } else {
                Rgba([30, 160, 220, 255])
            }
        })
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn process_identity_matches_decoded_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let out = process(&path, SaturationParams::default()).unwrap();
        let expected = image::open(&path).unwrap().to_rgba8();
        assert_eq!(out, expected);
    }

    #[test]
    fn process_missing_file_is_decode_error() {
        let err = process(Path::new("/no/such/image.jpg"), SaturationParams::default()).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn snapshot_jobs_report_back_with_their_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (res_tx, mut res_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(path, job_rx, res_tx, cancel.clone()));

        for seq in 1..=3 {
            job_tx
                .send(ProcessorJob::Snapshot(SnapshotRequest {
                    seq,
                    params: SaturationParams::new(0.5),
                }))
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            match res_rx.recv().await.unwrap() {
                ProcessorEvent::SnapshotReady { seq, image } => {
                    assert_eq!(image.dimensions(), (6, 4));
                    seen.push(seq);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_snapshot_is_reported_not_dropped() {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (res_tx, mut res_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(
            PathBuf::from("/no/such/image.jpg"),
            job_rx,
            res_tx,
            CancellationToken::new(),
        ));

        job_tx
            .send(ProcessorJob::Snapshot(SnapshotRequest {
                seq: 7,
                params: SaturationParams::default(),
            }))
            .unwrap();
        drop(job_tx);

        match res_rx.recv().await.unwrap() {
            ProcessorEvent::SnapshotFailed { seq, error } => {
                assert_eq!(seq, 7);
                assert!(matches!(error, Error::Decode { .. }));
            }
            other => panic!("unexpected event {other:?}"),
        }
        // channel closed and nothing in flight: the task winds down on its own
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn export_job_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let dest = dir.path().join("out/FilteredImage.jpg");
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (res_tx, mut res_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(path, job_rx, res_tx, CancellationToken::new()));

        job_tx
            .send(ProcessorJob::Export(ExportRequest {
                seq: 1,
                params: SaturationParams::new(0.0),
                destination: dest.clone(),
            }))
            .unwrap();
        drop(job_tx);

        match res_rx.recv().await.unwrap() {
            ProcessorEvent::ExportFinished {
                destination,
                result,
                ..
            } => {
                result.unwrap();
                assert_eq!(destination, dest);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let reloaded = image::open(&dest).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (6, 4));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn accepted_export_completes_after_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let dest = dir.path().join("FilteredImage.jpg");
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (res_tx, mut res_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        job_tx
            .send(ProcessorJob::Export(ExportRequest {
                seq: 4,
                params: SaturationParams::new(1.5),
                destination: dest.clone(),
            }))
            .unwrap();
        // shutdown already requested when the processor first polls
        cancel.cancel();

        run(path, job_rx, res_tx, cancel).await.unwrap();

        assert!(dest.exists(), "export was abandoned at shutdown");
        match res_rx.try_recv().unwrap() {
            ProcessorEvent::ExportFinished { seq, result, .. } => {
                assert_eq!(seq, 4);
                result.unwrap();
            }
            other => panic!("unexpected event {other:?}"),
        }
        drop(job_tx);
    }
}
