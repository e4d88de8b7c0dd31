use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use bulkconv::{
    BroadcastProgress, DispatchError, Dispatcher, JobProgressEvent, UploadedFile,
};

use crate::app::{from_lib, App, CliError};

/// Leaves submitted jobs PENDING for a running `bulkconv worker`.
struct DeferToWorker;

impl Dispatcher for DeferToWorker {
    fn dispatch(&self, job_id: &str) -> Result<(), DispatchError> {
        info!("Job {} left for the worker", job_id);
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn read_upload(path: &Path) -> Result<UploadedFile, CliError> {
    let content = std::fs::read(path).map_err(|e| CliError::ReadInput {
        path: path.to_path_buf(),
        source: e,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(UploadedFile::new(filename, content))
}

pub fn submit(app: &App, files: &[PathBuf], wait: bool) -> Result<(), CliError> {
    let uploads = files
        .iter()
        .map(|path| read_upload(path))
        .collect::<Result<Vec<_>, _>>()?;

    if !wait {
        let submitted = app
            .service(Arc::new(DeferToWorker))
            .submit_job(uploads)
            .map_err(from_lib)?;
        return print_json(&submitted);
    }

    let pool = Arc::new(app.pool(app.orchestrator(None))?);
    let service = app.service(pool.clone());
    let submitted = service.submit_job(uploads).map_err(from_lib)?;
    drop(service);

    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.wait(),
        Err(_) => warn!("Worker pool still shared, not waiting for job {}", submitted.job_id),
    }

    let view = app
        .service(Arc::new(DeferToWorker))
        .job_status(&submitted.job_id)
        .map_err(from_lib)?;
    print_json(&view)
}

pub fn status(app: &App, job_id: &str) -> Result<(), CliError> {
    let view = app
        .service(Arc::new(DeferToWorker))
        .job_status(job_id)
        .map_err(from_lib)?;
    print_json(&view)
}

pub fn download(
    app: &App,
    job_id: &str,
    file: Option<&str>,
    output: &Path,
) -> Result<(), CliError> {
    let service = app.service(Arc::new(DeferToWorker));
    let download = match file {
        Some(filename) => service.file_for_download(job_id, filename),
        None => service.archive_for_download(job_id),
    }
    .map_err(from_lib)?;

    let target = if output.is_dir() {
        output.join(&download.download_name)
    } else {
        output.to_path_buf()
    };
    std::fs::copy(&download.path, &target).map_err(|e| CliError::WriteOutput {
        path: target.clone(),
        source: e,
    })?;

    println!("{}", target.display());
    Ok(())
}

fn spawn_event_printer(mut events: broadcast::Receiver<JobProgressEvent>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Could not encode progress event: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} progress events", skipped),
            Err(RecvError::Closed) => break,
        }
    })
}

pub fn worker(app: &App, poll: Duration, events: bool) -> Result<(), CliError> {
    let progress = BroadcastProgress::default();
    let printer = events.then(|| spawn_event_printer(progress.subscribe()));

    let pool = app.pool(app.orchestrator(Some(Arc::new(progress.clone()))))?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::Relaxed))?;

    info!("Worker running, press Ctrl-C to stop");
    let mut next_scan = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        if Instant::now() >= next_scan {
            if let Err(e) = pool.recover_unfinished() {
                warn!("Scan for unfinished jobs failed: {}", e);
            }
            next_scan = Instant::now() + poll;
        }
        thread::sleep(Duration::from_millis(100));
    }

    pool.shutdown();
    pool.wait();

    // Last sender gone; the printer sees the channel close.
    drop(progress);
    if let Some(handle) = printer {
        if handle.join().is_err() {
            warn!("Progress printer panicked");
        }
    }
    Ok(())
}
