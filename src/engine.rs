//! Inference engine boundary.
//!
//! An `InferenceEngine` accepts a frame together with its `Completion` and
//! delivers exactly one outcome for it, eventually and from any thread.
//! `ThreadedEngine` is the built-in implementation: one detector backend on a
//! dedicated worker thread, fed through a channel.

use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use crate::detect::{DetectionSet, DetectorBackend, Postprocess};
use crate::frame::RawFrame;
use crate::pipeline::Completion;

/// External inference collaborator.
pub trait InferenceEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Start inference on `frame`. Must not block on the inference itself.
    ///
    /// The engine owns `completion` from here on. Finishing it (or dropping it)
    /// is what releases the admission gate.
    fn submit(&self, frame: RawFrame, completion: Completion);
}

struct Job {
    frame: RawFrame,
    completion: Completion,
}

/// Runs a detector backend on its own worker thread.
pub struct ThreadedEngine {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedEngine {
    /// Warm up `backend` and move it onto a new worker thread.
    pub fn spawn(mut backend: Box<dyn DetectorBackend>, postprocess: Postprocess) -> Result<Self> {
        let name = backend.name().to_string();
        backend
            .warm_up()
            .with_context(|| format!("failed to warm up backend {}", name))?;

        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(format!("inference-{}", name))
            .spawn(move || {
                for job in receiver {
                    run_job(backend.as_mut(), &postprocess, job);
                }
            })
            .context("failed to spawn inference worker")?;

        log::info!("inference engine started (backend={})", name);
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Close the job channel and wait for the worker to finish queued work.
    ///
    /// Frames submitted afterwards complete immediately with an error.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("inference worker for {} panicked", self.name);
            }
        }
    }
}

fn run_job(backend: &mut dyn DetectorBackend, postprocess: &Postprocess, job: Job) {
    let Job {
        frame,
        mut completion,
    } = job;
    let raw = backend.detect(frame.pixels(), frame.width, frame.height);
    completion.mark_inference_done();
    let outcome =
        raw.map(|detections| DetectionSet::new(frame.sequence, postprocess.apply(detections)));
    completion.finish(outcome);
}

impl InferenceEngine for ThreadedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, frame: RawFrame, completion: Completion) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            Some(sender) => {
                if let Err(mpsc::SendError(job)) = sender.send(Job { frame, completion }) {
                    log::warn!(
                        "inference worker for {} is gone; failing frame {}",
                        self.name,
                        job.frame.sequence
                    );
                    // Dropping the job's completion reports the failure.
                }
            }
            None => {
                log::debug!(
                    "engine {} is shut down; failing frame {}",
                    self.name,
                    frame.sequence
                );
                drop(completion);
            }
        }
    }
}

impl Drop for ThreadedEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
