//! Keeps a cpal stream alive on its own thread.
//!
//! `cpal::Stream` is not `Send`, so it can't live inside a capture source or
//! sink that moves between threads. The stream is built, started and dropped
//! on a dedicated thread instead; the owner holds only this handle.

use anyhow::{anyhow, Context, Result};
use cpal::traits::StreamTrait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct StreamKeeper {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamKeeper {
    /// Runs `build` on a new thread named `name` and starts the stream it returns.
    ///
    /// Returns once the stream is playing, or with the build error.
    pub fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream.play().context("Failed to start stream")?;
                    Ok(stream)
                }) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while !stop_flag.load(Ordering::Relaxed) {
                    thread::park_timeout(Duration::from_millis(100));
                }
                drop(stream);
            })
            .context("Failed to spawn stream thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("Stream thread exited before the stream started"))
            }
        }
    }
}

impl Drop for StreamKeeper {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
