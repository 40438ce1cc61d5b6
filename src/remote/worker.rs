use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Run `job` on a fresh worker thread and hand back a receiver for its
/// result. The caller polls it without blocking (the viewer does this once
/// per frame).
pub fn spawn<T, F>(name: &str, job: F) -> Receiver<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(format!("rusty-spectra-{name}"))
        .spawn(move || {
            // The receiver may be gone if the caller stopped waiting.
            let _ = tx.send(job());
        });
    if let Err(e) = spawned {
        log::error!("Failed to start worker '{name}': {e}");
    }
    rx
}

/// Run `job` on a worker and wait at most `timeout` for it. `None` means the
/// job did not finish in time (it keeps running detached and its result is
/// discarded).
pub fn run_with_timeout<T, F>(name: &str, timeout: Duration, job: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let rx = spawn(name, job);
    match rx.recv_timeout(timeout) {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Worker '{name}' did not finish within {timeout:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_result_when_fast() {
        assert_eq!(run_with_timeout("fast", Duration::from_secs(5), || 2 + 2), Some(4));
    }

    #[test]
    fn gives_up_on_slow_jobs() {
        let out = run_with_timeout("slow", Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert_eq!(out, None);
    }
}
