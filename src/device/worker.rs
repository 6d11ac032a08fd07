//! Dedicated thread owning one device handle.
//!
//! The handle is created on the worker thread and never leaves it, which keeps
//! host streams that are not `Send` usable from async code. Calls are queued on
//! a channel and executed strictly in order; replies come back on a oneshot.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::DeviceError;

type Job<D> = Box<dyn FnOnce(&mut D) + Send>;

enum Message<D: ?Sized> {
    Call(Job<D>),
    Release(oneshot::Sender<()>),
}

/// Handle to a device living on its own thread.
///
/// [`release`](Self::release) consumes the worker, so a handle can only be
/// released once. Dropping the worker without releasing closes the channel and
/// the thread drops the device on its way out.
pub struct DeviceWorker<D: ?Sized> {
    name: String,
    sender: Sender<Message<D>>,
}

impl<D: ?Sized + 'static> DeviceWorker<D> {
    /// Spawn the worker thread and open the device on it.
    ///
    /// # Arguments
    /// * `name` - Thread name, also used in log lines
    /// * `opener` - Opens and configures the device; runs on the new thread
    ///
    /// # Errors
    /// Returns the opener's error, an I/O error if the thread cannot be
    /// spawned, or [`DeviceError::WorkerGone`] if the opener panicked.
    pub async fn open<F>(name: &str, opener: F) -> Result<Self, DeviceError>
    where
        F: FnOnce() -> Result<Box<D>, DeviceError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Message<D>>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), DeviceError>>();

        let thread_name = name.to_string();
        thread::Builder::new().name(name.to_string()).spawn(move || run_worker(thread_name, opener, receiver, ready_tx))?;

        ready_rx.await.map_err(|_| DeviceError::WorkerGone)??;

        Ok(Self { name: name.to_string(), sender })
    }

    /// Run `f` against the device on the worker thread and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, DeviceError>
    where
        F: FnOnce(&mut D) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<D> = Box::new(move |device: &mut D| {
            let _ = reply_tx.send(f(device));
        });

        self.sender.send(Message::Call(job)).map_err(|_| DeviceError::WorkerGone)?;
        reply_rx.await.map_err(|_| DeviceError::WorkerGone)
    }

    /// Like [`call`](Self::call) for device operations that can fail themselves.
    pub async fn try_call<T, F>(&self, f: F) -> Result<T, DeviceError>
    where
        F: FnOnce(&mut D) -> Result<T, DeviceError> + Send + 'static,
        T: Send + 'static,
    {
        self.call(f).await?
    }

    /// Drop the device on its thread and wait until it is gone.
    pub async fn release(self) -> Result<(), DeviceError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender.send(Message::Release(done_tx)).map_err(|_| DeviceError::WorkerGone)?;
        done_rx.await.map_err(|_| DeviceError::WorkerGone)?;
        debug!("{}: device released", self.name);
        Ok(())
    }
}

fn run_worker<D, F>(name: String, opener: F, receiver: Receiver<Message<D>>, ready: oneshot::Sender<Result<(), DeviceError>>)
where
    D: ?Sized,
    F: FnOnce() -> Result<Box<D>, DeviceError>,
{
    let mut device = match opener() {
        Ok(device) => device,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        debug!("{}: opener abandoned, dropping device", name);
        return;
    }

    debug!("{}: worker ready", name);

    while let Ok(message) = receiver.recv() {
        match message {
            Message::Call(job) => job(device.as_mut()),
            Message::Release(done) => {
                drop(device);
                let _ = done.send(());
                return;
            }
        }
    }

    warn!("{}: worker dropped without release, dropping device", name);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counter {
        value: u32,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_calls_run_in_order_and_release_drops_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let drops_for_opener = drops.clone();
        let worker = DeviceWorker::<Counter>::open("test-device", move || Ok(Box::new(Counter { value: 0, drops: drops_for_opener })))
            .await
            .unwrap();

        for _ in 0..5 {
            worker.call(|c| c.value += 1).await.unwrap();
        }
        assert_eq!(worker.call(|c| c.value).await.unwrap(), 5);

        worker.release().await.unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let result = DeviceWorker::<Counter>::open("broken-device", || Err(DeviceError::NoDevice("input"))).await;
        assert!(matches!(result, Err(DeviceError::NoDevice("input"))));
    }

    #[tokio::test]
    async fn test_drop_without_release_still_drops_device() {
        let drops = Arc::new(AtomicUsize::new(0));
        let drops_for_opener = drops.clone();
        let worker = DeviceWorker::<Counter>::open("dropped-device", move || Ok(Box::new(Counter { value: 0, drops: drops_for_opener })))
            .await
            .unwrap();
        drop(worker);

        for _ in 0..100 {
            if drops.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
