use color_eyre::{eyre::eyre, Result};
use tokio::sync::{mpsc, oneshot};

use crate::net::Request;
use crate::worker::{ClientMessage, FetchOutcome, InstallError, InstallReport, LifecycleError};

/// Events the hosting runtime delivers to the worker.
///
/// Each carries a reply channel. The runtime keeps the event open until the
/// worker replies, which is how "this may take time" is signalled.
#[derive(Debug)]
pub enum WorkerEvent {
  Install {
    done: oneshot::Sender<Result<InstallReport, InstallError>>,
  },
  Activate {
    done: oneshot::Sender<Result<(), LifecycleError>>,
  },
  Fetch {
    request: Request,
    respond_with: oneshot::Sender<FetchOutcome>,
  },
  /// Replies whether the worker now wants to be activated
  Message {
    payload: ClientMessage,
    done: oneshot::Sender<bool>,
  },
}

/// Runtime side of the worker channel.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  /// Create a handle and the receiver to pass to `Worker::run`.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  pub async fn install(&self) -> Result<InstallReport> {
    let (done, rx) = oneshot::channel();
    self.dispatch(WorkerEvent::Install { done })?;
    let report = Self::settle(rx).await??;
    Ok(report)
  }

  pub async fn activate(&self) -> Result<()> {
    let (done, rx) = oneshot::channel();
    self.dispatch(WorkerEvent::Activate { done })?;
    Self::settle(rx).await??;
    Ok(())
  }

  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    let (respond_with, rx) = oneshot::channel();
    self.dispatch(WorkerEvent::Fetch {
      request,
      respond_with,
    })?;
    Self::settle(rx).await
  }

  pub async fn message(&self, payload: ClientMessage) -> Result<bool> {
    let (done, rx) = oneshot::channel();
    self.dispatch(WorkerEvent::Message { payload, done })?;
    Self::settle(rx).await
  }

  fn dispatch(&self, event: WorkerEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Worker is not running"))
  }

  async fn settle<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    rx.await
      .map_err(|_| eyre!("Worker stopped before finishing the event"))
  }
}
