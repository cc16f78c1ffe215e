use tokio::sync::watch;

/// Sending half of the process wide shutdown signal.
///
/// Cloned into the signal handler of the binary, while the runner holds a [`ShutdownRx`].
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every [`ShutdownRx`]. Fails only when all receivers are gone.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub type ShutdownRx = watch::Receiver<()>;

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
