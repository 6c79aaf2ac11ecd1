use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A pair that stops an RPC server: the server runs until the handle is dropped.
pub(crate) fn shutdown_signal() -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RpcServerShutdownHandle { _tx: tx }, RpcServerShutdownSignal { rx })
}

/// Owned by the node. There is no "send"; dropping it is the signal.
pub(crate) struct RpcServerShutdownHandle {
    _tx: oneshot::Sender<()>,
}

pub(crate) struct RpcServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for RpcServerShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Resolves on drop of the sender as well as on a value.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn signal_fires_when_handle_dropped() {
        let (handle, mut signal) = shutdown_signal();

        timeout(Duration::from_millis(20), &mut signal)
            .await
            .expect_err("Signal fired while handle is alive");

        drop(handle);
        timeout(Duration::from_secs(1), signal)
            .await
            .expect("Signal should fire after handle drop");
    }
}
