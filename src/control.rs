// control.rs - Interrupt Handling

//! Interrupts are captured from process start. While the gate is disarmed
//! (identity bootstrap, server start) they are logged and dropped so the
//! handshake cannot be cut in half; once armed, an interrupt becomes a
//! shutdown request the control task can await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Gate between process interrupts and graceful shutdown
pub struct InterruptGate {
    armed: Arc<AtomicBool>,
    requests: mpsc::UnboundedReceiver<()>,
}

impl InterruptGate {
    /// Capture Ctrl+C for the rest of the process, starting disarmed
    pub fn install() -> Self {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if raw_tx.send(()).is_err() {
                    break;
                }
            }
        });

        Self::from_interrupts(raw_rx)
    }

    fn from_interrupts(mut raw: mpsc::UnboundedReceiver<()>) -> Self {
        let armed = Arc::new(AtomicBool::new(false));
        let (tx, requests) = mpsc::unbounded_channel();

        let flag = armed.clone();
        tokio::spawn(async move {
            while raw.recv().await.is_some() {
                if flag.load(Ordering::SeqCst) {
                    info!("Intercepted interrupt signal");
                    if tx.send(()).is_err() {
                        break;
                    }
                } else {
                    warn!("Blocking interrupt signal until startup completes");
                }
            }
        });

        Self { armed, requests }
    }

    /// Deliver subsequent interrupts as shutdown requests
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait for the next shutdown request
    pub async fn wait(&mut self) {
        // A closed channel means no interrupt source remains; treat it as a request.
        let _ = self.requests.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_interrupts_dropped_while_disarmed() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut gate = InterruptGate::from_interrupts(raw_rx);

        raw_tx.send(()).unwrap();
        assert!(timeout(Duration::from_millis(100), gate.wait()).await.is_err());

        gate.arm();
        assert!(gate.armed.load(Ordering::SeqCst));
        raw_tx.send(()).unwrap();
        assert!(timeout(Duration::from_secs(1), gate.wait()).await.is_ok());
    }
}
