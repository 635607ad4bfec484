//! Cooperative shutdown signal shared by the background loops.

use tokio::sync::watch;

/// Resolves once `rx` holds `true` or its sender is gone.
///
/// The borrowed value is released before returning, so the future can sit in
/// a `select!` next to other awaits inside a spawned task.
pub async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
