use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::fetch::Body;

type Item = std::result::Result<bytes::Bytes, crate::fetch::BodyError>;

/// Split one body into two streams that yield the same chunks in the same order.
///
/// Each branch buffers on its own, so the pump never waits on either reader:
/// a stalled page cannot hold the shadow back and a stalled shadow cannot
/// hold the page back. Dropping either stream leaves the other running; the
/// upstream body is released once both are gone or it ends.
pub fn tee(body: Body) -> (Body, Body) {
    let (primary_tx, primary_rx) = mpsc::unbounded_channel::<Item>();
    let (shadow_tx, shadow_rx) = mpsc::unbounded_channel::<Item>();

    tokio::spawn(pump(body, primary_tx, shadow_tx));

    let primary = stream::unfold(primary_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    let shadow = stream::unfold(shadow_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();

    (primary, shadow)
}

async fn pump(
    mut body: Body,
    primary: mpsc::UnboundedSender<Item>,
    shadow: mpsc::UnboundedSender<Item>,
) {
    let mut primary = Some(primary);
    let mut shadow = Some(shadow);

    while let Some(item) = body.next().await {
        let failed = item.is_err();

        if let Some(tx) = &shadow {
            if tx.send(item.clone()).is_err() {
                debug!("shadow branch dropped");
                shadow = None;
            }
        }
        if let Some(tx) = &primary {
            if tx.send(item).is_err() {
                debug!("primary branch dropped");
                primary = None;
            }
        }

        if failed || (primary.is_none() && shadow.is_none()) {
            break;
        }
    }
}
