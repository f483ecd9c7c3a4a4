use crate::controller::SessionEvent;
use futures_util::StreamExt;
use std::time::Duration;
use stokes_protocol::ChannelEvent;
use tokio::sync::mpsc;
use url::Url;

pub enum ChannelCommand {
    Disconnect,
}

/// Owned subscription to the server's push channel. Constructed
/// explicitly, torn down explicitly; parsed events land in the
/// controller's inbox as [`SessionEvent`]s.
pub struct EventChannel {
    cmd_tx: mpsc::Sender<ChannelCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl EventChannel {
    pub fn connect(url: Url, events: mpsc::Sender<SessionEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(url, events, cmd_rx));
        Self { cmd_tx, task }
    }

    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(ChannelCommand::Disconnect).await;
        let _ = self.task.await;
    }
}

async fn run(url: Url, events: mpsc::Sender<SessionEvent>, mut cmd_rx: mpsc::Receiver<ChannelCommand>) {
    let mut backoff = Backoff::default();

    'reconnect: loop {
        let mut socket = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                let retry = backoff.next_delay();
                tracing::debug!("event channel connect failed ({e}); retrying in {}s", retry.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(retry) => continue 'reconnect,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ChannelCommand::Disconnect) | None => return,
                    },
                }
            }
        };
        backoff.reset();
        if events.send(SessionEvent::Connected).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Disconnect) | None => {
                        let _ = socket.close(None).await;
                        // Teardown must not block on a full inbox.
                        let _ = events.try_send(SessionEvent::Disconnected);
                        return;
                    }
                },
                incoming = socket.next() => match incoming {
                    Some(Ok(msg)) => {
                        let Ok(text) = msg.into_text() else { continue };
                        if text.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ChannelEvent>(&text) {
                            Ok(event) => {
                                if events.send(event.into()).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => tracing::debug!("ignoring unrecognized channel payload: {e}"),
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!("event channel read failed: {e}");
                        if events.send(SessionEvent::Disconnected).await.is_err() {
                            return;
                        }
                        continue 'reconnect;
                    }
                    None => {
                        if events.send(SessionEvent::Disconnected).await.is_err() {
                            return;
                        }
                        continue 'reconnect;
                    }
                },
            }
        }
    }
}

#[derive(Default)]
struct Backoff {
    idx: usize,
}

impl Backoff {
    fn reset(&mut self) {
        self.idx = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let delays = [1, 2, 5, 10];
        let secs = delays.get(self.idx).copied().unwrap_or(10);
        self.idx = (self.idx + 1).min(delays.len());
        Duration::from_secs(secs)
    }
}
