//! Ingest Task Implementation
//!
//! This module implements the ingestion task for the engine: a Unix domain
//! socket server that accepts one measurement client at a time, splits the
//! byte stream into lines, and produces them into the bounded queue.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ingest::queue::IngestQueue;
use crate::tasks::{EngineTaskBase, IngestMessage, IngestStats, Task, TaskMessage};
use ranloc_common::{Error, IngestConfig};

/// Ingest task owning the measurement socket.
///
/// The task is the sole producer into the queue. While a client is being
/// served no further connections are accepted; the next one waits in the
/// listener backlog until the current client disconnects.
pub struct IngestTask {
    /// Bounded line queue shared with the tracker
    queue: Arc<IngestQueue>,
    /// Listener bound at startup, taken by `run`
    listener: Option<UnixListener>,
    /// Socket path, removed on stop
    socket_path: PathBuf,
    /// Read buffer capacity in bytes
    read_buffer_size: usize,
    /// Counters reported via `GetStats`
    stats: IngestStats,
}

impl IngestTask {
    /// Binds the measurement socket, unlinking a stale file first.
    ///
    /// Called before the task is spawned; a bind failure is fatal at
    /// startup. Must run inside the tokio runtime.
    pub fn bind(config: &IngestConfig) -> Result<UnixListener, Error> {
        if config.socket_path.exists() {
            std::fs::remove_file(&config.socket_path).map_err(|e| {
                Error::Channel(format!(
                    "failed to remove stale socket {}: {e}",
                    config.socket_path.display()
                ))
            })?;
        }
        UnixListener::bind(&config.socket_path).map_err(|e| {
            Error::Channel(format!(
                "failed to bind {}: {e}",
                config.socket_path.display()
            ))
        })
    }

    /// Creates a new ingest task around a bound listener.
    pub fn new(
        task_base: &EngineTaskBase,
        queue: Arc<IngestQueue>,
        listener: UnixListener,
    ) -> Self {
        Self {
            queue,
            listener: Some(listener),
            socket_path: task_base.config.ingest.socket_path.clone(),
            read_buffer_size: task_base.config.ingest.read_buffer_size,
            stats: IngestStats::default(),
        }
    }

    /// Handles one control message. Returns true on shutdown.
    fn handle_control(&mut self, msg: TaskMessage<IngestMessage>) -> bool {
        match msg {
            TaskMessage::Message(IngestMessage::GetStats { response_tx }) => {
                let _ = response_tx.send(self.stats);
                false
            }
            TaskMessage::Shutdown => {
                info!("Ingest task received shutdown signal");
                true
            }
        }
    }

    /// Reads lines from one connected client until it disconnects.
    /// Returns true if shutdown was requested while serving.
    async fn serve_client(
        &mut self,
        stream: UnixStream,
        rx: &mut mpsc::Receiver<TaskMessage<IngestMessage>>,
    ) -> bool {
        let mut lines: Lines<BufReader<UnixStream>> =
            BufReader::with_capacity(self.read_buffer_size, stream).lines();

        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if self.handle_control(msg) {
                        return true;
                    }
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            self.stats.lines_received += 1;
                            if line.trim().is_empty() {
                                continue;
                            }
                            if self.queue.push(line) {
                                self.stats.lines_dropped += 1;
                                debug!("Ingest queue full, evicted oldest line");
                            }
                        }
                        Ok(None) => {
                            info!(
                                "Ingest client disconnected after {} lines",
                                self.stats.lines_received
                            );
                            return false;
                        }
                        Err(e) => {
                            warn!("Ingest read failed: {}", e);
                            return false;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Task for IngestTask {
    type Message = IngestMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!("Ingest task starting");

        let Some(listener) = self.listener.take() else {
            error!("Ingest task has no listener, already consumed by a previous run");
            return;
        };
        info!("Ingest task listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if self.handle_control(msg) {
                        break;
                    }
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            self.stats.clients_accepted += 1;
                            info!("Ingest client #{} connected", self.stats.clients_accepted);
                            if self.serve_client(stream, &mut rx).await {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Ingest accept failed: {}", e);
                        }
                    }
                }
            }
        }

        drop(listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!(
                "Could not remove socket {}: {}",
                self.socket_path.display(),
                e
            );
        }

        info!(
            "Ingest task stopped: {} clients, {} lines, {} dropped",
            self.stats.clients_accepted, self.stats.lines_received, self.stats.lines_dropped
        );
    }
}
