use std::fs::{self, OpenOptions, TryLockError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::{
    Bookmark, BufferError, FileSet, FileSetPosition, Payload, PayloadReader,
};
use crate::sender::{BulkSender, ClientError, InvalidResult, LevelHint};
use crate::shipper::level::ControlledLevelSwitch;
use crate::shipper::schedule::ConnectionSchedule;

/// Buffer files never pruned by size-capped cleanup: the current write
/// target and its predecessor may still be in play.
const ALWAYS_RETAIN_COUNT: usize = 2;

#[derive(Error, Debug)]
pub enum ShipperError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Base interval between ship attempts.
    pub period: Duration,
    /// Cumulative size cap on live buffer files, enforced after failures.
    pub buffer_size_limit_bytes: Option<u64>,
    /// Cumulative size retained across quarantine files.
    pub retained_quarantine_bytes: u64,
    /// How often an idle shipper still calls home to re-validate the
    /// server-driven minimum level.
    pub level_check_interval: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(2),
            buffer_size_limit_bytes: None,
            retained_quarantine_bytes: 100 * 1024 * 1024,
            level_check_interval: Duration::from_secs(2 * 60),
        }
    }
}

/// The recurring shipping task: reads batches from the buffer at the
/// bookmarked position, sends them, advances the bookmark, rotates and
/// prunes files, and quarantines rejected documents.
///
/// All state lives on the single task that runs `tick`; the only shared
/// object is the level switch, which tolerates concurrent readers.
pub struct LogShipper<C: BulkSender> {
    file_set: FileSet,
    reader: PayloadReader,
    client: C,
    schedule: ConnectionSchedule,
    level_switch: Arc<ControlledLevelSwitch>,
    buffer_size_limit_bytes: Option<u64>,
    retained_quarantine_bytes: u64,
    level_check_interval: Duration,
    next_level_check: Instant,
    template_registered: bool,
}

impl<C: BulkSender> LogShipper<C> {
    pub fn new(
        file_set: FileSet,
        reader: PayloadReader,
        client: C,
        level_switch: Arc<ControlledLevelSwitch>,
        config: ShipperConfig,
    ) -> Self {
        Self {
            file_set,
            reader,
            client,
            schedule: ConnectionSchedule::new(config.period),
            level_switch,
            buffer_size_limit_bytes: config.buffer_size_limit_bytes,
            retained_quarantine_bytes: config.retained_quarantine_bytes,
            level_check_interval: config.level_check_interval,
            next_level_check: Instant::now() + config.level_check_interval,
            template_registered: false,
        }
    }

    pub fn schedule(&self) -> &ConnectionSchedule {
        &self.schedule
    }

    /// One guarded shipping attempt. Errors are absorbed here: the schedule
    /// records the failure and the next tick retries, so a broken tick can
    /// never take the timer loop down.
    pub async fn tick(&mut self) {
        if let Err(e) = self.run_tick().await {
            self.schedule.mark_failure();
            warn!(
                error = %e,
                failures = self.schedule.failures(),
                "Shipping tick failed"
            );
            self.cleanup_after_failure();
        }
    }

    /// The tick state machine, looping while full batches keep coming.
    async fn run_tick(&mut self) -> Result<(), ShipperError> {
        if !self.template_registered {
            self.client.ensure_template().await?;
            self.template_registered = true;
            debug!("Template registration hook completed");
        }

        loop {
            let count;
            {
                let mut bookmark = Bookmark::open(self.file_set.bookmark_path())?;
                let mut position = bookmark.try_read()?;
                let files = self.file_set.list_buffer_files()?;

                // A missing or deleted file invalidates the cursor; restart
                // from the oldest available file.
                if !position.as_ref().is_some_and(|p| p.file.exists()) {
                    position = files.first().map(|f| FileSetPosition::start_of(&f.path));
                }

                let (payload, read_count, advanced) = match &position {
                    None => (Payload::empty(), 0, None),
                    Some(pos) => {
                        let batch = self.reader.read_payload(pos)?;
                        let after = FileSetPosition::new(batch.next_offset, pos.file.clone());
                        (batch.payload, batch.count, Some(after))
                    }
                };
                count = read_count;

                if count > 0 || Instant::now() >= self.next_level_check {
                    self.next_level_check = Instant::now() + self.level_check_interval;
                    match self.client.send(&payload).await {
                        Ok(result) => {
                            self.schedule.mark_success();
                            self.apply_level_hint(result.level_hint);
                            if let Some(invalid) = &result.invalid {
                                self.dump_invalid(invalid)?;
                            }
                            if let Some(after) = &advanced {
                                bookmark.write(after)?;
                            }
                            debug!(count, status = ?result.status, "Shipped batch");
                        }
                        Err(e) => {
                            self.schedule.mark_failure();
                            warn!(
                                error = %e,
                                failures = self.schedule.failures(),
                                "Batch send failed"
                            );
                            self.cleanup_after_failure();
                            break;
                        }
                    }
                } else {
                    // No work waiting is not a failure; keep the regular
                    // cadence.
                    self.schedule.mark_success();
                    let Some(after) = &advanced else { break };

                    match files.as_slice() {
                        [first, second] => {
                            // Move on only once the writer has provably let
                            // go: the file is unlocked and has not grown past
                            // what we consumed.
                            if first.path == after.file
                                && is_unlocked_at_length(&after.file, after.next_offset)
                            {
                                bookmark.write(&FileSetPosition::start_of(&second.path))?;
                                info!(
                                    from = %first.path.display(),
                                    to = %second.path.display(),
                                    "Advanced bookmark to the next buffer file"
                                );
                            }
                        }
                        [oldest, _, _, ..] => {
                            // A third file exists, so writers have moved on;
                            // reclaim the oldest.
                            fs::remove_file(&oldest.path)
                                .map_err(|e| BufferError::io(&oldest.path, e))?;
                            info!(
                                path = %oldest.path.display(),
                                "Deleted fully shipped buffer file"
                            );
                        }
                        _ => {}
                    }
                }
            }

            if count != self.reader.batch_limit() {
                break;
            }
        }
        Ok(())
    }

    fn apply_level_hint(&self, hint: LevelHint) {
        match hint {
            LevelHint::Unknown => {}
            LevelHint::Unrestricted => {
                if self.level_switch.has_restriction() {
                    info!("Server lifted the minimum level restriction");
                }
                self.level_switch.update(None);
            }
            LevelHint::Minimum(level) => {
                if self.level_switch.restriction() != Some(level) {
                    info!(%level, "Server set the minimum shipping level");
                }
                self.level_switch.update(Some(level));
            }
        }
    }

    /// Writes the rejected pairs to a fresh quarantine file, first pruning
    /// old quarantine files to make room for it within the retention cap.
    fn dump_invalid(&self, invalid: &InvalidResult) -> Result<(), BufferError> {
        let path = self.file_set.quarantine_path(invalid.status_code);
        warn!(
            status = invalid.status_code,
            response = %invalid.server_response,
            path = %path.display(),
            "Server rejected documents, dumping them to quarantine"
        );
        let bytes = invalid.bad_payload.as_bytes();
        self.file_set.cleanup_quarantine_files(
            self.retained_quarantine_bytes
                .saturating_sub(bytes.len() as u64),
        );
        fs::write(&path, bytes).map_err(|e| BufferError::io(&path, e))
    }

    fn cleanup_after_failure(&self) {
        if let Some(limit) = self.buffer_size_limit_bytes {
            self.file_set.cleanup_buffer_files(limit, ALWAYS_RETAIN_COUNT);
        }
    }
}

impl<C: BulkSender + 'static> LogShipper<C> {
    /// Moves the shipper onto its own task. At most one tick is ever in
    /// flight; a manual trigger during a tick is queued, not dropped.
    pub fn spawn(mut self) -> ShipperHandle {
        let kick = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let task_kick = Arc::clone(&kick);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            info!("Log shipper started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.schedule.next_interval()) => {}
                    _ = task_kick.notified() => {
                        debug!("Shipping tick triggered manually");
                    }
                    _ = task_cancel.cancelled() => break,
                }
                self.tick().await;
            }
            // Final flush so a clean shutdown drains what it can.
            self.tick().await;
            info!("Log shipper stopped");
        });
        ShipperHandle { kick, cancel, task }
    }
}

/// Handle to a spawned shipper: trigger an immediate tick, or shut it down
/// and wait for the final flush.
pub struct ShipperHandle {
    kick: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ShipperHandle {
    /// Requests a tick as soon as the current one (if any) finishes.
    pub fn trigger(&self) {
        self.kick.notify_one();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stops the timer loop, runs the final flush tick and waits for the
    /// task to finish. In-flight sends complete; they are never aborted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Shipper task failed");
        }
    }
}

/// Probes whether a drained file may still be appended to: takes a
/// non-blocking exclusive lock and compares the length against what has
/// been consumed. A held writer lock or new growth both answer no.
fn is_unlocked_at_length(path: &Path, max_len: u64) -> bool {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not probe buffer file");
            return false;
        }
    };
    match file.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            debug!(path = %path.display(), "Buffer file still locked by its writer");
            return false;
        }
        Err(TryLockError::Error(e)) => {
            warn!(path = %path.display(), error = %e, "Could not probe buffer file lock");
            return false;
        }
    }
    match file.metadata() {
        Ok(meta) => meta.len() <= max_len,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not stat buffer file");
            false
        }
    }
}
