//! The transfer orchestrator: drives one binary file transfer end-to-end.
//!
//! `start` validates the single-run slot, emits `PreConnect`, and spawns
//! the run on a detached background task; the caller gets the derived
//! remote filename back synchronously and observes the outcome only
//! through the notifier callbacks and phase events. Whatever path a run
//! takes, the transport session is shut down unconditionally and the
//! persisted phase is forced back to `Inactive` before the run slot is
//! released.

use crate::device::{
    ConnectionManager, ConnectionParams, FileManager, LOCAL_STORAGE, Transport, TransportSession,
};
use crate::errors::{StartError, TransferError};
use crate::logger::BftLogger;
use crate::notifier::TransferNotifier;
use crate::phase::{DeleteUpload, Phase, PhaseChangeEvent};
use crate::settings::{SettingsResolver, SettingsStore, setting};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// One transfer request. Immutable once constructed; owned exclusively by
/// the run that executes it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Caller-supplied logical path of the uploaded file
    pub local_path: String,
    /// Filename component of `local_path`
    pub local_basename: String,
    /// Derived short filename on the printer's flash storage
    pub remote_basename: String,
    /// Absolute on-disk path resolved by the file manager
    pub local_diskpath: PathBuf,
    pub port: String,
    pub baud_rate: u32,
    /// Request-scoped settings overrides; never persisted
    pub overrides: Map<String, Value>,
}

impl TransferRequest {
    pub fn new(
        local_path: impl Into<String>,
        local_diskpath: PathBuf,
        port: impl Into<String>,
        baud_rate: u32,
        overrides: Map<String, Value>,
    ) -> Self {
        let local_path = local_path.into();
        Self {
            local_basename: local_basename(&local_path),
            remote_basename: remote_basename(&local_path),
            local_path,
            local_diskpath,
            port: port.into(),
            baud_rate,
            overrides,
        }
    }

    fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            profile: None,
        }
    }
}

/// Filename component of a logical upload path. Both separators are
/// accepted because upload paths come from the host UI.
pub fn local_basename(local_path: &str) -> String {
    local_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(local_path)
        .to_string()
}

/// Derive the remote filename for the printer's flash storage: the stem
/// truncated to 8 characters plus the extension (dot included) truncated
/// to 4, honoring legacy short-filename constraints. Case-preserving and
/// independent of directory components.
pub fn remote_basename(local_path: &str) -> String {
    let base = local_basename(local_path);
    let (stem, ext) = split_extension(&base);
    let mut name: String = stem.chars().take(8).collect();
    name.extend(ext.chars().take(4));
    name
}

fn split_extension(basename: &str) -> (&str, &str) {
    match basename.rfind('.') {
        // A leading dot marks a hidden file, not an extension.
        Some(0) | None => (basename, ""),
        Some(idx) => basename.split_at(idx),
    }
}

/// Emit a phase transition: notify first, then persist the new phase.
fn emit_phase(
    settings: &dyn SettingsStore,
    notifier: &dyn TransferNotifier,
    curr: Phase,
    msg: Option<String>,
) {
    let prev = settings
        .get_str(setting::PHASE)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Phase::Inactive);
    let event = PhaseChangeEvent::new(prev, curr, msg);
    tracing::info!(
        "Changed phase ({} -> {}): {}",
        event.prev,
        event.curr,
        event.msg.as_deref().unwrap_or("")
    );
    notifier.phase_changed(&event);
    if let Err(err) = settings.set(setting::PHASE, Value::String(curr.as_str().to_string())) {
        tracing::warn!("Could not persist phase {curr}: {err}");
    }
}

/// Drives one transfer attempt from trigger to terminal outcome.
#[derive(Clone)]
pub struct TransferOrchestrator {
    settings: Arc<dyn SettingsStore>,
    transport: Arc<dyn Transport>,
    connection: Arc<dyn ConnectionManager>,
    files: Arc<dyn FileManager>,
    logger: BftLogger,
    active: Arc<AtomicBool>,
}

impl TransferOrchestrator {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        transport: Arc<dyn Transport>,
        connection: Arc<dyn ConnectionManager>,
        files: Arc<dyn FileManager>,
        logger: BftLogger,
    ) -> Self {
        Self {
            settings,
            transport,
            connection,
            files,
            logger,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run currently holds the single run slot.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start one transfer run.
    ///
    /// Returns the derived remote filename synchronously; the run itself
    /// executes on a detached background task and reports its outcome
    /// only through the notifier and phase events. The serial link is
    /// exclusively owned by the in-flight run, so a second `start` while
    /// one is active is rejected immediately with
    /// `StartError::TransferInFlight` rather than queued.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        notifier: Arc<dyn TransferNotifier>,
        request: TransferRequest,
    ) -> Result<String, StartError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::TransferInFlight);
        }

        let remote = request.remote_basename.clone();
        self.logger.info(&format!(
            "Starting transfer of {} to {} on remote",
            request.local_path, remote
        ));
        emit_phase(
            &*self.settings,
            &*notifier,
            Phase::PreConnect,
            Some(request.local_path.clone()),
        );

        let run = self.clone();
        tokio::spawn(async move {
            run.execute(notifier, request).await;
        });

        Ok(remote)
    }

    async fn execute(self, notifier: Arc<dyn TransferNotifier>, request: TransferRequest) {
        let resolver = SettingsResolver::new(self.settings.clone(), request.overrides.clone());
        let started = Instant::now();

        notifier.start(&request.local_basename, &request.remote_basename);
        self.logger.info("Starting transfer process");

        let mut session: Option<Arc<dyn TransportSession>> = None;
        let result = self
            .attempt(&resolver, &*notifier, &request, &mut session, started)
            .await;

        if let Err(err) = result {
            self.fail(
                &resolver,
                &*notifier,
                session.as_deref(),
                &request,
                started,
                &err,
            )
            .await;
        }

        // Guaranteed cleanup: tear the session down unconditionally, then
        // force the persisted phase back to Inactive before releasing the
        // run slot.
        if let Some(session) = session.take() {
            session.shutdown().await;
        }
        emit_phase(&*self.settings, &*notifier, Phase::Inactive, None);
        self.active.store(false, Ordering::SeqCst);
    }

    async fn attempt(
        &self,
        resolver: &SettingsResolver,
        notifier: &dyn TransferNotifier,
        request: &TransferRequest,
        session_slot: &mut Option<Arc<dyn TransportSession>>,
        started: Instant,
    ) -> Result<(), TransferError> {
        let timeout = resolver.get_int(setting::COMM_TIMEOUT)?;
        let session = self
            .transport
            .open(
                &request.connection_params(),
                timeout,
                self.logger.copy("binproto"),
            )
            .await?;
        *session_slot = Some(session.clone());

        let wait_after_connect = resolver.get_int(setting::WAIT_AFTER_CONNECT)?;
        if wait_after_connect > 0 {
            self.logger
                .info(&format!("waiting {wait_after_connect}ms after protocol connect"));
            sleep(Duration::from_millis(wait_after_connect as u64)).await;
        }

        // Quiet periodic temperature reports and show progress on the
        // printer's display before taking over the link.
        session.send_status_text("M155 S0").await?;
        session
            .send_status_text(&format!("M117 Receiving file {} ...", request.remote_basename))
            .await?;
        session.connect().await?;

        emit_phase(&*self.settings, notifier, Phase::Transfer, None);

        let copier = session.file_transfer(self.logger.copy("fileproto"));
        if let Err(err) = copier
            .copy(&request.local_diskpath, &request.remote_basename, true, false)
            .await
        {
            if matches!(err, TransferError::Cancelled) {
                // The copy is the only cancellation point; tell the wire
                // protocol to abandon the in-flight transfer first.
                copier.abort().await;
            }
            return Err(err);
        }

        self.logger
            .info("Finishing up (this could take some time)...");
        session
            .send_status_text(&format!("M117 ...Done! {}", request.remote_basename))
            .await?;
        session.disconnect().await?;

        self.succeed(resolver, notifier, &session, request, started)
            .await
    }

    async fn succeed(
        &self,
        resolver: &SettingsResolver,
        notifier: &dyn TransferNotifier,
        session: &Arc<dyn TransportSession>,
        request: &TransferRequest,
        started: Instant,
    ) -> Result<(), TransferError> {
        self.logger.info("Transfer succeeded");
        notifier.success(
            &request.local_basename,
            &request.remote_basename,
            started.elapsed(),
        );

        if resolver.get_bool(setting::POST_TRANSFER_GCODE_ENABLE)? {
            let gcode = resolver.get_str_list(setting::POST_TRANSFER_GCODE)?;
            self.logger
                .info(&format!("Sending gcode after transfer: {}", gcode.join(", ")));
            session.wait_worker_idle().await;
            session.send_status_text_no_wait(&gcode.join("\n")).await?;
        }

        if resolver.get_bool(setting::RECONNECT)? {
            let wait = resolver.get_int(setting::WAIT_BEFORE_RECONNECT)?;
            self.connection.disconnect().await;
            if wait > 0 {
                self.logger
                    .info(&format!("waiting {wait}ms before reconnect"));
                sleep(Duration::from_millis(wait as u64)).await;
            }
            let profile = self.connection.current().profile;
            self.connection
                .connect(&ConnectionParams {
                    port: request.port.clone(),
                    baud_rate: request.baud_rate,
                    profile,
                })
                .await;
        }

        self.apply_delete_policy(resolver, true, request);
        self.logger.info("Done!");
        emit_phase(
            &*self.settings,
            notifier,
            Phase::CompleteOK,
            Some(request.local_path.clone()),
        );
        Ok(())
    }

    async fn fail(
        &self,
        resolver: &SettingsResolver,
        notifier: &dyn TransferNotifier,
        session: Option<&dyn TransportSession>,
        request: &TransferRequest,
        started: Instant,
        err: &TransferError,
    ) {
        let msg = err.to_string();
        if err.is_expected() {
            self.logger.info(&format!("Transfer failed: {msg}"));
        } else {
            self.logger.error(&format!("Transfer failed: {msg}"));
        }

        if let Some(session) = session {
            // Push the classification to the printer display; the session
            // may already be unusable, so a failure here is dropped.
            let _ = session.send_status_text(&format!("M117 {msg}")).await;
        }

        notifier.failure(
            &request.local_basename,
            &request.remote_basename,
            started.elapsed(),
            &msg,
        );
        self.apply_delete_policy(resolver, false, request);
        emit_phase(
            &*self.settings,
            notifier,
            Phase::CompleteFail,
            Some(request.local_path.clone()),
        );
    }

    fn apply_delete_policy(
        &self,
        resolver: &SettingsResolver,
        succeeded: bool,
        request: &TransferRequest,
    ) {
        let policy = match resolver
            .get_str(setting::DELETE_UPLOAD)
            .map(|s| s.parse::<DeleteUpload>())
        {
            Ok(Ok(policy)) => policy,
            Ok(Err(err)) => {
                self.logger
                    .warn(&format!("Ignoring delete policy: {err}"));
                return;
            }
            Err(err) => {
                self.logger
                    .warn(&format!("Ignoring delete policy: {err}"));
                return;
            }
        };

        if policy.should_delete(succeeded) {
            self.logger
                .info(&format!("Deleting upload {}", request.local_path));
            if let Err(err) = self.files.remove_file(LOCAL_STORAGE, &request.local_path) {
                self.logger.warn(&format!(
                    "Could not delete upload {}: {err}",
                    request.local_path
                ));
            }
        }
    }
}
