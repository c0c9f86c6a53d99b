//! The add-on surface inside the printer-control host application.
//!
//! `BftAddon` wires the orchestrator to the host's collaborators and
//! exposes what the host binds to its plugin hooks: the settings defaults,
//! the firmware-capability hook, comm-event handling, and the two API
//! commands (`start_transfer`, `change_phase`).

use crate::device::{ConnectionManager, FileManager, LOCAL_STORAGE, Transport};
use crate::errors::{SettingsError, StartError};
use crate::events::{self, EventBus};
use crate::logger::{BftLogger, StatusChannel};
use crate::notifier::{AccumulatingNotifier, NoopNotifier, PublishingNotifier, TransferNotifier};
use crate::phase::{Phase, PhaseChangeEvent};
use crate::settings::{SettingsStore, setting};
use crate::transfer::{TransferOrchestrator, TransferRequest, local_basename};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// The firmware capability that must be announced before a transfer may
/// start.
pub const CAP_BINARY_FILE_TRANSFER: &str = "BINARY_FILE_TRANSFER";

/// Payload of the `start_transfer` API command.
#[derive(Debug, Clone, Deserialize)]
pub struct StartTransferCommand {
    pub local_path: String,
    pub port: String,
    pub baudrate: u32,
    /// Which notifier variant observes the run: "dialog" publishes to the
    /// event bus, "api" accumulates lines, anything else observes nothing.
    #[serde(default)]
    pub handler_type: Option<String>,
    /// Request-scoped settings overrides
    #[serde(default)]
    pub overrides: Map<String, Value>,
}

/// The binary file transfer add-on.
pub struct BftAddon {
    settings: Arc<dyn SettingsStore>,
    bus: Arc<dyn EventBus>,
    files: Arc<dyn FileManager>,
    orchestrator: TransferOrchestrator,
    logger: BftLogger,
}

impl BftAddon {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        bus: Arc<dyn EventBus>,
        transport: Arc<dyn Transport>,
        connection: Arc<dyn ConnectionManager>,
        files: Arc<dyn FileManager>,
        channel: Arc<dyn StatusChannel>,
    ) -> Self {
        let logger = BftLogger::new(channel);
        let orchestrator = TransferOrchestrator::new(
            settings.clone(),
            transport,
            connection,
            files.clone(),
            logger.clone(),
        );
        Self {
            settings,
            bus,
            files,
            orchestrator,
            logger,
        }
    }

    /// Host startup: the capability is unknown until the firmware
    /// announces it.
    pub fn startup(&self) -> Result<(), SettingsError> {
        tracing::info!("binary file transfer add-on ready");
        self.settings.set(setting::HAS_CAPABILITY, json!(false))
    }

    /// Custom events to register with the host's event system.
    pub fn custom_events() -> &'static [&'static str] {
        events::REGISTRATION
    }

    /// Whether the printer has announced the binary transfer capability.
    pub fn has_capability(&self) -> bool {
        self.settings
            .get_bool(setting::HAS_CAPABILITY)
            .unwrap_or(false)
    }

    /// Whether a transfer run is currently in flight.
    pub fn is_transfer_active(&self) -> bool {
        self.orchestrator.is_active()
    }

    /// Storage location uploads are placed under.
    pub fn upload_folder(&self) -> Result<String, SettingsError> {
        self.settings.get_str(setting::UPLOAD_FOLDER)
    }

    /// File extensions eligible for transfer, lowercased.
    pub fn accept_extensions(&self) -> Result<Vec<String>, SettingsError> {
        Ok(self
            .settings
            .get_str(setting::ACCEPT_EXTENSIONS)?
            .split(',')
            .map(|ext| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect())
    }

    /// Firmware-capability hook.
    pub fn on_firmware_capability(&self, capability: &str, enabled: bool) {
        if capability.eq_ignore_ascii_case(CAP_BINARY_FILE_TRANSFER) {
            tracing::info!("Setting {CAP_BINARY_FILE_TRANSFER} capability to {enabled}");
            if let Err(err) = self.settings.set(setting::HAS_CAPABILITY, json!(enabled)) {
                tracing::warn!("Could not persist capability: {err}");
            }
        }
    }

    /// Comm-state events from the host; losing the connection invalidates
    /// the announced capability.
    pub fn on_comm_event(&self, event: &str) {
        if matches!(
            event.to_ascii_lowercase().as_str(),
            "disconnecting" | "disconnected"
        ) {
            tracing::info!("Unsetting capability {CAP_BINARY_FILE_TRANSFER}");
            if let Err(err) = self.settings.set(setting::HAS_CAPABILITY, json!(false)) {
                tracing::warn!("Could not persist capability: {err}");
            }
        }
    }

    /// Keep the durable current-phase fact in sync with phase-change
    /// events arriving on the bus.
    pub fn on_phase_changed(&self, event: &PhaseChangeEvent) {
        tracing::info!(
            "Changed phase ({} -> {}): {}",
            event.prev,
            event.curr,
            event.msg.as_deref().unwrap_or("")
        );
        if let Err(err) = self
            .settings
            .set(setting::PHASE, json!(event.curr.as_str()))
        {
            tracing::warn!("Could not persist phase {}: {err}", event.curr);
        }
    }

    /// The `change_phase` API command: fire the transition on the bus and
    /// persist the new phase. Used by the UI to signal phases the
    /// orchestrator does not drive itself, e.g. `Upload`.
    pub fn change_phase(&self, curr: Phase) -> Result<(), SettingsError> {
        let prev = self
            .settings
            .get_str(setting::PHASE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Phase::Inactive);
        let event = PhaseChangeEvent::new(prev, curr, None);
        self.bus.fire(events::PHASE_CHANGED, &event);
        self.settings
            .set(setting::PHASE, json!(curr.as_str()))
    }

    /// Build the notifier variant a caller asked for.
    pub fn notifier_for(&self, handler_type: Option<&str>) -> Arc<dyn TransferNotifier> {
        match handler_type {
            Some("dialog") => Arc::new(PublishingNotifier::new(self.bus.clone())),
            Some("api") => Arc::new(AccumulatingNotifier::new()),
            _ => Arc::new(NoopNotifier),
        }
    }

    /// The `start_transfer` API command.
    ///
    /// Gates on the announced capability and the accepted extensions,
    /// resolves the on-disk path, then hands the run to the orchestrator.
    /// Returns the derived remote filename as the synchronous response;
    /// the outcome is reported through the notifier and phase events.
    pub fn start_transfer(&self, command: StartTransferCommand) -> Result<String, StartError> {
        if !self.has_capability() {
            return Err(StartError::CapabilityMissing);
        }

        let extension = extension_of(&command.local_path);
        if !self.accept_extensions()?.contains(&extension) {
            return Err(StartError::ExtensionNotAccepted { extension });
        }

        let disk_path = self.files.disk_path(LOCAL_STORAGE, &command.local_path)?;
        self.logger
            .debug(&format!("Path on disk '{}'", disk_path.display()));

        let notifier = self.notifier_for(command.handler_type.as_deref());
        let request = TransferRequest::new(
            command.local_path,
            disk_path,
            command.port,
            command.baudrate,
            command.overrides,
        );
        self.orchestrator.start(notifier, request)
    }
}

/// Lowercased extension of an upload path, without the dot.
fn extension_of(local_path: &str) -> String {
    let base = local_basename(local_path);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}
