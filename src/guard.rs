use std::path::Path;

use crate::{
    process::ProcessRunner,
    registry::{RegistryReader, UNINSTALL_STRING, uninstall_key},
};

/// Switches passed to the previous version's uninstaller.
pub const SILENT_UNINSTALL_ARGS: [&str; 3] = ["/SILENT", "/NORESTART", "/SUPPRESSMSGBOXES"];

/// Result of trying to remove a previously installed version.
///
/// None of these are errors, the install continues after every one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UninstallOutcome {
    NoPriorInstall = 1,
    LaunchFailed = 2,
    Uninstalled = 3,
}

impl UninstallOutcome {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Detects a registered previous version and runs its uninstaller before the
/// new files are written.
pub struct UpgradeGuard<Reader, Runner> {
    product_id: String,
    registry: Reader,
    runner: Runner,
}

impl<Reader, Runner> UpgradeGuard<Reader, Runner>
where
    Reader: RegistryReader,
    Runner: ProcessRunner,
{
    pub fn new(product_id: impl Into<String>, registry: Reader, runner: Runner) -> Self {
        Self {
            product_id: product_id.into(),
            registry,
            runner,
        }
    }

    /// The `UninstallString` of a previous installation.
    ///
    /// User scope wins over machine scope, and the native machine view wins
    /// over the 32-bit one. Empty values count as absent.
    pub fn find_existing_install_uninstall_command(&self) -> Option<String> {
        let key = uninstall_key(&self.product_id);
        self.registry
            .read_user_scope(&key, UNINSTALL_STRING)
            .filter(|command| !command.trim().is_empty())
            .or_else(|| {
                self.registry
                    .read_machine_scope_any_view(&key, UNINSTALL_STRING)
                    .filter(|command| !command.trim().is_empty())
            })
    }

    pub fn is_upgrade(&self) -> bool {
        self.find_existing_install_uninstall_command().is_some()
    }

    /// Runs the previous version's uninstaller silently and waits for it.
    pub fn uninstall_previous_version(&mut self) -> UninstallOutcome {
        let Some(command) = self.find_existing_install_uninstall_command() else {
            log::debug!("No previous installation of {} found", self.product_id);
            return UninstallOutcome::NoPriorInstall;
        };

        let uninstaller = Path::new(strip_quotes(&command));
        log::info!(
            "Removing previous installation with {}",
            uninstaller.display()
        );

        match self.runner.run(uninstaller, &SILENT_UNINSTALL_ARGS) {
            Ok(status) => {
                log::info!("Previous uninstaller exited with {:?}", status.code());
                UninstallOutcome::Uninstalled
            }
            Err(err) => {
                log::warn!("{err}, continuing with the installation");
                UninstallOutcome::LaunchFailed
            }
        }
    }

    pub fn into_parts(self) -> (Reader, Runner) {
        (self.registry, self.runner)
    }
}

/// Removes quote characters surrounding an uninstall command.
pub fn strip_quotes(command: &str) -> &str {
    command.trim().trim_matches('"').trim()
}
