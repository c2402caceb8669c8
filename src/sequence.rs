use crate::{
    guard::{UninstallOutcome, UpgradeGuard},
    installer::InstallError,
    process::ProcessRunner,
    registry::RegistryReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Start,
    CheckUpgrade,
    UninstallOld,
    InstallFiles,
    RegisterShortcuts,
    Done,
}

/// The parts of an installation that write to the target machine.
pub trait FileInstaller {
    fn install_files(&mut self) -> Result<(), InstallError>;
    fn register_shortcuts(&mut self) -> Result<(), InstallError>;
}

impl<T: FileInstaller + ?Sized> FileInstaller for &mut T {
    fn install_files(&mut self) -> Result<(), InstallError> {
        (**self).install_files()
    }

    fn register_shortcuts(&mut self) -> Result<(), InstallError> {
        (**self).register_shortcuts()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Every state the sequence passed through, in order.
    pub states: Vec<InstallState>,
    /// Set when a previous version was found.
    pub upgrade: Option<UninstallOutcome>,
}

/// Drives `Start → CheckUpgrade → (UninstallOld)? → InstallFiles → RegisterShortcuts → Done`.
///
/// The guard can only delay the install. Only errors from `installer` end the
/// sequence early.
pub fn run_install_sequence<Reader, Runner, Installer>(
    guard: &mut UpgradeGuard<Reader, Runner>,
    installer: &mut Installer,
) -> Result<InstallReport, InstallError>
where
    Reader: RegistryReader,
    Runner: ProcessRunner,
    Installer: FileInstaller + ?Sized,
{
    let mut report = InstallReport {
        states: Vec::new(),
        upgrade: None,
    };
    let mut state = InstallState::Start;

    loop {
        report.states.push(state);
        state = match state {
            InstallState::Start => InstallState::CheckUpgrade,
            InstallState::CheckUpgrade => {
                if guard.is_upgrade() {
                    InstallState::UninstallOld
                } else {
                    InstallState::InstallFiles
                }
            }
            InstallState::UninstallOld => {
                let outcome = guard.uninstall_previous_version();
                log::debug!("Upgrade outcome {:?} ({})", outcome, outcome.code());
                report.upgrade = Some(outcome);
                InstallState::InstallFiles
            }
            InstallState::InstallFiles => {
                installer.install_files()?;
                InstallState::RegisterShortcuts
            }
            InstallState::RegisterShortcuts => {
                installer.register_shortcuts()?;
                InstallState::Done
            }
            InstallState::Done => break,
        };
    }

    Ok(report)
}
