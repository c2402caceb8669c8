use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

use thiserror::Error;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: Option<i32>,
}

impl ExitStatus {
    pub fn from_code(code: Option<i32>) -> Self {
        Self { code }
    }

    /// `None` when the process was ended by a signal.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// The OS refused to start the process at all.
#[derive(Debug, Error)]
#[error("Failed to launch {}: {source}", .path.display())]
pub struct LaunchError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Runs an external program and blocks until it exits.
pub trait ProcessRunner {
    fn run(&mut self, path: &Path, args: &[&str]) -> Result<ExitStatus, LaunchError>;
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &mut T {
    fn run(&mut self, path: &Path, args: &[&str]) -> Result<ExitStatus, LaunchError> {
        (**self).run(path, args)
    }
}

/// Launches real processes with their console window hidden.
///
/// There is no timeout: a child that never exits blocks the caller forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&mut self, path: &Path, args: &[&str]) -> Result<ExitStatus, LaunchError> {
        let mut command = Command::new(path);
        command.args(args);
        hide_window(&mut command);

        log::debug!("Running {} {:?}", path.display(), args);
        command
            .status()
            .map(ExitStatus::from)
            .map_err(|source| LaunchError {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Starts `path` inside `working_dir` without waiting for it.
pub fn spawn_detached(path: &Path, working_dir: &Path) -> Result<(), LaunchError> {
    Command::new(path)
        .current_dir(working_dir)
        .spawn()
        .map(|_child| ())
        .map_err(|source| LaunchError {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(windows)]
fn hide_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    command.creation_flags(CREATE_NO_WINDOW.0);
}

#[cfg(not(windows))]
fn hide_window(_command: &mut Command) {}

/// Records every call and answers with a canned result.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingRunner {
    pub(crate) calls: Vec<(PathBuf, Vec<String>)>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) fail_launch: bool,
}

#[cfg(test)]
impl RecordingRunner {
    pub(crate) fn exiting_with(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl ProcessRunner for RecordingRunner {
    fn run(&mut self, path: &Path, args: &[&str]) -> Result<ExitStatus, LaunchError> {
        self.calls.push((
            path.to_path_buf(),
            args.iter().map(|arg| arg.to_string()).collect(),
        ));
        if self.fail_launch {
            return Err(LaunchError {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        Ok(ExitStatus::from_code(self.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_launch_error() {
        let path = std::env::temp_dir()
            .join("gama-setup-does-not-exist")
            .join("unins000.exe");
        let err = SystemProcessRunner
            .run(&path, &["/SILENT"])
            .expect_err("launch must fail");
        assert_eq!(err.path, path);
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let status = SystemProcessRunner
            .run(Path::new("/bin/sh"), &["-c", "exit 3"])
            .expect("sh must launch");
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn recording_runner_keeps_arguments() {
        let mut runner = RecordingRunner::exiting_with(0);
        let status = runner
            .run(Path::new("uninst.exe"), &["/SILENT", "/NORESTART"])
            .expect("fake never fails");
        assert_eq!(status.code(), Some(0));
        assert_eq!(
            runner.calls,
            vec![(
                PathBuf::from("uninst.exe"),
                vec!["/SILENT".to_string(), "/NORESTART".to_string()]
            )]
        );
    }
}
