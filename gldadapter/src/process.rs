/// Simulator process management
///
/// Launches gridlabd in debugger mode with piped console streams, finds
/// its process id through the pidfile it writes, and carries the
/// platform-specific paths for the break and kill signals.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::settings::ProjectSettings;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start simulator process: {0}")]
    StartError(#[from] std::io::Error),
    #[error("Signal error: {0}")]
    SignalError(String),
}

static PID_FILE_SEQ: AtomicU32 = AtomicU32::new(0);

/// Fresh pidfile path for one launch, under the system temp directory.
///
/// The simulator creates the file itself; only the path is allocated
/// here.
pub fn allocate_pid_file() -> PathBuf {
    let seq = PID_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("gldbg-{}-{}.pid", std::process::id(), seq))
}

/// Read the process id the simulator wrote at startup.
///
/// Returns None until the file exists and its first line parses as a
/// nonzero id.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    let contents = std::fs::read_to_string(path).ok()?;
    let first = contents.lines().next()?;
    match first.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

/// A running simulator child process
pub struct GldProcess {
    child: Child,
}

impl GldProcess {
    /// Spawn the simulator with the project's command line.
    ///
    /// All three console streams are piped and the child is killed if
    /// the handle is dropped while it still runs.
    pub fn launch(settings: &ProjectSettings, pid_file: &Path) -> Result<GldProcess, ProcessError> {
        let args = settings.build_command_line(pid_file);
        log::debug!(
            "Launching simulator: {} {}",
            settings.gridlab_exe.display(),
            args.join(" ")
        );

        let mut command = Command::new(&settings.gridlab_exe);
        command
            .args(&args)
            .current_dir(&settings.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(gl_path) = &settings.gl_path {
            command.env("GLPATH", gl_path);
        }

        let child = command.spawn()?;
        log::debug!("Simulator started with PID: {:?}", child.id());
        Ok(GldProcess { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Begin killing the child without waiting for it to exit.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

/// Send the break signal to a process id.
#[cfg(unix)]
pub fn post_interrupt(pid: u32) -> Result<(), ProcessError> {
    let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        log::error!("Failed to send SIGINT to {}: {}", pid, err);
        return Err(ProcessError::SignalError(err.to_string()));
    }
    log::debug!("Sent SIGINT to {}", pid);
    Ok(())
}

/// Send the terminate signal to a process id.
#[cfg(unix)]
pub fn post_terminate(pid: u32) -> Result<(), ProcessError> {
    let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        log::error!("Failed to send SIGTERM to {}: {}", pid, err);
        return Err(ProcessError::SignalError(err.to_string()));
    }
    log::debug!("Sent SIGTERM to {}", pid);
    Ok(())
}

/// Send the break signal to a process id.
#[cfg(windows)]
pub fn post_interrupt(pid: u32) -> Result<(), ProcessError> {
    use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

    let result = unsafe { GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid) };
    if result == 0 {
        log::error!("Failed to send Ctrl+C event to {}", pid);
        return Err(ProcessError::SignalError(format!(
            "GenerateConsoleCtrlEvent failed for pid {}",
            pid
        )));
    }
    log::debug!("Sent Ctrl+C event to {}", pid);
    Ok(())
}

/// Send the terminate signal to a process id.
#[cfg(windows)]
pub fn post_terminate(pid: u32) -> Result<(), ProcessError> {
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
    use winapi::um::winnt::PROCESS_TERMINATE;

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            log::error!("Failed to open process {} for termination", pid);
            return Err(ProcessError::SignalError(format!(
                "OpenProcess failed for pid {}",
                pid
            )));
        }
        let result = TerminateProcess(handle, 1);
        CloseHandle(handle);
        if result == 0 {
            log::error!("Failed to terminate process {}", pid);
            return Err(ProcessError::SignalError(format!(
                "TerminateProcess failed for pid {}",
                pid
            )));
        }
    }
    log::debug!("Terminated process {}", pid);
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn post_interrupt(_pid: u32) -> Result<(), ProcessError> {
    Err(ProcessError::SignalError(
        "signals not supported on this platform".to_string(),
    ))
}

#[cfg(not(any(unix, windows)))]
pub fn post_terminate(_pid: u32) -> Result<(), ProcessError> {
    Err(ProcessError::SignalError(
        "signals not supported on this platform".to_string(),
    ))
}

/// Keep console Ctrl+C events aimed at the simulator from taking this
/// process down with it.
#[cfg(windows)]
pub fn install_signal_protection() {
    use winapi::um::consoleapi::SetConsoleCtrlHandler;

    unsafe {
        SetConsoleCtrlHandler(None, 1);
    }
    log::debug!("Installed console signal protection");
}

#[cfg(not(windows))]
pub fn install_signal_protection() {
    // interrupt signals go straight to the child's pid on other platforms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_pid_file_paths_are_unique() {
        let a = allocate_pid_file();
        let b = allocate_pid_file();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(std::env::temp_dir().as_path()));
        assert!(a.file_name().unwrap().to_string_lossy().ends_with(".pid"));
    }

    #[test]
    fn test_read_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.pid");

        assert_eq!(read_pid_file(&path), None); // not written yet

        std::fs::write(&path, "12345\n").unwrap();
        assert_eq!(read_pid_file(&path), Some(12345));

        std::fs::write(&path, "  678  \nsecond line ignored\n").unwrap();
        assert_eq!(read_pid_file(&path), Some(678));

        std::fs::write(&path, "0\n").unwrap();
        assert_eq!(read_pid_file(&path), None);

        std::fs::write(&path, "not a pid\n").unwrap();
        assert_eq!(read_pid_file(&path), None);
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ProjectSettings::default();
        settings.gridlab_exe = dir.path().join("no-such-binary");
        settings.working_dir = dir.path().to_path_buf();
        settings.model_files.push(PathBuf::from("grid.glm"));

        let result = GldProcess::launch(&settings, &dir.path().join("sim.pid"));
        match result {
            Err(ProcessError::StartError(_)) => {}
            Err(other) => panic!("Expected StartError, got {:?}", other),
            Ok(_) => panic!("Expected the launch to fail"),
        }
    }
}
