use std::{
    io,
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    downloader::OutputFile,
    error::{LaunchError, diagnostic},
    fs_utils::make_executable,
};

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts a program without keeping any link to it.
pub trait Spawner {
    /// Spawns `program` with `args` as its parameter string and returns the process id.
    fn spawn_detached(&self, program: &Path, args: &str) -> io::Result<u32>;
}

/// Spawns with null standard handles in a process group of its own, never waiting on the child.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    #[allow(clippy::zombie_processes)]
    fn spawn_detached(&self, program: &Path, args: &str) -> io::Result<u32> {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
            if !args.is_empty() {
                command.raw_arg(args);
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
            command.args(args.split_whitespace());
        }
        #[cfg(not(any(unix, windows)))]
        command.args(args.split_whitespace());

        let child = command.spawn()?;
        Ok(child.id())
    }
}

pub struct Launcher<P = DetachedSpawner> {
    spawner: P,
}

impl Default for Launcher<DetachedSpawner> {
    fn default() -> Self {
        Self::new(DetachedSpawner)
    }
}

impl<P: Spawner> Launcher<P> {
    pub fn new(spawner: P) -> Self {
        Self { spawner }
    }

    pub fn spawner(&self) -> &P {
        &self.spawner
    }

    /// Launches the downloaded file with `args`, releasing the write handle first.
    ///
    /// Returns `Ok(None)` when there is no file to launch. Failures are logged here,
    /// the downloaded file stays on disk either way.
    pub async fn run(
        &self,
        output: &mut OutputFile,
        args: &str,
    ) -> Result<Option<u32>, LaunchError> {
        let path = output.path().to_path_buf();
        if path.as_os_str().is_empty() {
            return Ok(None);
        }

        if output.is_open() {
            output.close().await.map_err(|e| {
                tracing::error!("Failed to close {}: {}", path.display(), diagnostic(&e));
                LaunchError::Close {
                    path: path.clone(),
                    e,
                }
            })?;
        }

        make_executable(&path).await.map_err(|e| {
            tracing::error!(
                "Failed to mark {} as executable: {}",
                path.display(),
                diagnostic(&e)
            );
            LaunchError::Permissions {
                path: path.clone(),
                e,
            }
        })?;

        match self.spawner.spawn_detached(&path, args) {
            Ok(pid) => {
                tracing::info!("Started {} (pid {})", path.display(), pid);
                Ok(Some(pid))
            }
            Err(e) => {
                tracing::error!("Failed to launch {}: {}", path.display(), diagnostic(&e));
                Err(LaunchError::Spawn { path, e })
            }
        }
    }
}
