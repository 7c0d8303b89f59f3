//! Exit-test process supervisor
//!
//! Spawns the host binary as a child with the re-entry variables set,
//! waits for it while honouring cancellation, and reconstructs what the
//! child did from its exit status, its streams and the back channel.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ExitTestError};
use crate::events::abi::{self, Record};
use crate::events::EventKind;
use crate::executor::CancellationToken;

use super::{
    ExitCondition, ExitTest, ExitTestArtifacts, ExitTestHandler, ABI_VERSION_VAR, BACKCHANNEL_VAR,
    CAPTURES_VAR, ID_VAR,
};

/// Runs exit tests by re-launching an executable
#[derive(Clone, Debug)]
pub struct ProcessSpawner {
    executable: PathBuf,
    args: Vec<String>,
    abi_version: u32,
}

impl ProcessSpawner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            abi_version: abi::CURRENT_VERSION,
        }
    }

    /// Re-launch the running executable
    pub fn current_exe() -> Result<Self, ExitTestError> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Extra arguments passed to the child
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// ABI version the child writes its back channel in
    pub fn with_abi_version(mut self, version: u32) -> Result<Self, ConfigError> {
        abi::check_version(version)?;
        self.abi_version = version;
        Ok(self)
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    async fn supervise(
        &self,
        test: &ExitTest,
        token: CancellationToken,
    ) -> Result<ExitTestArtifacts, ExitTestError> {
        // Removed with everything in it when this function returns.
        let workspace = tempfile::tempdir()?;
        let captures_path = workspace.path().join("captures.json");
        let backchannel_path = workspace.path().join("backchannel.jsonl");
        tokio::fs::write(&captures_path, test.captures.encode()?).await?;
        tokio::fs::File::create(&backchannel_path).await?;

        let stream = |observed: bool| if observed { Stdio::piped() } else { Stdio::null() };
        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .env(ID_VAR, test.id.as_str())
            .env(CAPTURES_VAR, &captures_path)
            .env(BACKCHANNEL_VAR, &backchannel_path)
            .env(ABI_VERSION_VAR, self.abi_version.to_string())
            .stdin(Stdio::null())
            .stdout(stream(test.observe_stdout))
            .stderr(stream(test.observe_stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExitTestError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;
        info!("Spawned exit test {} as pid {:?}", test.id, child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = {
            let collect = async { tokio::join!(read_all(stdout), read_all(stderr), child.wait()) };
            tokio::select! {
                finished = collect => Some(finished),
                _ = token.cancelled() => None,
            }
        };
        let Some((stdout, stderr, status)) = finished else {
            warn!("Exit test {} cancelled, killing child", test.id);
            // kill() also waits, so the child is reaped here.
            child.kill().await?;
            return Err(ExitTestError::Cancelled);
        };

        let exit_condition = ExitCondition::from_status(status?);
        debug!("Exit test {} ended with {}", test.id, exit_condition);

        let backchannel = tokio::fs::read_to_string(&backchannel_path).await?;
        Ok(ExitTestArtifacts {
            exit_condition,
            stdout: stdout?,
            stderr: stderr?,
            forwarded: decode_backchannel(&backchannel),
        })
    }
}

impl ExitTestHandler for ProcessSpawner {
    fn launch<'a>(
        &'a self,
        test: &'a ExitTest,
        token: CancellationToken,
    ) -> BoxFuture<'a, Result<ExitTestArtifacts, ExitTestError>> {
        self.supervise(test, token).boxed()
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

/// Decode back-channel lines, skipping records that cannot be read.
///
/// A child that dies mid-write leaves a truncated last line behind.
fn decode_backchannel(text: &str) -> Vec<EventKind> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let decoded = Record::decode_line(line)
                .and_then(|record| record.decode_event())
                .and_then(|event| event.to_event());
            match decoded {
                Ok(event) => Some(event.kind),
                Err(e) => {
                    warn!("Skipping unreadable back-channel record: {e}");
                    None
                }
            }
        })
        .collect()
}
