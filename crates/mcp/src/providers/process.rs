use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{ProcessOutput, ProcessRunner, ProviderError};

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ProcessOutput, ProviderError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProviderError::Launch {
                program: program.display().to_string(),
                message: e.to_string(),
            })?;

        // stderr is diagnostic only; stdout is parsed and must decode cleanly.
        let stdout = String::from_utf8(output.stdout).map_err(|e| ProviderError::Decode {
            origin: program.display().to_string(),
            message: format!("stdout is not valid UTF-8: {}", e.utf8_error()),
        })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Checks that `path` names an existing regular file with any execute bit
/// set. Whether the current user may run it is left to the launch.
pub fn verify_executable(path: &Path) -> Result<(), ProviderError> {
    let metadata =
        fs::metadata(path).map_err(|_| ProviderError::ExecutableNotFound(path.to_path_buf()))?;

    if metadata.is_file() && is_executable(&metadata) {
        Ok(())
    } else {
        Err(ProviderError::NotExecutable(path.to_path_buf()))
    }
}

/// [`verify_executable`], then optionally runs `path probe` and requires a
/// zero exit.
pub async fn verify_invocable(
    runner: &dyn ProcessRunner,
    path: &Path,
    probe: Option<&str>,
) -> Result<(), ProviderError> {
    verify_executable(path)?;

    let Some(flag) = probe else {
        return Ok(());
    };

    let output = runner
        .run(path, &[flag.to_string()])
        .await
        .map_err(|e| ProviderError::VersionProbe {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if !output.success() {
        return Err(ProviderError::VersionProbe {
            path: path.to_path_buf(),
            message: format!("{}: {}", output.status_text(), output.stderr.trim()),
        });
    }

    debug!(program = %path.display(), version = output.stdout.trim(), "probe ok");
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = verify_executable(&dir.path().join("datasets")).unwrap_err();
        assert!(matches!(err, ProviderError::ExecutableNotFound(_)));
    }

    #[test]
    fn directories_and_plain_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            verify_executable(dir.path()),
            Err(ProviderError::NotExecutable(_))
        ));

        let plain = script(&dir, "plain", "exit 0", 0o644);
        assert!(matches!(
            verify_executable(&plain),
            Err(ProviderError::NotExecutable(_))
        ));
    }

    #[tokio::test]
    async fn runner_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "tool", "echo \"$1\"; echo oops >&2; exit 3", 0o755);

        let output = TokioProcessRunner
            .run(&path, &["hello".to_string()])
            .await
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn non_utf8_stdout_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = script(
            &dir,
            "datasets",
            r#"printf '{"reports":[{"gene":{"symbol":"BR\377CA1"}}]}'"#,
            0o755,
        );

        let err = TokioProcessRunner.run(&path, &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn non_utf8_stderr_is_kept_lossily() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "tool", r"printf 'bad \377 byte' >&2; exit 2", 0o755);

        let output = TokioProcessRunner.run(&path, &[]).await.unwrap();
        assert_eq!(output.code, Some(2));
        assert!(output.stderr.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn failing_probe_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "datasets", "exit 1", 0o755);

        let err = verify_invocable(&TokioProcessRunner, &path, Some("--version"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::VersionProbe { .. }));

        verify_invocable(&TokioProcessRunner, &path, None).await.unwrap();
    }
}
