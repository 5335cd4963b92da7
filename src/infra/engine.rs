use std::{
    io::{ErrorKind, Write},
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    application::pdf::{PdfEngine, RenderError},
    domain::types::PaperConfig,
};

const TARGET: &str = "infra::engine";

/// Runs an external `wkhtmltopdf`-compatible executable:
/// `<program> --quiet --page-size <size> --orientation <orientation> <in.html> <out.pdf>`.
#[derive(Debug, Clone)]
pub struct CommandPdfEngine {
    program: PathBuf,
    timeout: Duration,
}

impl CommandPdfEngine {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, html: &str, paper: PaperConfig) -> Result<Bytes, RenderError> {
        let started_at = Instant::now();

        let mut input_file = tempfile::Builder::new()
            .prefix("stampa-")
            .suffix(".html")
            .tempfile()?;
        input_file.write_all(html.as_bytes())?;
        input_file.flush()?;

        let output_file: NamedTempFile = tempfile::Builder::new()
            .prefix("stampa-")
            .suffix(".pdf")
            .tempfile()?;
        let output_path = output_file.path().to_path_buf();

        let child = Command::new(&self.program)
            .arg("--quiet")
            .arg("--page-size")
            .arg(paper.size.as_str())
            .arg("--orientation")
            .arg(paper.orientation.as_str())
            .arg(input_file.path())
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = TARGET,
                    op = "engine::render",
                    result = "error",
                    error_code = "spawn_engine",
                    program = %self.program.display(),
                    error = %err,
                    "Failed to spawn PDF engine"
                );
                if err.kind() == ErrorKind::NotFound {
                    RenderError::Unavailable(err)
                } else {
                    RenderError::Io(err)
                }
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    target = TARGET,
                    op = "engine::render",
                    result = "timeout",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "PDF engine exceeded its budget"
                );
                return Err(RenderError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                target = TARGET,
                op = "engine::render",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "pdf_engine",
                stderr = %stderr,
                "PDF engine invocation failed"
            );
            return Err(RenderError::Engine { exit_code, stderr });
        }

        let pdf = tokio::fs::read(&output_path).await?;
        if pdf.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        debug!(
            target = TARGET,
            op = "engine::render",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            html_bytes = html.len(),
            pdf_bytes = pdf.len(),
            page_size = paper.size.as_str(),
            orientation = paper.orientation.as_str(),
            "PDF engine finished"
        );

        Ok(Bytes::from(pdf))
    }
}

#[async_trait]
impl PdfEngine for CommandPdfEngine {
    async fn render(&self, html: &str, paper: PaperConfig) -> Result<Bytes, RenderError> {
        self.run(html, paper).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt, path::Path};
    use tempfile::TempDir;

    use crate::domain::types::{Orientation, PaperSize};

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    #[tokio::test]
    async fn passes_paper_settings_and_returns_output() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let script = format!(
            r#"#!/bin/sh
set -eu
echo "$@" > "{args_file}"
for last in "$@"; do :; done
printf '%%PDF-1.4 fake' > "$last"
"#,
            args_file = args_path.display()
        );
        let program = write_script(dir.path(), "fake-engine", &script);
        let engine = CommandPdfEngine::new(program, Duration::from_secs(10));

        let paper = PaperConfig {
            size: PaperSize::A4,
            orientation: Orientation::Landscape,
        };
        let pdf = engine.render("<p>hi</p>", paper).await.expect("pdf");
        assert_eq!(&pdf[..], b"%PDF-1.4 fake");

        let args = fs::read_to_string(&args_path).expect("args");
        assert!(args.contains("--page-size A4"), "args: {args}");
        assert!(args.contains("--orientation Landscape"), "args: {args}");
        assert!(args.contains(".html"), "args: {args}");
    }

    #[tokio::test]
    async fn surfaces_engine_errors() {
        let dir = TempDir::new().expect("temp dir");
        let program = write_script(
            dir.path(),
            "fake-engine",
            "#!/bin/sh\necho \"boom\" >&2\nexit 42\n",
        );
        let engine = CommandPdfEngine::new(program, Duration::from_secs(10));

        let err = engine
            .render("<p>hi</p>", PaperConfig::default())
            .await
            .expect_err("engine failure");
        match err {
            RenderError::Engine { exit_code, stderr } => {
                assert_eq!(exit_code, Some(42));
                assert!(stderr.contains("boom"), "stderr: {stderr}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let program = write_script(dir.path(), "fake-engine", "#!/bin/sh\nexit 0\n");
        let engine = CommandPdfEngine::new(program, Duration::from_secs(10));

        let err = engine
            .render("<p>hi</p>", PaperConfig::default())
            .await
            .expect_err("empty output");
        assert!(matches!(err, RenderError::EmptyOutput));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let dir = TempDir::new().expect("temp dir");
        let program = write_script(dir.path(), "fake-engine", "#!/bin/sh\nsleep 5\n");
        let engine = CommandPdfEngine::new(program, Duration::from_millis(100));

        let err = engine
            .render("<p>hi</p>", PaperConfig::default())
            .await
            .expect_err("timeout");
        assert!(matches!(err, RenderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let engine = CommandPdfEngine::new("/nonexistent/stampa-engine", Duration::from_secs(1));
        let err = engine
            .render("<p>hi</p>", PaperConfig::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, RenderError::Unavailable(_)));
    }
}
