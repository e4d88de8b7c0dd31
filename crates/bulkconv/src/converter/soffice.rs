use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{expected_output, DocumentConverter};
use crate::config::ConverterConfig;
use crate::error::ConversionError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives LibreOffice in headless mode, one process per document.
pub struct SofficeConverter {
    program: String,
    program_args: Vec<String>,
    target_format: String,
    timeout: Duration,
    isolated_profile: bool,
}

impl SofficeConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            program_args: config.program_args.clone(),
            target_format: config.target_format.clone(),
            timeout: config.timeout(),
            isolated_profile: config.isolated_profile,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.program_args);
        if self.isolated_profile {
            cmd.arg(format!(
                "-env:UserInstallation=file://{}",
                output_dir.join(".profile").display()
            ));
        }
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(&self.target_format)
            .arg("--outdir")
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a timeout also reaches soffice.bin behind the wrapper script.
            cmd.process_group(0);
        }
        cmd
    }
}

/// Kills the renderer together with every process it started, then reaps it.
fn kill_renderer(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg takes plain integers; the group was created at
            // spawn and is led by `child`, which has not been reaped yet.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
                log::debug!(
                    "killpg({}) failed: {}",
                    pgid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Drains a child pipe on its own thread so a chatty renderer cannot block
/// on a full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).trim().to_string()
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn format_engine_error(status: ExitStatus, stderr: &str, stdout: &str) -> String {
    let detail = match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!("exit code {}", status.code().unwrap_or(-1)),
        (true, false) => stdout.to_string(),
        (false, true) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stderr, stdout),
    };
    format!("LibreOffice conversion failed: {}", detail)
}

impl DocumentConverter for SofficeConverter {
    fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        std::fs::File::open(input).map_err(|e| ConversionError::InputUnreadable {
            path: input.to_path_buf(),
            source: e,
        })?;
        std::fs::create_dir_all(output_dir).map_err(|e| ConversionError::Io {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let expected = expected_output(input, output_dir, &self.target_format);

        let mut child = self
            .command(input, output_dir)
            .spawn()
            .map_err(|e| ConversionError::Io {
                path: PathBuf::from(&self.program),
                source: e,
            })?;
        log::debug!(
            "Started {} (pid {}) for {}",
            self.program,
            child.id(),
            input.display()
        );

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = wait_with_deadline(&mut child, self.timeout);
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::warn!(
                    "Conversion of {} exceeded {}s, killing pid {}",
                    input.display(),
                    self.timeout.as_secs(),
                    child.id()
                );
                kill_renderer(&mut child);
                return Err(ConversionError::Timeout(self.timeout));
            }
            Err(e) => {
                kill_renderer(&mut child);
                return Err(ConversionError::Io {
                    path: input.to_path_buf(),
                    source: e,
                });
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(ConversionError::EngineFailure {
                diagnostic: format_engine_error(status, &stderr, &stdout),
            });
        }

        if !expected.is_file() {
            return Err(ConversionError::MissingOutput { expected });
        }

        Ok(expected)
    }

    fn target_extension(&self) -> &str {
        &self.target_format
    }
}
