//! A converter that never leaves the process.
//!
//! The filename prefix picks the outcome:
//! - `fail_`: engine failure
//! - `slow_`: timeout
//! - `panic_`: the converter panics
//! - `missing_`: engine claims success but leaves no output
//! - anything else: writes `<stem>.pdf` into the output directory

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bulkconv::converter::expected_output;
use bulkconv::{ConversionError, DocumentConverter};

#[derive(Default)]
pub struct StubConverter {
    delay: Option<Duration>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl StubConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every conversion sleeps this long, so overlapping calls can be observed.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of conversions seen running at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn outcome(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let expected = expected_output(input, output_dir, "pdf");

        if name.starts_with("fail_") {
            Err(ConversionError::EngineFailure {
                diagnostic: format!("source file could not be loaded: {}", name),
            })
        } else if name.starts_with("slow_") {
            Err(ConversionError::Timeout(Duration::from_secs(300)))
        } else if name.starts_with("panic_") {
            panic!("stub converter crashed on {}", name);
        } else if name.starts_with("missing_") {
            Err(ConversionError::MissingOutput { expected })
        } else {
            let body = std::fs::read(input).map_err(|e| ConversionError::InputUnreadable {
                path: input.to_path_buf(),
                source: e,
            })?;
            let mut rendered = b"%PDF-1.7 stub\n".to_vec();
            rendered.extend_from_slice(&body);
            std::fs::write(&expected, rendered).map_err(|e| ConversionError::Io {
                path: expected.clone(),
                source: e,
            })?;
            Ok(expected)
        }
    }
}

impl DocumentConverter for StubConverter {
    fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        // Decrement even if the outcome panics.
        struct Leave<'a>(&'a AtomicUsize);
        impl Drop for Leave<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }
        let _leave = Leave(&self.active);

        self.outcome(input, output_dir)
    }

    fn target_extension(&self) -> &str {
        "pdf"
    }
}
