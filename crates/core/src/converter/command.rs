//! External-command executor.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use tokio::process::Command;
use tokio::time::timeout;

use super::config::ConverterConfig;
use super::error::ConversionError;
use super::traits::ConversionExecutor;
use super::types::ConversionContext;
use crate::job::JobHandle;
use crate::storage::ArtifactStorage;

/// Bytes of stderr kept on a failed job.
const STDERR_TAIL: usize = 2048;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(input|output_dir|job_id|context_url|setting:([A-Za-z0-9_.-]+))\}").unwrap());

/// Runs a configured program per job and stores its outputs.
///
/// Every regular file the program leaves in the output directory is stored;
/// the job gets `url` (first file by name) and `files` (count) custom values.
pub struct CommandExecutor {
    config: ConverterConfig,
    storage: Arc<dyn ArtifactStorage>,
}

impl CommandExecutor {
    pub fn new(config: ConverterConfig, storage: Arc<dyn ArtifactStorage>) -> Self {
        Self { config, storage }
    }

    /// Expand placeholders in one argument template.
    fn render_arg(template: &str, ctx: &ConversionContext) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
                "input" => ctx.input_path.display().to_string(),
                "output_dir" => ctx.output_dir.display().to_string(),
                "job_id" => ctx.job_id.clone(),
                "context_url" => ctx.context_url.clone().unwrap_or_default(),
                _ => caps
                    .get(2)
                    .and_then(|key| ctx.settings.get(key.as_str()))
                    .cloned()
                    .unwrap_or_default(),
            })
            .into_owned()
    }

    async fn run_program(&self, ctx: &ConversionContext) -> Result<(), ConversionError> {
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| Self::render_arg(a, ctx))
            .collect();

        tracing::debug!(
            job_id = %ctx.job_id,
            program = %self.config.program.display(),
            ?args,
            "Running converter"
        );

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::failed(
                        format!("Program not found: {}", self.config.program.display()),
                        None,
                    )
                } else {
                    ConversionError::Io(e)
                }
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ConversionError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::failed(
                format!("{} exited with {}", self.config.program.display(), output.status),
                Some(tail(&stderr, STDERR_TAIL).to_string()),
            ));
        }

        Ok(())
    }

    async fn store_outputs(&self, ctx: &ConversionContext, job: &JobHandle) -> Result<(), ConversionError> {
        let outputs = list_files(&ctx.output_dir).await?;
        if outputs.is_empty() {
            return Err(ConversionError::failed("Converter produced no output", None));
        }

        let mut first_url = None;
        for path in &outputs {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let url = self.storage.put(path, name, &ctx.job_id).await?;
            first_url.get_or_insert(url);
        }

        if let Some(url) = first_url {
            job.set_custom_value("url", url);
        }
        job.set_custom_value("files", outputs.len() as i64);
        Ok(())
    }
}

#[async_trait]
impl ConversionExecutor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, ctx: ConversionContext, job: JobHandle) -> Result<(), ConversionError> {
        if !tokio::fs::try_exists(&ctx.input_path).await.unwrap_or(false) {
            return Err(ConversionError::InputNotFound {
                path: ctx.input_path.clone(),
            });
        }
        tokio::fs::create_dir_all(&ctx.output_dir).await?;

        self.run_program(&ctx).await?;
        self.store_outputs(&ctx, &job).await
    }
}

/// Regular files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CustomData, CustomValue, JobRecord, JobState, JobStore, MemoryJobStore};
    use crate::storage::{LocalStorage, StorageConfig};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _dirs: Vec<TempDir>,
        store: Arc<dyn JobStore>,
        handle: JobHandle,
        ctx: ConversionContext,
        storage: Arc<LocalStorage>,
    }

    fn fixture(input: Option<&[u8]>) -> Fixture {
        let work = TempDir::new().unwrap();
        let artifacts = TempDir::new().unwrap();

        let mut settings = BTreeMap::new();
        settings.insert("format".to_string(), "pdf".to_string());
        let record = JobRecord::new(settings.clone(), None, CustomData::new());
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        store.put(record.clone()).unwrap();
        store.update_state(&record.id, JobState::Processing).unwrap();

        let input_path = work.path().join("input.txt");
        if let Some(bytes) = input {
            std::fs::write(&input_path, bytes).unwrap();
        }

        let storage = Arc::new(LocalStorage::new(StorageConfig {
            root: artifacts.path().to_path_buf(),
            public_base_url: "http://files.test".to_string(),
        }));

        Fixture {
            handle: JobHandle::new(record.id.clone(), Arc::clone(&store)),
            ctx: ConversionContext {
                job_id: record.id,
                settings,
                input_path,
                output_dir: work.path().join("output"),
                context_url: Some("http://svc.test".to_string()),
            },
            store,
            storage,
            _dirs: vec![work, artifacts],
        }
    }

    #[test]
    fn test_render_arg() {
        let f = fixture(None);
        let ctx = &f.ctx;
        assert_eq!(
            CommandExecutor::render_arg("--to={setting:format}", ctx),
            "--to=pdf"
        );
        assert_eq!(
            CommandExecutor::render_arg("{job_id}@{context_url}", ctx),
            format!("{}@http://svc.test", ctx.job_id)
        );
        assert_eq!(CommandExecutor::render_arg("{setting:missing}", ctx), "");
        assert_eq!(CommandExecutor::render_arg("{unknown}", ctx), "{unknown}");
        assert_eq!(
            CommandExecutor::render_arg("{input}", ctx),
            ctx.input_path.display().to_string()
        );
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[tokio::test]
    async fn test_copy_command_stores_output() {
        let f = fixture(Some(b"content"));
        let executor = CommandExecutor::new(ConverterConfig::default(), f.storage.clone());

        executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap();

        let record = f.store.get(&f.ctx.job_id).unwrap();
        let expected_url = format!("http://files.test/{}/input.txt", f.ctx.job_id);
        assert_eq!(
            record.custom_values.get("url"),
            Some(&CustomValue::Text(expected_url))
        );
        assert_eq!(record.custom_values.get("files"), Some(&CustomValue::Int(1)));
        let stored = f.storage.root().join(&f.ctx.job_id).join("input.txt");
        assert_eq!(std::fs::read(stored).unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_missing_input() {
        let f = fixture(None);
        let executor = CommandExecutor::new(ConverterConfig::default(), f.storage.clone());

        let err = executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap_err();
        assert_eq!(err.code(), 1002);
    }

    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let f = fixture(Some(b"x"));
        let config = ConverterConfig::new("sh", &["-c", "echo broken input >&2; exit 3"]);
        let executor = CommandExecutor::new(config, f.storage.clone());

        let err = executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap_err();
        assert_eq!(err.code(), 1000);
        assert!(err.job_message().contains("broken input"));
    }

    #[tokio::test]
    async fn test_timeout_kills_program() {
        let f = fixture(Some(b"x"));
        let config = ConverterConfig::new("sleep", &["5"]).with_timeout_secs(1);
        let executor = CommandExecutor::new(config, f.storage.clone());

        let started = std::time::Instant::now();
        let err = executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { timeout_secs: 1 }));
        assert_eq!(err.code(), 1001);
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_no_output_is_failure() {
        let f = fixture(Some(b"x"));
        let config = ConverterConfig::new("true", &[]);
        let executor = CommandExecutor::new(config, f.storage.clone());

        let err = executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap_err();
        assert_eq!(err.code(), 1000);
    }

    #[tokio::test]
    async fn test_program_not_found() {
        let f = fixture(Some(b"x"));
        let config = ConverterConfig::new("/nonexistent/converter", &[]);
        let executor = CommandExecutor::new(config, f.storage.clone());

        let err = executor.execute(f.ctx.clone(), f.handle.clone()).await.unwrap_err();
        assert!(err.to_string().contains("Program not found"));
    }
}
