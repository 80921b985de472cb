use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide settings assembled from CLI flags with environment
/// variable fallbacks. Flags always win over the environment; the
/// environment always wins over the built-in default.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_workers: usize,
    pub task_timeout: Duration,
    pub max_turns: Option<u32>,
    pub verbosity: u8,
    pub use_codex: bool,
    pub model: String,
    pub data_dir: PathBuf,
}

const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_MODEL: &str = "sonnet";
const DEFAULT_DATA_DIR: &str = ".ship";

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        workers: Option<usize>,
        timeout_secs: Option<u64>,
        max_turns: Option<u32>,
        verbosity: u8,
        use_codex: bool,
    ) -> Self {
        let max_workers = workers.or_else(|| env_usize("SHIP_MAX_WORKERS")).unwrap_or(DEFAULT_MAX_WORKERS).max(1);

        let task_timeout = Duration::from_secs(timeout_secs.or_else(|| env_u64("SHIP_TASK_TIMEOUT")).unwrap_or(DEFAULT_TASK_TIMEOUT_SECS));

        let model = std::env::var("SHIP_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());

        let data_dir = std::env::var("SHIP_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        Self {
            max_workers,
            task_timeout,
            max_turns,
            verbosity,
            use_codex,
            model,
            data_dir,
        }
    }
}
