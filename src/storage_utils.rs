use crate::transform::{LONG_WINDOW, SHORT_WINDOW};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// `config.json` deserializes straight into these types. Missing sections or
// keys fall back to the defaults below.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub short_window: usize, // e.g., 20 sessions
    pub long_window: usize,  // e.g., 50 sessions
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            short_window: SHORT_WINDOW,
            long_window: LONG_WINDOW,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String, // e.g., "https://query1.finance.yahoo.com"
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) stock-analyzer/0.1".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: String, // relative to the storage directory
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: "exports".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub tail_rows: usize, // rows shown in the "Stock Data" table
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { tail_rows: 5 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    // Nested structs organize the config logically
    pub analysis: AnalysisConfig,
    pub fetch: FetchConfig,
    pub export: ExportConfig,
    pub report: ReportConfig,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Stores the absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// **Constructor: new_relative**
    /// Creates a new manager instance. It calculates the storage path relative
    /// to where the binary executable is running.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;

        // 2. Resolve the parent directory and append the relative path (e.g., "storage")
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    /// **Constructor: new**
    /// Uses `base_dir` as is, creating it when missing.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// **Generic Save Function**
    /// Takes any struct that implements `Serialize` and saves it as pretty JSON.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let json_bytes = serde_json::to_vec_pretty(data)?;
        self.save_bytes(&format!("{}.json", filename), &json_bytes)
            .await?;
        Ok(())
    }

    /// **Raw Save Function**
    /// Writes `bytes` to `relative_path` (extension included) with an
    /// "Atomic Write": data lands in a `.tmp` sibling first, then gets renamed,
    /// so a crash mid-write never leaves a truncated file behind.
    pub async fn save_bytes(&self, relative_path: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let final_path = self.base_dir.join(relative_path);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = final_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        // 1. Write data to the temporary file
        fs::write(&tmp_path, bytes).await?;

        // 2. Atomically rename the temp file to the final name.
        fs::rename(&tmp_path, &final_path).await?;

        Ok(final_path)
    }

    /// **Generic Load Function**
    /// Takes a filename and a target Type (T), reads the file, and deserializes it.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // Bytes, not String: serde_json validates UTF-8 while parsing anyway.
        let content = fs::read(path).await?;

        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// **Load or Initialize**
    /// Loads `filename`, or writes `T::default()` there first if the file
    /// does not exist yet.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let path = self.base_dir.join(format!("{}.json", filename));
        if !fs::try_exists(&path).await? {
            let defaults = T::default();
            self.save(filename, &defaults).await?;
            info!(path = %path.display(), "wrote default configuration");
            return Ok(defaults);
        }
        self.load(filename).await
    }
}
