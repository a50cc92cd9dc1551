//! External tool discovery.
//!
//! Android tooling lives in wildly different places depending on how the SDK
//! was installed. The SDK root is resolved from, in priority order:
//!
//! 1. `ANDROID_HOME`
//! 2. `ANDROID_SDK_ROOT`
//! 3. `sdk.dir` in the project's `local.properties`
//! 4. Common per-OS install directories
//!
//! Build-tools executables come from the newest `build-tools/<version>`
//! directory. Results are memoized in the run's [`RunCache`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{Error, Result};
use super::run_cache::RunCache;

/// Primary SDK environment variable.
pub const SDK_ENV_PRIMARY: &str = "ANDROID_HOME";
/// Fallback SDK environment variable.
pub const SDK_ENV_FALLBACK: &str = "ANDROID_SDK_ROOT";

/// Tools the pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Archive alignment (`build-tools`)
    Zipalign,
    /// Package signing and verification (`build-tools`)
    Apksigner,
    /// Package inspection (`build-tools`)
    Aapt2,
    /// Bundle signing (JDK)
    Jarsigner,
    /// Build wrapper script (`gradlew`) or system gradle
    Gradle,
    /// Apple developer tools driver
    Xcrun,
}

impl Tool {
    /// Every tool, in reporting order.
    pub const ALL: [Tool; 6] = [
        Tool::Gradle,
        Tool::Aapt2,
        Tool::Zipalign,
        Tool::Apksigner,
        Tool::Jarsigner,
        Tool::Xcrun,
    ];

    /// Executable file name on this OS.
    pub fn executable(&self) -> &'static str {
        match (self, cfg!(windows)) {
            (Tool::Zipalign, true) => "zipalign.exe",
            (Tool::Zipalign, false) => "zipalign",
            (Tool::Apksigner, true) => "apksigner.bat",
            (Tool::Apksigner, false) => "apksigner",
            (Tool::Aapt2, true) => "aapt2.exe",
            (Tool::Aapt2, false) => "aapt2",
            (Tool::Jarsigner, true) => "jarsigner.exe",
            (Tool::Jarsigner, false) => "jarsigner",
            (Tool::Gradle, true) => "gradlew.bat",
            (Tool::Gradle, false) => "gradlew",
            (Tool::Xcrun, _) => "xcrun",
        }
    }

    fn install_hint(&self) -> &'static str {
        match self {
            Tool::Zipalign | Tool::Apksigner | Tool::Aapt2 => {
                "install Android SDK build-tools and set ANDROID_HOME (or sdk.dir in local.properties)"
            }
            Tool::Jarsigner => "install a JDK and set JAVA_HOME",
            Tool::Gradle => "add the Gradle wrapper (gradlew) to the project root or install gradle",
            Tool::Xcrun => "install Xcode command line tools (macOS only)",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::Zipalign => "zipalign",
            Tool::Apksigner => "apksigner",
            Tool::Aapt2 => "aapt2",
            Tool::Jarsigner => "jarsigner",
            Tool::Gradle => "gradle",
            Tool::Xcrun => "xcrun",
        };
        f.write_str(name)
    }
}

/// Locates SDK executables for one project.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    project_root: PathBuf,
    env: HashMap<String, String>,
    default_sdk_dirs: Vec<PathBuf>,
    search_path: bool,
    cache: Arc<RunCache>,
}

impl ToolLocator {
    /// Creates a locator using the process environment and OS default directories.
    pub fn new(project_root: impl Into<PathBuf>, cache: Arc<RunCache>) -> Self {
        Self {
            project_root: project_root.into(),
            env: std::env::vars().collect(),
            default_sdk_dirs: default_sdk_dirs(),
            search_path: true,
            cache,
        }
    }

    /// Replaces the environment snapshot used for lookups.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Replaces the OS default SDK directories.
    pub fn with_default_sdk_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.default_sdk_dirs = dirs;
        self
    }

    /// Disables `PATH` lookups (used where only explicit locations may match).
    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    /// Project root this locator searches from.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolves the Android SDK root, if any candidate exists.
    pub fn sdk_root(&self) -> Option<PathBuf> {
        self.cache.sdk_root(|| {
            let found = self
                .sdk_candidates()
                .into_iter()
                .find(|(_, path)| path.is_dir());
            match &found {
                Some((source, path)) => {
                    log::debug!("Android SDK at {} (from {})", path.display(), source)
                }
                None => log::debug!("Android SDK not found"),
            }
            found.map(|(_, path)| path)
        })
    }

    /// Candidate SDK roots in priority order, labelled with their source.
    pub fn sdk_candidates(&self) -> Vec<(String, PathBuf)> {
        let mut candidates = Vec::new();

        for var in [SDK_ENV_PRIMARY, SDK_ENV_FALLBACK] {
            if let Some(value) = self.env.get(var).filter(|v| !v.trim().is_empty()) {
                candidates.push((var.to_string(), PathBuf::from(value.trim())));
            }
        }

        if let Some(dir) = read_sdk_dir(&self.project_root.join("local.properties")) {
            candidates.push(("local.properties".to_string(), dir));
        }

        for dir in &self.default_sdk_dirs {
            candidates.push(("default location".to_string(), dir.clone()));
        }

        candidates
    }

    /// Newest `build-tools/<version>` directory of the resolved SDK.
    pub fn build_tools_dir(&self) -> Option<PathBuf> {
        let build_tools = self.sdk_root()?.join("build-tools");
        let entries = std::fs::read_dir(&build_tools).ok()?;

        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                Some((parse_version(&name)?, e.path()))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, path)| path)
    }

    /// Finds `tool`, returning [`Error::ToolNotFound`] with an install hint if absent.
    pub fn find(&self, tool: Tool) -> Result<PathBuf> {
        if let Some(path) = self.cache.tool(tool) {
            return Ok(path);
        }

        let found = match tool {
            Tool::Zipalign | Tool::Apksigner | Tool::Aapt2 => self
                .build_tools_dir()
                .map(|dir| dir.join(tool.executable()))
                .filter(|p| p.is_file()),
            Tool::Jarsigner => self
                .env
                .get("JAVA_HOME")
                .map(|home| Path::new(home).join("bin").join(tool.executable()))
                .filter(|p| p.is_file())
                .or_else(|| self.which("jarsigner")),
            Tool::Gradle => Some(self.project_root.join(tool.executable()))
                .filter(|p| p.is_file())
                .or_else(|| self.which("gradle")),
            Tool::Xcrun => self.which("xcrun"),
        };

        match found {
            Some(path) => {
                log::debug!("Found {} at: {}", tool, path.display());
                self.cache.remember_tool(tool, path.clone());
                Ok(path)
            }
            None => {
                log::debug!("{} not found", tool);
                Err(Error::ToolNotFound {
                    tool: tool.to_string(),
                    hint: tool.install_hint().to_string(),
                })
            }
        }
    }

    fn which(&self, name: &str) -> Option<PathBuf> {
        if !self.search_path {
            return None;
        }
        which::which(name).ok()
    }
}

/// Reads `sdk.dir` from a `local.properties` file.
///
/// Properties files escape `:` and `\`, which matters for Windows paths.
pub fn read_sdk_dir(path: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#') && !l.starts_with('!'))
        .find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "sdk.dir").then(|| value.trim())
        })
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(v.replace("\\:", ":").replace("\\\\", "\\")))
}

/// Parses a build-tools directory name such as `34.0.0` or `35.0.0-rc1`.
fn parse_version(name: &str) -> Option<Vec<u64>> {
    let base = name.split('-').next()?;
    let parts: Option<Vec<u64>> = base.split('.').map(|p| p.parse().ok()).collect();
    parts.filter(|p| !p.is_empty())
}

fn default_sdk_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs_out.push(home.join("Android").join("Sdk"));
        dirs_out.push(home.join("Library").join("Android").join("sdk"));
    }
    if let Some(local) = dirs::data_local_dir() {
        dirs_out.push(local.join("Android").join("Sdk"));
    }
    dirs_out.push(PathBuf::from("/opt/android-sdk"));
    dirs_out.push(PathBuf::from("/usr/lib/android-sdk"));
    dirs_out
}
