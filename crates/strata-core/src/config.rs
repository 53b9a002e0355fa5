use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StrataError;

/// Top-level configuration loaded from `.strata.toml`.
///
/// Supports layered resolution: CLI flags > config file > defaults.
///
/// # Examples
///
/// ```
/// use strata_core::StrataConfig;
///
/// let config = StrataConfig::default();
/// assert_eq!(config.mining.branch, "master");
/// assert_eq!(config.mining.workers, 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Commit traversal and worker pool settings.
    #[serde(default)]
    pub mining: MiningConfig,
    /// Persistence settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Identity of the mined repository.
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Issue reference extraction from commit messages.
    #[serde(default)]
    pub issues: IssueConfig,
    /// File extension to language mapping.
    #[serde(default)]
    pub languages: LanguageMap,
}

impl StrataConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::FileNotFound`] if the file does not exist,
    /// [`StrataError::Io`] if it cannot be read, or [`StrataError::Toml`]
    /// if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use strata_core::StrataConfig;
    /// use std::path::Path;
    ///
    /// let config = StrataConfig::from_file(Path::new(".strata.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, StrataError> {
        if !path.exists() {
            return Err(StrataError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Toml`] if parsing fails, or
    /// [`StrataError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_core::StrataConfig;
    ///
    /// let toml = r#"
    /// [mining]
    /// branch = "main"
    /// workers = 4
    /// "#;
    /// let config = StrataConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.mining.branch, "main");
    /// assert_eq!(config.mining.workers, 4);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, StrataError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the miner cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), StrataError> {
        if self.mining.workers == 0 {
            return Err(StrataError::Config("mining.workers must be at least 1".into()));
        }
        if self.mining.queue_capacity == 0 {
            return Err(StrataError::Config(
                "mining.queue_capacity must be at least 1".into(),
            ));
        }
        if self.mining.branch.trim().is_empty() {
            return Err(StrataError::Config("mining.branch must not be empty".into()));
        }
        Ok(())
    }
}

/// Commit traversal settings.
///
/// # Examples
///
/// ```
/// use strata_core::MiningConfig;
///
/// let config = MiningConfig::default();
/// assert_eq!(config.queue_capacity, 64);
/// assert!(config.write_lines);
/// assert!(config.first_parent);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Branch to replay (default: `"master"`).
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Number of diff/parse workers (default: 1).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Commits allowed in flight between the queue and the writer (default: 64).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Persist one row per changed line (default: true).
    #[serde(default = "default_true")]
    pub write_lines: bool,
    /// Only walk the first-parent chain of the branch (default: true).
    #[serde(default = "default_true")]
    pub first_parent: bool,
    /// Skip merge commits when walking the full graph (default: true).
    #[serde(default = "default_true")]
    pub skip_merges: bool,
}

fn default_branch() -> String {
    "master".into()
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            write_lines: true,
            first_parent: true,
            skip_merges: true,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (default: `strata.db`).
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("strata.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Identity of the mined repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Unique repository name; defaults to the last component of its location.
    pub name: Option<String>,
}

/// Issue reference extraction settings.
///
/// # Examples
///
/// ```
/// use strata_core::IssueConfig;
///
/// assert_eq!(IssueConfig::default().pattern, "#([0-9]+)");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueConfig {
    /// Regex matched against commit messages. Capture group 1, when present,
    /// is the issue key; otherwise the whole match is.
    #[serde(default = "default_issue_pattern")]
    pub pattern: String,
}

fn default_issue_pattern() -> String {
    "#([0-9]+)".into()
}

impl Default for IssueConfig {
    fn default() -> Self {
        Self {
            pattern: default_issue_pattern(),
        }
    }
}

/// Mapping from file extension (without the dot) to language name.
///
/// Files whose extension is not mapped are still tracked, but their changed
/// lines are not persisted.
///
/// # Examples
///
/// ```
/// use strata_core::LanguageMap;
///
/// let map = LanguageMap::default();
/// assert_eq!(map.language_for("src/lib.rs"), Some("rust"));
/// assert_eq!(map.language_for("README"), None);
/// assert_eq!(map.language_for("logo.png"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageMap(BTreeMap<String, String>);

impl LanguageMap {
    /// Build a map from `(extension, language)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(ext, lang)| (ext.into(), lang.into()))
                .collect(),
        )
    }

    /// Language of `path`, looked up by the text after its last `.`.
    pub fn language_for(&self, path: &str) -> Option<&str> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() && !file_name[1..].contains('.') {
            // dotfiles like `.gitignore` have no extension
            return None;
        }
        self.0.get(ext).map(String::as_str)
    }

    /// Number of mapped extensions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no extension is mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LanguageMap {
    fn default() -> Self {
        Self::from_pairs([
            ("c", "c"),
            ("h", "c"),
            ("cc", "cpp"),
            ("cpp", "cpp"),
            ("hpp", "cpp"),
            ("cs", "csharp"),
            ("go", "go"),
            ("java", "java"),
            ("js", "javascript"),
            ("jsx", "javascript"),
            ("kt", "kotlin"),
            ("php", "php"),
            ("py", "python"),
            ("rb", "ruby"),
            ("rs", "rust"),
            ("scala", "scala"),
            ("swift", "swift"),
            ("ts", "typescript"),
            ("tsx", "typescript"),
        ])
    }
}
