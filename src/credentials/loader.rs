//! Config file loading
//!
//! Looks for `credentials.json` in an ordered list of directories and keeps
//! the first one that parses. The result is cached per loader.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::types::ConfigFile;

/// File name looked up in every search directory
pub const CONFIG_FILE_NAME: &str = "credentials.json";

/// Project-local config directory, relative to the working directory
pub const PROJECT_CONFIG_DIR: &str = ".opsbench/config";

/// Loads and caches the credentials config file
#[derive(Debug)]
pub struct ConfigLoader {
    search_dirs: Vec<PathBuf>,
    cache: OnceLock<Arc<ConfigFile>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader over the project directory and the user config directory
    pub fn new() -> Self {
        Self::with_search_dirs(Self::default_search_dirs())
    }

    /// Loader over explicit directories, searched in order
    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            cache: OnceLock::new(),
        }
    }

    /// `<cwd>/.opsbench/config`, then `<user config dir>/opsbench`
    pub fn default_search_dirs() -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(2);
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd.join(PROJECT_CONFIG_DIR));
        }
        if let Some(config_dir) = dirs::config_dir() {
            dirs.push(config_dir.join("opsbench"));
        }
        dirs
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Parsed config, read from disk on the first call only
    pub fn load(&self) -> Arc<ConfigFile> {
        self.cache
            .get_or_init(|| Arc::new(self.read_first_valid()))
            .clone()
    }

    /// Forget the cached config so the next `load` reads from disk
    pub fn clear_cache(&mut self) {
        self.cache.take();
    }

    /// First existing config file, parseable or not
    pub fn config_path(&self) -> Option<PathBuf> {
        self.candidates().find(|path| path.is_file())
    }

    /// Resolve a file path relative to the search directories; directories never match
    pub fn resolve_relative(&self, relative: &str) -> Option<PathBuf> {
        if relative.is_empty() {
            return None;
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(relative))
            .find(|path| path.is_file())
    }

    fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.search_dirs.iter().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    fn read_first_valid(&self) -> ConfigFile {
        for path in self.candidates() {
            if !path.is_file() {
                continue;
            }
            match read_config(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded credentials config");
                    return config;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable credentials config");
                }
            }
        }
        debug!("No credentials config found, using empty config");
        ConfigFile::default()
    }
}

fn read_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_load_is_cached_until_cleared() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), r#"{"netlify": {"token": "first"}}"#);

        let mut loader = ConfigLoader::with_search_dirs(vec![tmp.path().to_path_buf()]);
        let first = loader.load();
        let second = loader.load();
        assert!(Arc::ptr_eq(&first, &second));

        // On-disk changes are invisible until the cache is cleared
        write_config(tmp.path(), r#"{"netlify": {"token": "second"}}"#);
        assert_eq!(
            loader.load().netlify.as_ref().unwrap().token.as_deref(),
            Some("first")
        );

        loader.clear_cache();
        let third = loader.load();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(
            third.netlify.as_ref().unwrap().token.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_malformed_candidate_is_skipped() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_config(project.path(), "{ not json");
        write_config(user.path(), r#"{"aws": {"region": "eu-west-2"}}"#);

        let loader = ConfigLoader::with_search_dirs(vec![
            project.path().to_path_buf(),
            user.path().to_path_buf(),
        ]);
        let config = loader.load();
        assert_eq!(
            config.aws.as_ref().unwrap().region.as_deref(),
            Some("eu-west-2")
        );

        // The debug path still reports the first file present
        assert_eq!(
            loader.config_path().unwrap(),
            project.path().join(CONFIG_FILE_NAME)
        );
    }

    #[test]
    fn test_missing_config_is_empty() {
        let tmp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_search_dirs(vec![tmp.path().join("absent")]);

        assert_eq!(*loader.load(), ConfigFile::default());
        assert!(loader.config_path().is_none());
    }

    #[test]
    fn test_resolve_relative_checks_dirs_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join("sa.json"), "{}").unwrap();

        let loader = ConfigLoader::with_search_dirs(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert_eq!(
            loader.resolve_relative("sa.json"),
            Some(second.path().join("sa.json"))
        );
        assert_eq!(loader.resolve_relative("missing.json"), None);
        assert_eq!(loader.resolve_relative(""), None);
    }

    #[test]
    fn test_resolve_relative_skips_directories() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::create_dir_all(first.path().join("sa.json")).unwrap();
        std::fs::write(second.path().join("sa.json"), "{}").unwrap();

        let loader = ConfigLoader::with_search_dirs(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert_eq!(
            loader.resolve_relative("sa.json"),
            Some(second.path().join("sa.json"))
        );

        // A bare search dir is not a file either
        assert_eq!(loader.resolve_relative("."), None);
    }
}
