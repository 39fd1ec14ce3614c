//! Test configuration written as a real TOML file inside a temp directory

use std::path::{Path, PathBuf};
use stockfetch::Config;
use tempfile::TempDir;

/// A workspace with its own configuration file
pub struct TestWorkspace {
    /// Keeps the directory alive for the test's duration
    pub dir: TempDir,
    /// Path of the written `stockfetch.toml`
    pub config_path: PathBuf,
}

impl TestWorkspace {
    /// Write a configuration whose storage and ledger paths all live in a temp dir.
    ///
    /// `extra` is appended verbatim, for `[notification.*]` sections and the like.
    pub fn new(auto_extract: &[&str], extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().display().to_string().replace('\\', "/");
        let auto_extract = auto_extract
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let text = format!(
            r#"
[transfer]
host = "127.0.0.1"
remote_dir = "/drops"

[download]
concurrency = 3

[categories]
known = ["shutterstock", "depositphoto", "fotolia", "dreamstime"]
auto_extract = [{auto_extract}]

[categories.aliases]
adobestock = "fotolia"

[storage]
shutterstock = "{root}/downloads/shutterstock"
depositphoto = "{root}/downloads/depositphoto"
fotolia = "{root}/downloads/fotolia"
dreamstime = "{root}/downloads/dreamstime"

[ledger]
default = "{root}/ledger/run.log"
shutterstock = "{root}/ledger/shutterstock.txt"
depositphoto = "{root}/ledger/depositphoto.txt"
fotolia = "{root}/ledger/fotolia.txt"
dreamstime = "{root}/ledger/dreamstime.txt"

[retry]
max_attempts = 0
initial_delay = 0
max_delay = 0
jitter = false
{extra}
"#
        );
        let config_path = dir.path().join("stockfetch.toml");
        std::fs::write(&config_path, text).unwrap();
        Self { dir, config_path }
    }

    /// Load and validate the written configuration
    pub fn config(&self) -> Config {
        let (config, warnings) = Config::load(&self.config_path).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        config
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Destination file of `name` in `category`
    pub fn downloaded(&self, category: &str, name: &str) -> PathBuf {
        self.root().join("downloads").join(category).join(name)
    }

    /// Ledger file of `category`
    pub fn ledger(&self, category: &str) -> PathBuf {
        self.root().join("ledger").join(format!("{category}.txt"))
    }

    /// Ledger lines of `category`, empty when the file does not exist
    pub fn ledger_lines(&self, category: &str) -> Vec<String> {
        std::fs::read_to_string(self.ledger(category))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Pre-populate the ledger of `category`
    pub fn seed_ledger(&self, category: &str, names: &[&str]) {
        let path = self.ledger(category);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let text: String = names.iter().map(|n| format!("{n}\n")).collect();
        std::fs::write(path, text).unwrap();
    }
}
