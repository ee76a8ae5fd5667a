//! Invocation configuration: a JSON file, overridden by command-line flags.

use std::fs;
use std::path::Path;
use std::collections::HashSet;
use crate::{
    bootstrap::BootstrapStrategy,
    runner::RunOptions,
    target::CollectionTarget,
    model,
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// Where to connect when neither the file nor the flags say otherwise.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017/";

/// Everything one invocation needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// MongoDB connection string.
    pub uri: String,
    /// The target database. Required.
    pub database_name: String,
    /// Collections to migrate, in order. Defaults to every built-in target.
    pub collection_names: Vec<String>,
    /// Report without mutating.
    pub dry_run: bool,
    /// How missing collections are created.
    pub bootstrap: BootstrapStrategy,
    /// Append each run record to the ledger collection.
    pub ledger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            uri: String::from(DEFAULT_URI),
            database_name: String::new(),
            collection_names: model::builtin_names(),
            dry_run: false,
            bootstrap: BootstrapStrategy::default(),
            ledger: false,
        }
    }
}

/// Values given on the command line. `None`, `false` and empty mean
/// "keep what the file says".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces `uri`.
    pub uri: Option<String>,
    /// Replaces `databaseName`.
    pub database_name: Option<String>,
    /// Replaces `collectionNames` if non-empty.
    pub collection_names: Vec<String>,
    /// Forces `dryRun` on.
    pub dry_run: bool,
    /// Replaces `bootstrap`.
    pub bootstrap: Option<BootstrapStrategy>,
    /// Forces `ledger` on.
    pub ledger: bool,
}

impl Config {
    /// Reads a JSON configuration file. Absent keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .chain(|| format!("can't read config file {}", path.display()))?;

        serde_json::from_str(&text)
            .chain_kind(ErrorKind::Config, || format!("malformed config file {}", path.display()))
    }

    /// The file (or the defaults), with the overrides applied, validated.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let config = config.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(uri) = overrides.uri {
            self.uri = uri;
        }
        if let Some(database_name) = overrides.database_name {
            self.database_name = database_name;
        }
        if !overrides.collection_names.is_empty() {
            self.collection_names = overrides.collection_names;
        }
        if let Some(bootstrap) = overrides.bootstrap {
            self.bootstrap = bootstrap;
        }

        self.dry_run |= overrides.dry_run;
        self.ledger |= overrides.ledger;
        self
    }

    /// Checks the database name and that every collection is known, once.
    pub fn validate(&self) -> Result<()> {
        /// Characters MongoDB rejects in database names.
        const FORBIDDEN: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

        if self.database_name.is_empty() {
            return Err(Error::new(ErrorKind::Config, "no database name given"));
        }
        if self.database_name.contains(FORBIDDEN) {
            return Err(Error::new(
                ErrorKind::Config,
                format!("invalid database name `{}`", self.database_name)
            ));
        }
        if self.collection_names.is_empty() {
            return Err(Error::new(ErrorKind::Config, "no collections to migrate"));
        }

        let mut seen = HashSet::new();

        for name in &self.collection_names {
            if !seen.insert(name.as_str()) {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("collection `{}` listed twice", name)
                ));
            }
            model::target_by_name(name)?;
        }

        Ok(())
    }

    /// The targets of the configured collections, in configured order.
    pub fn targets(&self) -> Result<Vec<CollectionTarget>> {
        self.collection_names
            .iter()
            .map(|name| model::target_by_name(name))
            .collect()
    }

    /// Options for the runner.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            bootstrap: self.bootstrap,
            ledger: self.ledger,
        }
    }
}
