//! Filename classification
//!
//! Maps a remote entry name to its [`Category`] from the token before the first
//! underscore, or rejects it. The category set and alias table are injected, so the
//! classifier needs neither network nor filesystem.
//!
//! Rejections are checked in a fixed order: missing token, unrecognized token,
//! numbered-duplicate suffix. A name is only accepted when none applies.

use crate::config::CategoriesConfig;
use crate::error::{Error, Result};
use crate::types::{Category, DownloadOutcome};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Why a name was not accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No underscore, or nothing before it
    Unknown,
    /// The (normalized) token is not a configured category
    UnrecognizedPrefix(String),
    /// Numbered duplicate such as `shutterstock_1 (2).zip`
    DuplicateSuffix,
}

impl Rejection {
    /// Outcome recorded for an entry rejected this way
    pub fn outcome(&self) -> DownloadOutcome {
        match self {
            Rejection::Unknown | Rejection::UnrecognizedPrefix(_) => {
                DownloadOutcome::SkippedUnrecognizedPrefix
            }
            Rejection::DuplicateSuffix => DownloadOutcome::SkippedDuplicateSuffix,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unknown => f.write_str("no prefix token"),
            Rejection::UnrecognizedPrefix(token) => write!(f, "unrecognized prefix {token:?}"),
            Rejection::DuplicateSuffix => f.write_str("numbered duplicate"),
        }
    }
}

/// Prefix-based classifier over a closed category set
#[derive(Clone, Debug)]
pub struct Classifier {
    categories: BTreeSet<Category>,
    aliases: HashMap<String, Category>,
    duplicate_suffix: Regex,
}

impl Classifier {
    /// Build a classifier from explicit parts.
    ///
    /// Category names and alias keys are matched case-insensitively.
    pub fn new<C, A>(categories: C, aliases: A, duplicate_pattern: &str) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        A: IntoIterator<Item = (String, String)>,
    {
        let duplicate_suffix = Regex::new(duplicate_pattern).map_err(|e| {
            Error::config(
                format!("invalid duplicate pattern: {e}"),
                "categories.duplicate_pattern",
            )
        })?;
        Ok(Self {
            categories: categories.into_iter().map(Category::new).collect(),
            aliases: aliases
                .into_iter()
                .map(|(alias, target)| (alias.to_lowercase(), Category::new(target)))
                .collect(),
            duplicate_suffix,
        })
    }

    /// Build the classifier described by the `[categories]` section
    pub fn from_config(config: &CategoriesConfig) -> Result<Self> {
        Self::new(
            config.known.iter().cloned(),
            config.aliases.clone(),
            &config.duplicate_pattern,
        )
    }

    /// Classify one entry name
    pub fn classify(&self, name: &str) -> std::result::Result<Category, Rejection> {
        let token = prefix_token(name).ok_or(Rejection::Unknown)?;
        let category = self
            .aliases
            .get(&token)
            .cloned()
            .unwrap_or_else(|| Category::new(token.as_str()));

        if !self.categories.contains(&category) {
            return Err(Rejection::UnrecognizedPrefix(token));
        }
        if self.duplicate_suffix.is_match(name) {
            return Err(Rejection::DuplicateSuffix);
        }
        Ok(category)
    }

    /// The configured category set
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }
}

/// Lower-cased run of characters before the first underscore
fn prefix_token(name: &str) -> Option<String> {
    let (token, _) = name.split_once('_')?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_lowercase())
    }
}
