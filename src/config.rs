//! TOML configuration: sheet layout, evaluation options and answer keys.
//!
//! ```toml
//! [layout]
//! subjects = 5
//! questions_per_subject = 20
//!
//! [options]
//! fill_threshold = 0.05
//!
//! [keys.A]
//! subjects = [
//!     { name = "Python", answers = [0, 1, 2, 3] },
//! ]
//! ```
//!
//! Every table is optional and falls back to the defaults of
//! [`LayoutConfig`] and [`EvaluationOptions`].

use std::{path::Path, str::FromStr};

use serde::Deserialize;

use crate::{
    AnswerKeySet, ConfigError, ConfigurationError, EvaluationOptions, LayoutConfig,
    SheetEvaluator,
};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OmrConfig {
    pub layout: LayoutConfig,
    pub options: EvaluationOptions,
    pub keys: AnswerKeySet,
}

impl OmrConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("Loading config: {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Checks options and layout, and every key against the layout.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.options.validate()?;
        self.layout.validate()?;
        for version in self.keys.versions() {
            self.layout.check_key(self.keys.get(version)?)?;
        }
        Ok(())
    }

    pub fn into_evaluator(self) -> Result<SheetEvaluator, ConfigurationError> {
        SheetEvaluator::builder()
            .layout(self.layout)
            .options(self.options)
            .keys(self.keys)
            .build()
    }
}

impl FromStr for OmrConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        log::debug!(
            "Config has {} answer key(s), {} questions per sheet",
            config.keys.len(),
            config.layout.total_questions()
        );
        Ok(config)
    }
}
