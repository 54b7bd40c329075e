use super::LogError;
use log::LevelFilter;
use log4rs::config::Logger;
use std::{collections::BTreeMap, env};

/// Per-target level overrides plus the root level, parsed from
/// expressions such as `info` or `info,pool_stratum=debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub root: LevelFilter,
    pub targets: BTreeMap<String, LevelFilter>,
}

impl Default for Filters {
    fn default() -> Self {
        Self { root: LevelFilter::Info, targets: BTreeMap::new() }
    }
}

impl Filters {
    /// Applies the expression held by the environment variable `var`, if any.
    pub fn with_env(mut self, var: &str) -> Self {
        if let Ok(expression) = env::var(var) {
            self.apply(&expression);
        }
        self
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.apply(expression);
        self
    }

    fn apply(&mut self, expression: &str) {
        for spec in expression.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match parse_spec(spec) {
                Ok((None, level)) => self.root = level,
                Ok((Some(target), level)) => {
                    self.targets.insert(target.to_string(), level);
                }
                Err(err) => println!("Ignoring invalid logging spec: {}", err),
            }
        }
    }

    pub(super) fn loggers(&self, appenders: &[&'static str]) -> Vec<Logger> {
        self.targets
            .iter()
            .map(|(target, level)| {
                Logger::builder().appenders(appenders.iter().map(|x| x.to_string())).additive(false).build(target.clone(), *level)
            })
            .collect()
    }
}

fn parse_spec(spec: &str) -> Result<(Option<&str>, LevelFilter), LogError> {
    let mut parts = spec.split('=');
    match (parts.next().map(str::trim), parts.next().map(str::trim), parts.next()) {
        (Some(single), None, None) => match single.parse() {
            Ok(level) => Ok((None, level)),
            // a bare target name enables everything for it
            Err(_) => Ok((Some(single), LevelFilter::max())),
        },
        (Some(target), Some(""), None) => Ok((Some(target), LevelFilter::max())),
        (Some(target), Some(level), None) => {
            level.parse().map(|level| (Some(target), level)).map_err(|_| LogError::ParseLoggerSpec(spec.to_string()))
        }
        _ => Err(LogError::ParseLoggerSpec(spec.to_string())),
    }
}
