//! The runtime control surface.
//!
//! A process wide registry maps variable names to typed setter/getter pairs
//! over shared cells. The HTTP control endpoints and the `key: value` config
//! file both go through this registry, so everything that is configurable at
//! startup is also adjustable at runtime.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{error, info};

pub type SetFn = Box<dyn Fn(&[String]) -> Result<(), ControlError> + Send + Sync>;
pub type GetFn = Box<dyn Fn() -> String + Send + Sync>;

struct Variable {
    set: SetFn,
    get: GetFn,
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("not a valid boolean value")]
    InvalidBool,
    #[error("not a valid integer value: {value}")]
    InvalidInt { value: String },
    #[error("{message}")]
    InvalidValue { message: String },
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },
    #[error("missing value")]
    MissingValue,
}

/// Name to accessor registry. Iteration order is the dump order, so the map
/// is kept sorted.
#[derive(Default)]
pub struct ControlRegistry {
    vars: BTreeMap<String, Variable>,
}

fn parse_bool(value: &str) -> Result<bool, ControlError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ControlError::InvalidBool),
    }
}

impl ControlRegistry {
    pub fn add_variable(&mut self, name: &str, set: SetFn, get: GetFn) {
        self.vars.insert(name.to_string(), Variable { set, get });
    }

    pub fn add_bool(&mut self, name: &str, cell: &Arc<AtomicBool>) {
        let set_cell = cell.clone();
        let get_cell = cell.clone();
        self.add_variable(
            name,
            Box::new(move |args| {
                let value = args.first().ok_or(ControlError::MissingValue)?;
                set_cell.store(parse_bool(value)?, Ordering::Relaxed);
                Ok(())
            }),
            Box::new(move || {
                if get_cell.load(Ordering::Relaxed) {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }),
        );
    }

    pub fn add_int(&mut self, name: &str, cell: &Arc<AtomicI64>) {
        let set_cell = cell.clone();
        let get_cell = cell.clone();
        self.add_variable(
            name,
            Box::new(move |args| {
                let value = args.first().ok_or(ControlError::MissingValue)?;
                let parsed = value.parse::<i64>().map_err(|_| ControlError::InvalidInt {
                    value: value.clone(),
                })?;
                set_cell.store(parsed, Ordering::Relaxed);
                Ok(())
            }),
            Box::new(move || get_cell.load(Ordering::Relaxed).to_string()),
        );
    }

    pub fn add_string(&mut self, name: &str, cell: &Arc<RwLock<String>>) {
        let set_cell = cell.clone();
        let get_cell = cell.clone();
        self.add_variable(
            name,
            Box::new(move |args| {
                let value = args.first().ok_or(ControlError::MissingValue)?;
                *set_cell.write().expect("it should lock the variable cell") = value.clone();
                Ok(())
            }),
            Box::new(move || get_cell.read().expect("it should lock the variable cell").clone()),
        );
    }

    /// Sets one variable.
    ///
    /// # Errors
    ///
    /// Fails on unknown names and unparsable values.
    pub fn set(&self, name: &str, args: &[String]) -> Result<(), ControlError> {
        match self.vars.get(name) {
            Some(variable) => (variable.set)(args),
            None => Err(ControlError::UnknownVariable { name: name.to_string() }),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(|variable| (variable.get)())
    }

    /// Applies a batch of query-parameter assignments. Known variables are
    /// applied as they are encountered; any unknown name or bad value makes
    /// the whole request report failure.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. Assignments applied before it
    /// stay applied.
    pub fn apply(&self, assignments: &[(String, Vec<String>)]) -> Result<usize, ControlError> {
        let mut applied = 0;
        let mut first_error = None;

        for (name, values) in assignments {
            match self.set(name, values) {
                Ok(()) => applied += 1,
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(applied),
        }
    }

    /// All variables with their current values, sorted by name.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, variable) in &self.vars {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&(variable.get)());
            out.push('\n');
        }
        out
    }

    /// Reads a `key: value` config file. Lines starting with `#` and blank
    /// lines are skipped; a `#` inside a line starts a trailing comment.
    /// Problems are logged per line; the return value says whether the whole
    /// file applied cleanly.
    pub fn read_file(&self, path: &Path) -> bool {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(io_error) => {
                error!("{}: {}", path.display(), io_error);
                return false;
            }
        };

        let mut errors = 0;

        for (line_number, raw_line) in contents.lines().enumerate() {
            let line_number = line_number + 1;

            let line = match raw_line.find('#') {
                Some(position) => &raw_line[..position],
                None => raw_line,
            };
            if line.trim().is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                error!("{}:{}: Missing value in '{}'", path.display(), line_number, raw_line);
                errors += 1;
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                error!("{}:{}: Missing value in '{}'", path.display(), line_number, raw_line);
                errors += 1;
                continue;
            }

            match self.set(key, &[value.to_string()]) {
                Ok(()) => info!("{}: {}", key, value),
                Err(control_error) => {
                    error!("{}:{}: {}: '{}' for '{}'", path.display(), line_number, control_error, value, key);
                    errors += 1;
                }
            }
        }

        errors == 0
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, RwLock};

    use super::{ControlError, ControlRegistry};

    fn registry() -> (ControlRegistry, Arc<AtomicBool>, Arc<AtomicI64>, Arc<RwLock<String>>) {
        let mut registry = ControlRegistry::default();
        let flag = Arc::new(AtomicBool::new(true));
        let number = Arc::new(AtomicI64::new(50));
        let text = Arc::new(RwLock::new("sekret".to_string()));
        registry.add_bool("enforce_auth_token", &flag);
        registry.add_int("max_handouts_per_interval", &number);
        registry.add_string("secret_auth_token", &text);
        (registry, flag, number, text)
    }

    #[test]
    fn booleans_accept_the_four_literal_forms() {
        let (registry, flag, _, _) = registry();

        for (raw, expected) in [("false", false), ("1", true), ("0", false), ("true", true)] {
            registry.set("enforce_auth_token", &[raw.to_string()]).unwrap();
            assert_eq!(flag.load(Ordering::Relaxed), expected);
        }

        assert!(matches!(
            registry.set("enforce_auth_token", &["yes".to_string()]),
            Err(ControlError::InvalidBool)
        ));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let (registry, _, _, _) = registry();

        assert!(matches!(
            registry.set("no_such_variable", &["1".to_string()]),
            Err(ControlError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn the_dump_is_sorted_and_shows_current_values() {
        let (registry, _, number, _) = registry();
        number.store(75, Ordering::Relaxed);

        let dump = registry.dump();

        assert_eq!(
            dump,
            "enforce_auth_token: true\nmax_handouts_per_interval: 75\nsecret_auth_token: sekret\n"
        );
    }

    #[test]
    fn apply_reports_failure_but_keeps_earlier_assignments() {
        let (registry, flag, _, _) = registry();

        let result = registry.apply(&[
            ("enforce_auth_token".to_string(), vec!["false".to_string()]),
            ("bogus".to_string(), vec!["1".to_string()]),
        ]);

        assert!(result.is_err());
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn config_files_apply_values_and_skip_comments() {
        let (registry, flag, number, text) = registry();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# tracker settings").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "enforce_auth_token: false").unwrap();
        writeln!(file, "max_handouts_per_interval: 25 # lower for testing").unwrap();
        writeln!(file, "secret_auth_token: hunter2").unwrap();

        assert!(registry.read_file(file.path()));
        assert!(!flag.load(Ordering::Relaxed));
        assert_eq!(number.load(Ordering::Relaxed), 25);
        assert_eq!(*text.read().unwrap(), "hunter2");
    }

    #[test]
    fn config_files_with_unknown_keys_or_missing_values_report_failure() {
        let (registry, _, number, _) = registry();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_handouts_per_interval: 30").unwrap();
        writeln!(file, "unknown_key: 1").unwrap();
        writeln!(file, "max_handouts_per_interval:").unwrap();

        assert!(!registry.read_file(file.path()));
        // valid lines still applied
        assert_eq!(number.load(Ordering::Relaxed), 30);
    }
}
