use once_cell::sync::Lazy;
use regex::Regex;

use crate::Error;

/// A console-script entry point: the launcher name and the module and
/// attribute it invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub module: String,
    pub function: String,
}

impl Script {
    /// Parses an entry-point value like `foo.bar:main` or
    /// `foomod:main_bar [extra1,extra2]`, stripping the extras.
    ///
    /// <https://packaging.python.org/en/latest/specifications/entry-points/>
    pub fn from_value(name: &str, value: &str) -> Result<Self, Error> {
        static SCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(
                r"^(?P<module>[\w.-]+)\s*:\s*(?P<function>[\w.-]+)(?:\s*\[\s*(?:[^,\]]+,?\s*)+\])?\s*$",
            )
            .unwrap()
        });

        let captures = SCRIPT_REGEX
            .captures(value)
            .ok_or_else(|| Error::InvalidWheel(format!("invalid console script: '{value}'")))?;

        Ok(Self {
            name: name.to_string(),
            module: captures["module"].to_string(),
            function: captures["function"].to_string(),
        })
    }

    /// The leading attribute to import, for dotted functions:
    /// `mod:obj.method` imports `obj`.
    pub fn import_name(&self) -> &str {
        self.function
            .split_once('.')
            .map_or(self.function.as_str(), |(import_name, _)| import_name)
    }

    /// The launcher script placed in the bin directory: a tiny Python program
    /// that calls the entry point and exits with its return value.
    ///
    /// Mirrors the wrapper pip generates.
    pub fn launcher(&self, python: &std::path::Path) -> String {
        format!(
            r##"#!{python}
# -*- coding: utf-8 -*-
import re
import sys
from {module} import {import_name}
if __name__ == "__main__":
    sys.argv[0] = re.sub(r"(-script\.pyw|\.exe)?$", "", sys.argv[0])
    sys.exit({function}())
"##,
            python = python.display(),
            module = self.module,
            import_name = self.import_name(),
            function = self.function,
        )
    }
}

/// Parse the `[console_scripts]` section of an `entry_points.txt`.
pub(crate) fn console_scripts(ini_text: &str) -> Result<Vec<Script>, Error> {
    let mapping = configparser::ini::Ini::new_cs()
        .read(ini_text.to_string())
        .map_err(|err| Error::InvalidWheel(format!("entry_points.txt is invalid: {err}")))?;

    let Some(section) = mapping.get("console_scripts") else {
        return Ok(Vec::new());
    };

    let mut scripts = Vec::new();
    for (name, value) in section {
        match value {
            Some(value) => scripts.push(Script::from_value(name, value)?),
            None => {
                return Err(Error::InvalidWheel(format!(
                    "[console_scripts] key {name} must have a value"
                )));
            }
        }
    }
    // Ini parsing does not preserve order; make launcher generation
    // deterministic.
    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{console_scripts, Script};

    #[test]
    fn valid_values() {
        for value in ["foomod:main", "foo.bar:main_bar [bar,baz]", "cli:app.run"] {
            assert!(Script::from_value("script", value).is_ok(), "{value}");
        }
    }

    #[test]
    fn invalid_values() {
        for value in ["", ":weh", "foomod:main [bar", "no_function_part", "weh:"] {
            assert!(Script::from_value("script", value).is_err(), "{value}");
        }
    }

    #[test]
    fn extras_are_stripped() {
        let script = Script::from_value("flask", "flask.cli:main [dotenv]").unwrap();
        assert_eq!(script.module, "flask.cli");
        assert_eq!(script.function, "main");
    }

    #[test]
    fn dotted_function_import_name() {
        let script = Script::from_value("tool", "foomod:mod_bar.sub_foo.func_baz").unwrap();
        assert_eq!(script.function, "mod_bar.sub_foo.func_baz");
        assert_eq!(script.import_name(), "mod_bar");
    }

    #[test]
    fn launcher_contents() {
        let script = Script::from_value("tool", "mypkg.cli:main").unwrap();
        let launcher = script.launcher(Path::new("/usr/bin/python3"));
        assert!(launcher.starts_with("#!/usr/bin/python3\n"));
        assert!(launcher.contains("from mypkg.cli import main"));
        assert!(launcher.contains("sys.exit(main())"));
    }

    #[test]
    fn parse_entry_points() {
        let ini = "\
[console_scripts]
flask = flask.cli:main
tool = mypkg:run [extra]

[gui_scripts]
gui-tool = mypkg:gui
";
        let scripts = console_scripts(ini).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].name, "flask");
        assert_eq!(scripts[1].name, "tool");
    }

    #[test]
    fn no_console_scripts_section() {
        assert!(console_scripts("[gui_scripts]\nx = y:z\n").unwrap().is_empty());
    }
}
