//! Source-annotated display for `nexus config show`.

use std::fmt::{self, Write as _};

use crate::merge::FieldSources;
use crate::types::Config;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
}

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with inline comments showing source.
    Toml,
    /// JSON (for programmatic consumption).
    Json,
}

impl ResolvedConfig {
    /// Render the resolved config, optionally restricted to one section.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or `section` does not exist.
    pub fn show(&self, format: ShowFormat, section: Option<&str>) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(section),
            ShowFormat::Json => self.show_json(section),
        }
    }

    fn show_toml(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let value = toml::Value::try_from(&self.config).map_err(|_| fmt::Error)?;
        let rendered = match section {
            Some(name) => {
                let section_val = value.get(name).ok_or(fmt::Error)?;
                let mut wrapper = toml::map::Map::new();
                wrapper.insert(name.to_owned(), section_val.clone());
                toml::to_string_pretty(&wrapper).map_err(|_| fmt::Error)?
            },
            None => toml::to_string_pretty(&value).map_err(|_| fmt::Error)?,
        };

        let mut output = String::new();
        output.push_str("# Resolved Nexus configuration\n");
        output.push_str("# Source annotations: [defaults] [user] [file] [env]\n");
        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        let mut current_section = String::new();
        for line in rendered.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                header.clone_into(&mut current_section);
                writeln!(output, "{line}")?;
                continue;
            }

            match self.annotation_for(&current_section, trimmed) {
                Some(tag) => writeln!(output, "{line}  # [{tag}]")?,
                None => writeln!(output, "{line}")?,
            }
        }

        Ok(output)
    }

    fn show_json(&self, section: Option<&str>) -> Result<String, fmt::Error> {
        let value = serde_json::to_value(&self.config).map_err(|_| fmt::Error)?;
        let value = match section {
            Some(name) => value.get(name).cloned().ok_or(fmt::Error)?,
            None => value,
        };
        serde_json::to_string_pretty(&value).map_err(|_| fmt::Error)
    }

    fn annotation_for(&self, section: &str, line: &str) -> Option<&'static str> {
        let (key, _) = line.split_once('=')?;
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') {
            return None;
        }
        let path = if section.is_empty() {
            key.to_owned()
        } else {
            format!("{section}.{key}")
        };
        self.field_sources.get(&path).map(|layer| layer.tag())
    }
}
