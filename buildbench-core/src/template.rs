//! Source Template Expansion
//!
//! Benchmark sources are Jinja templates rendered once per input size. The
//! only parameter in scope is `input_size`:
//!
//! ```text
//! #include <boost/hana.hpp>
//! {% for i in range(input_size) %}
//! struct x{{ i }} { };
//! {%- endfor %}
//! ```
//!
//! Undefined values are strict, so a typo such as `{{ input_sise }}` fails the
//! run before anything is built instead of silently rendering an empty string.

use minijinja::{Environment, ErrorKind, UndefinedBehavior, context};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or rendering a template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template file could not be read
    #[error("Failed to read template {path}: {source}")]
    Io {
        /// Template file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Template does not parse
    #[error("Malformed template '{name}': {message}")]
    Malformed {
        /// Template name
        name: String,
        /// Parser message with line
        message: String,
    },

    /// Template uses a name other than `input_size`
    #[error("Template '{name}' references an unknown parameter: {message}")]
    UnknownParameter {
        /// Template name
        name: String,
        /// Renderer message with line
        message: String,
    },

    /// Any other rendering failure
    #[error("Failed to render template '{name}': {message}")]
    Render {
        /// Template name
        name: String,
        /// Renderer message with line
        message: String,
    },
}

/// Compiled template that renders source code for a given input size
#[derive(Debug)]
pub struct TemplateExpander {
    name: String,
    env: Environment<'static>,
}

impl TemplateExpander {
    /// Compile `source` under `name`.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self, TemplateError> {
        let name = name.into();
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template_owned(name.clone(), source.into())
            .map_err(|e| TemplateError::Malformed {
                name: name.clone(),
                message: describe(&e),
            })?;

        Ok(Self { name, env })
    }

    /// Load and compile a template file. The file path becomes the template name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(path.display().to_string(), source)
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template with `input_size` bound to `input_size`.
    pub fn expand(&self, input_size: u64) -> Result<String, TemplateError> {
        let template = self
            .env
            .get_template(&self.name)
            .map_err(|e| self.classify(e))?;
        template
            .render(context! { input_size => input_size })
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, err: minijinja::Error) -> TemplateError {
        let name = self.name.clone();
        let message = describe(&err);
        match err.kind() {
            ErrorKind::UndefinedError | ErrorKind::UnknownFunction | ErrorKind::UnknownFilter => {
                TemplateError::UnknownParameter { name, message }
            }
            ErrorKind::SyntaxError | ErrorKind::TemplateNotFound => {
                TemplateError::Malformed { name, message }
            }
            _ => TemplateError::Render { name, message },
        }
    }
}

fn describe(err: &minijinja::Error) -> String {
    match err.line() {
        Some(line) => format!("{} (line {})", err, line),
        None => err.to_string(),
    }
}
