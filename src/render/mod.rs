//! Role templates to desired configuration text.

pub mod strict;
pub mod trim;

use serde_json::Value;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::context::{build_context, RenderContext};
use crate::data::FabricData;
use crate::error::{Error, Result};
use crate::models::{ConfigText, DeviceRecord};

pub use trim::trim_block_whitespace;

/// A rendered configuration and the artifact it was persisted to
#[derive(Debug, Clone)]
pub struct RenderedConfig {
    pub hostname: String,
    pub config: ConfigText,
    pub path: PathBuf,
}

/// TemplateRenderer owns the parsed template set and the desired-config store
pub struct TemplateRenderer {
    tera: Tera,
    platform: String,
    template_ext: String,
    store: ArtifactStore,
}

impl TemplateRenderer {
    /// Load every file under the templates directory, keyed by its path
    /// relative to that directory (always `/`-separated)
    pub fn load(config: &Config) -> Result<Self> {
        let mut templates = Vec::new();
        collect_templates(&config.templates_dir, &config.templates_dir, &mut templates)?;
        templates.sort();
        tracing::debug!(
            "Loaded {} templates from {}",
            templates.len(),
            config.templates_dir.display()
        );

        Self::from_templates(
            templates,
            &config.platform,
            &config.template_ext,
            ArtifactStore::desired(&config.build_dir),
        )
    }

    pub fn from_templates(
        templates: Vec<(String, String)>,
        platform: &str,
        template_ext: &str,
        store: ArtifactStore,
    ) -> Result<Self> {
        let prepared: Vec<(String, String)> = templates
            .into_iter()
            .map(|(name, source)| {
                let source = trim_block_whitespace(&source);
                (name, source)
            })
            .collect();

        let mut tera = Tera::default();
        tera.add_raw_templates(prepared).map_err(|e| Error::Template {
            name: "template set".to_string(),
            message: error_chain(&e),
        })?;

        Ok(Self {
            tera,
            platform: platform.to_string(),
            template_ext: template_ext.to_string(),
            store,
        })
    }

    /// Lookup key of the template for a device role, e.g. `nxos/leaf.j2`
    pub fn template_name(&self, role: &str) -> String {
        format!("{}/{}.{}", self.platform, role, self.template_ext)
    }

    /// Render the role template against `context` without persisting anything
    pub fn render_text(&self, role: &str, context: &RenderContext) -> Result<ConfigText> {
        let name = self.template_name(role);
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(Error::not_found("template", &name));
        }

        if let Some(variable) = strict::undefined_condition_variable(&self.tera, &name, context) {
            return Err(Error::UndefinedVariable {
                device: context.hostname().to_string(),
                variable,
            });
        }

        let tera_ctx = Context::from_value(Value::Object(context.values().clone())).map_err(|e| {
            Error::Template {
                name: name.clone(),
                message: error_chain(&e),
            }
        })?;

        let output = self
            .tera
            .render(&name, &tera_ctx)
            .map_err(|e| render_error(&name, context.hostname(), &e))?;

        Ok(ConfigText::from_text(&output))
    }

    /// Render the role template and replace the device's desired-config artifact
    pub fn render(&self, role: &str, context: &RenderContext) -> Result<RenderedConfig> {
        let config = self.render_text(role, context)?;
        let path = self.store.write(context.hostname(), &config)?;
        tracing::info!(
            "Rendered {} ({} lines, {} VLANs) with {}",
            context.hostname(),
            config.len(),
            context.vlans().len(),
            self.template_name(role)
        );

        Ok(RenderedConfig {
            hostname: context.hostname().to_string(),
            config,
            path,
        })
    }

    /// Build the device's context from the loaded data and render it
    pub fn render_device(&self, data: &FabricData, device: &DeviceRecord) -> Result<RenderedConfig> {
        let context = build_context(device, &data.fabric, &data.vlans)?;
        self.render(&device.role, &context)
    }
}

fn collect_templates(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_templates(root, &path, out)?;
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let source = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        out.push((name, source));
    }
    Ok(())
}

/// Full message of a Tera error including its causes
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Undefined variables get their own error naming the variable; everything
/// else is reported as a template failure
fn render_error(name: &str, hostname: &str, err: &tera::Error) -> Error {
    let message = error_chain(err);
    if let Some(variable) = undefined_variable(&message) {
        return Error::UndefinedVariable {
            device: hostname.to_string(),
            variable,
        };
    }
    Error::Template {
        name: name.to_string(),
        message,
    }
}

fn undefined_variable(message: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r"Variable `([^`]+)` not found in context").ok()?;
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
