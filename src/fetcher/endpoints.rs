//! Endpoint resolution
//!
//! Maps logical endpoint names to absolute URLs:
//!
//! - `localities`: paged locality search (`/localities/`)
//! - `locality_detail`: one locality (`/localities/{id}/`)
//! - `locality_minerals`: paged mineral list (`/localityminerals/`)
//!
//! Templates are relative to the base URL and use `{name}` placeholders.

use crate::config::{AppConfig, ConfigError, ConfigResult, EndpointTemplates};
use crate::LocalityId;
use std::collections::HashMap;

/// Locality search endpoint name
pub const LOCALITIES: &str = "localities";
/// Locality detail endpoint name
pub const LOCALITY_DETAIL: &str = "locality_detail";
/// Locality minerals endpoint name
pub const LOCALITY_MINERALS: &str = "locality_minerals";

/// Endpoint table bound to a base URL
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    base_url: String,
    templates: HashMap<String, String>,
}

impl Endpoints {
    /// Build from a base URL and named templates
    pub fn new<I, K, V>(base_url: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build from configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_templates(&config.base_url, &config.endpoints)
    }

    /// Build from a base URL and the three Mindat templates
    pub fn from_templates(base_url: &str, templates: &EndpointTemplates) -> Self {
        Self::new(
            base_url,
            [
                (LOCALITIES, templates.localities.as_str()),
                (LOCALITY_DETAIL, templates.locality_detail.as_str()),
                (LOCALITY_MINERALS, templates.locality_minerals.as_str()),
            ],
        )
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an endpoint name and path parameters into an absolute URL
    ///
    /// Extra parameters that the template does not reference are ignored.
    pub fn resolve(&self, name: &str, params: &[(&str, &str)]) -> ConfigResult<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEndpoint(name.to_string()))?;

        let path = substitute(name, template, params)?;
        if path.starts_with('/') {
            Ok(format!("{}{}", self.base_url, path))
        } else {
            Ok(format!("{}/{}", self.base_url, path))
        }
    }

    /// URL of the locality search endpoint
    pub fn localities_url(&self) -> ConfigResult<String> {
        self.resolve(LOCALITIES, &[])
    }

    /// URL of one locality's detail record
    pub fn locality_detail_url(&self, id: &LocalityId) -> ConfigResult<String> {
        let id = id.to_string();
        self.resolve(LOCALITY_DETAIL, &[("id", id.as_str())])
    }

    /// URL of the locality minerals endpoint
    pub fn locality_minerals_url(&self) -> ConfigResult<String> {
        self.resolve(LOCALITY_MINERALS, &[])
    }
}

fn substitute(name: &str, template: &str, params: &[(&str, &str)]) -> ConfigResult<String> {
    let invalid = || ConfigError::InvalidTemplate {
        endpoint: name.to_string(),
        template: template.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(invalid());
        }
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(invalid)?;
        let key = &after[..close];
        if key.is_empty() || key.contains('{') {
            return Err(invalid());
        }
        let value = params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| ConfigError::MissingPathParameter {
                endpoint: name.to_string(),
                parameter: key.to_string(),
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
