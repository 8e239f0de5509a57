//! Manifest validation against the host's addon compatibility contract.
//!
//! A document is an addon manifest only if, in this order:
//! 1. it is a JSON object,
//! 2. its API field equals the supported version exactly,
//! 3. its `keywords` contain the marker keyword,
//! 4. `name`, `version`, `author` and `homepage` are non-empty,
//! 5. `addon_type` names a known slot.

use {
    jsaddons_config::CompatibilityConfig,
    serde::Deserialize,
    serde_json::Value,
};

use crate::{
    error::ValidationError,
    types::{AddonManifest, DEFAULT_ENTRY_POINT, SlotType},
};

/// Wire shape of `package.json` / registry "latest" documents. Everything is
/// optional here so that missing fields surface as the specific validation
/// error instead of a deserialization failure.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default, alias = "apiVersion")]
    ankidroid_js_api: Option<String>,
    #[serde(default, alias = "addonType")]
    addon_type: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default, alias = "entryPoint")]
    main: Option<String>,
    #[serde(default)]
    dist: Option<RawDist>,
}

/// npm accepts `"author": "Jane"` as well as `"author": {"name": "Jane", ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Name(String),
    Person {
        #[serde(default)]
        name: String,
    },
}

impl RawAuthor {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Person { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDist {
    #[serde(default)]
    tarball: Option<String>,
}

/// Pure validator; holds only the configured contract constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestValidator {
    api_version: String,
    keyword: String,
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::from_config(&CompatibilityConfig::default())
    }
}

impl ManifestValidator {
    pub fn new(api_version: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            keyword: keyword.into(),
        }
    }

    pub fn from_config(config: &CompatibilityConfig) -> Self {
        Self::new(config.api_version.clone(), config.keyword.clone())
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Parse and validate raw manifest text.
    pub fn validate_str(&self, document: &str) -> Result<AddonManifest, ValidationError> {
        let value: Value = serde_json::from_str(document)
            .map_err(|e| ValidationError::MalformedManifest(e.to_string()))?;
        self.validate(&value)
    }

    /// Validate an already-parsed manifest document.
    pub fn validate(&self, document: &Value) -> Result<AddonManifest, ValidationError> {
        if !document.is_object() {
            return Err(ValidationError::MalformedManifest(format!(
                "expected an object, found {}",
                json_kind(document)
            )));
        }
        let raw = RawManifest::deserialize(document)
            .map_err(|e| ValidationError::MalformedManifest(e.to_string()))?;

        if raw.ankidroid_js_api.as_deref() != Some(self.api_version.as_str()) {
            return Err(ValidationError::IncompatibleApiVersion {
                expected: self.api_version.clone(),
                found: raw.ankidroid_js_api,
            });
        }

        let keywords = raw.keywords.unwrap_or_default();
        if !keywords.iter().any(|k| *k == self.keyword) {
            return Err(ValidationError::NotAnAddonPackage(self.keyword.clone()));
        }

        let name = required("name", raw.name)?;
        let version = required("version", raw.version)?;
        let author = required("author", raw.author.map(RawAuthor::into_name))?;
        let homepage = required("homepage", raw.homepage)?;

        let addon_type = match raw.addon_type.as_deref() {
            Some("reviewer") => SlotType::Reviewer,
            Some("note_editor") => SlotType::NoteEditor,
            other => {
                return Err(ValidationError::UnknownAddonType(
                    other.map(ToOwned::to_owned),
                ));
            },
        };

        let entry_point = raw
            .main
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());

        let dist_archive_url = raw
            .dist
            .and_then(|d| d.tarball)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(AddonManifest {
            name,
            version,
            author,
            homepage,
            api_version: self.api_version.clone(),
            addon_type,
            keywords,
            entry_point,
            dist_archive_url,
        })
    }

    /// Validate a registry "latest version" document, which must also carry
    /// the archive URL.
    pub fn validate_registry_document(
        &self,
        document: &Value,
    ) -> Result<AddonManifest, ValidationError> {
        let manifest = self.validate(document)?;
        if manifest.dist_archive_url.is_none() {
            return Err(ValidationError::MissingArchiveUrl);
        }
        Ok(manifest)
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::IncompleteManifest(field))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
