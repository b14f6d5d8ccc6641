use serde::{Deserialize, Deserializer};
use std::{collections::BTreeMap, ffi::OsString, path::PathBuf};
use validator::Validate;

pub const INPUT_PREFIX: &str = "INPUT_";
pub const PARAMETER_PREFIX: &str = "PARAMETER-";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Bad environment variable: {0}")]
    MalformedVariable(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),
}

/// Raw action inputs, keyed by their name without the `INPUT_` prefix.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct Inputs {
    #[serde(rename = "TEMPLATE-FILE", deserialize_with = "non_empty")]
    template_file: Option<String>,

    #[serde(rename = "TEMPLATE-URL", deserialize_with = "non_empty")]
    #[validate(url)]
    template_url: Option<String>,

    #[serde(rename = "STACK-ID", deserialize_with = "non_empty")]
    #[validate(required, length(min = 1))]
    stack_id: Option<String>,

    #[serde(rename = "REGION", deserialize_with = "non_empty")]
    region: Option<String>,

    #[serde(rename = "WAIT-BEFORE", deserialize_with = "flag")]
    wait_before: bool,

    #[serde(rename = "WAIT-AFTER", deserialize_with = "flag")]
    wait_after: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    File(PathBuf),
    Url(String),
    Previous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub stack_id: String,
    pub region: Option<String>,
    pub template: TemplateSource,
    /// Parameter overrides keyed by the upper-cased parameter key.
    pub overrides: BTreeMap<String, String>,
    pub wait_before: bool,
    pub wait_after: bool,
}

pub fn from_env() -> Result<Config, Error> {
    return parse(std::env::vars_os());
}

pub fn parse<I>(vars: I) -> Result<Config, Error>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut raw = serde_json::Map::new();
    let mut overrides = BTreeMap::new();

    for (key, value) in vars {
        if !key.to_string_lossy().starts_with(INPUT_PREFIX) {
            continue;
        }

        let key = key
            .into_string()
            .map_err(|key| Error::MalformedVariable(key.to_string_lossy().into_owned()))?;
        let value = value
            .into_string()
            .map_err(|_| Error::MalformedVariable(key.clone()))?;

        let name = &key[INPUT_PREFIX.len()..];
        match name.strip_prefix(PARAMETER_PREFIX) {
            Some("") => return Err(Error::MalformedVariable(key.clone())),
            Some(parameter) => {
                overrides.insert(parameter.to_uppercase(), value);
            }
            None => {
                raw.insert(name.to_owned(), serde_json::Value::String(value));
            }
        }
    }

    let inputs: Inputs = match serde_json::from_value(serde_json::Value::Object(raw)) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    match inputs.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    let template = match (inputs.template_file, inputs.template_url) {
        (Some(file), url) => {
            if url.is_some() {
                tracing::warn!(
                    template_file = %file,
                    "Both a template file and a template URL were given, using the file"
                );
            }
            TemplateSource::File(PathBuf::from(file))
        }
        (None, Some(url)) => TemplateSource::Url(url),
        (None, None) => TemplateSource::Previous,
    };

    let stack_id = inputs
        .stack_id
        .ok_or_else(|| Error::ValidationError(String::from("stack_id: required")))?;

    return Ok(Config {
        stack_id,
        region: inputs.region,
        template,
        overrides,
        wait_before: inputs.wait_before,
        wait_after: inputs.wait_after,
    });
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.is_empty() {
        return Ok(None);
    }

    return Ok(Some(value));
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    return Ok(String::deserialize(deserializer)? == "true");
}
