use std::collections::BTreeMap;

use aws_sdk_cloudformation::types::Parameter;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Input parameter {0:?} is not known to the stack")]
    UnknownParameter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UsePrevious,
    Explicit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Key as declared by the template or the stack, case preserved.
    pub key: String,
    pub value: Value,
}

/// Parameters of an update, keyed by the upper-cased parameter key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: BTreeMap<String, Entry>,
}

impl ParameterSet {
    /// Seeds the set so that every declared key keeps its previous value.
    pub fn keep_previous<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = keys
            .into_iter()
            .map(|key| {
                let key: String = key.into();
                let entry = Entry {
                    key: key.clone(),
                    value: Value::UsePrevious,
                };
                (key.to_uppercase(), entry)
            })
            .collect();

        return Self { entries };
    }

    /// Replaces the previous value of each overridden key with the explicit one.
    ///
    /// Override keys are expected upper-cased. Nothing is changed when any
    /// of them is missing from the set.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(unknown) = overrides
            .keys()
            .find(|key| !self.entries.contains_key(key.as_str()))
        {
            return Err(Error::UnknownParameter(unknown.clone()));
        }

        for (key, value) in overrides {
            if let Some(entry) = self.entries.get_mut(key) {
                tracing::debug!(parameter = %entry.key, "Overriding parameter");
                entry.value = Value::Explicit(value.clone());
            }
        }

        return Ok(());
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Entry> {
        return self.entries.get(&key.to_uppercase());
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    pub fn to_sdk(&self) -> Vec<Parameter> {
        return self
            .entries
            .values()
            .map(|entry| match &entry.value {
                Value::UsePrevious => Parameter::builder()
                    .parameter_key(&entry.key)
                    .use_previous_value(true)
                    .build(),
                Value::Explicit(value) => Parameter::builder()
                    .parameter_key(&entry.key)
                    .use_previous_value(false)
                    .parameter_value(value)
                    .build(),
            })
            .collect();
    }
}
