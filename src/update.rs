use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, TemplateSource};
use crate::parameters::{self, ParameterSet};
use crate::stack::{self, Discovery, StackApi, Template, UpdateRequest};

/// Upper bound on each wait for the stack to become stable.
pub const STABLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load template from {path:?}: {source}")]
    TemplateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to validate template {0}: {1}")]
    ValidationError(String, stack::Error),

    #[error("Failed to describe stack {0:?}: {1}")]
    DescribeError(String, stack::Error),

    #[error("Stack {0:?} was not returned")]
    StackNotFound(String),

    #[error("Stack {0:?} matched {1} stacks")]
    AmbiguousStack(String, usize),

    #[error(transparent)]
    ParameterError(#[from] parameters::Error),

    #[error("Wait before update failed: {0}")]
    WaitBeforeError(stack::Error),

    #[error("Couldn't update stack {0:?}: {1}")]
    UpdateError(String, stack::Error),

    #[error("Wait after update failed: {0}")]
    WaitAfterError(stack::Error),
}

pub struct Updater<'a, A> {
    api: &'a A,
    config: &'a Config,
}

impl<'a, A: StackApi> Updater<'a, A> {
    pub fn new(api: &'a A, config: &'a Config) -> Self {
        return Self { api, config };
    }

    /// Resolves the template source into the template to send and what the
    /// remote side reports about its parameters and capabilities.
    pub async fn resolve(&self) -> Result<(Template, Discovery), Error> {
        match &self.config.template {
            TemplateSource::File(path) => {
                tracing::info!(template_file = %path.display(), "Validating template file");
                let body = match tokio::fs::read_to_string(path).await {
                    Ok(body) => body,
                    Err(source) => {
                        return Err(Error::TemplateRead {
                            path: path.clone(),
                            source,
                        })
                    }
                };

                let discovery = self
                    .api
                    .validate_template_body(&body)
                    .await
                    .map_err(|error| Error::ValidationError(path.display().to_string(), error))?;

                return Ok((Template::Body(body), discovery));
            }
            TemplateSource::Url(url) => {
                tracing::info!(template_url = %url, "Validating template URL");
                let discovery = self
                    .api
                    .validate_template_url(url)
                    .await
                    .map_err(|error| Error::ValidationError(url.clone(), error))?;

                return Ok((Template::Url(url.clone()), discovery));
            }
            TemplateSource::Previous => {
                let stack_id = &self.config.stack_id;
                tracing::info!(stack_id = %stack_id, "Reusing the previous template");
                let mut stacks = self
                    .api
                    .describe_stacks(stack_id)
                    .await
                    .map_err(|error| Error::DescribeError(stack_id.clone(), error))?;

                return match stacks.len() {
                    0 => Err(Error::StackNotFound(stack_id.clone())),
                    1 => Ok((Template::Previous, stacks.remove(0))),
                    count => Err(Error::AmbiguousStack(stack_id.clone(), count)),
                };
            }
        }
    }

    /// Builds the update request, failing on overrides the stack does not declare.
    pub async fn prepare(&self) -> Result<UpdateRequest, Error> {
        let (template, discovery) = self.resolve().await?;
        tracing::info!(
            parameters = discovery.parameter_keys.len(),
            capabilities = ?discovery.capabilities,
            "Discovered stack parameters"
        );

        let mut parameters = ParameterSet::keep_previous(discovery.parameter_keys);
        parameters.apply_overrides(&self.config.overrides)?;

        return Ok(UpdateRequest {
            stack_id: self.config.stack_id.clone(),
            capabilities: discovery.capabilities,
            parameters,
            template,
        });
    }

    pub async fn run(&self) -> Result<(), Error> {
        let request = self.prepare().await?;
        let stack_id = &self.config.stack_id;

        if self.config.wait_before {
            tracing::info!(stack_id = %stack_id, "Waiting for stack to be stable before updating");
            self.api
                .wait_until_stable(stack_id, STABLE_TIMEOUT)
                .await
                .map_err(Error::WaitBeforeError)?;
        }

        tracing::info!(
            stack_id = %stack_id,
            parameters = request.parameters.len(),
            "Updating stack"
        );
        if request.parameters.is_empty() {
            tracing::warn!(stack_id = %stack_id, "Stack declares no parameters");
        }
        self.api
            .update_stack(request)
            .await
            .map_err(|error| Error::UpdateError(stack_id.clone(), error))?;

        if self.config.wait_after {
            tracing::info!(stack_id = %stack_id, "Waiting for stack to be stable after update");
            self.api
                .wait_until_stable(stack_id, STABLE_TIMEOUT)
                .await
                .map_err(Error::WaitAfterError)?;
        }

        tracing::info!(stack_id = %stack_id, "Stack update finished");
        return Ok(());
    }
}
