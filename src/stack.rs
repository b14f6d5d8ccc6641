use std::fmt::Debug;
use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_cloudformation::client::Waiters;
use aws_sdk_cloudformation::error::{DisplayErrorContext, SdkError};
use aws_sdk_cloudformation::operation::update_stack::builders::UpdateStackFluentBuilder;
use aws_sdk_cloudformation::types::Capability;
use aws_types::region::Region;
use aws_types::SdkConfig;
use futures::future::{BoxFuture, FutureExt};

use crate::parameters::ParameterSet;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Couldn't configure aws: {0}")]
    ConfigurationError(String),

    #[error("Service error ocurred: {0}")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}")]
    UnknownError(String),

    #[error("Stack did not become stable: {0}")]
    WaitError(String),
}

impl Error {
    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: std::error::Error + 'static,
        R: Debug,
    {
        let message = DisplayErrorContext(&err).to_string();
        return match err {
            SdkError::ServiceError(_) => Error::ServiceError(message),
            _ => Error::UnknownError(message),
        };
    }
}

/// Template to update the stack with.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Body(String),
    Url(String),
    Previous,
}

/// What validating a template or describing a stack tells us about it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub capabilities: Vec<Capability>,
    pub parameter_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub stack_id: String,
    pub capabilities: Vec<Capability>,
    pub parameters: ParameterSet,
    pub template: Template,
}

pub trait StackApi {
    fn validate_template_body<'a>(&'a self, body: &'a str)
        -> BoxFuture<'a, Result<Discovery, Error>>;

    fn validate_template_url<'a>(&'a self, url: &'a str)
        -> BoxFuture<'a, Result<Discovery, Error>>;

    /// One entry per stack matching `stack_id`.
    fn describe_stacks<'a>(&'a self, stack_id: &'a str)
        -> BoxFuture<'a, Result<Vec<Discovery>, Error>>;

    fn update_stack(&self, request: UpdateRequest) -> BoxFuture<'_, Result<(), Error>>;

    /// Polls the stack until its update is complete, failing once `timeout` elapses.
    fn wait_until_stable<'a>(
        &'a self,
        stack_id: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

pub struct CloudFormation {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormation {
    /// Loads the shared AWS configuration, preferring `region` over the default region chain.
    pub async fn new(region: Option<&str>) -> Result<Self, Error> {
        let region_provider =
            RegionProviderChain::first_try(region.map(|region| Region::new(region.to_owned())))
                .or_default_provider();

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        return Self::from_config(&sdk_config).await;
    }

    pub async fn from_config(sdk_config: &SdkConfig) -> Result<Self, Error> {
        ensure_usable(sdk_config).await?;
        let client = aws_sdk_cloudformation::Client::new(sdk_config);

        return Ok(Self { client });
    }

    async fn validate_template(
        &self,
        body: Option<&str>,
        url: Option<&str>,
    ) -> Result<Discovery, Error> {
        let output = self
            .client
            .validate_template()
            .set_template_body(body.map(str::to_owned))
            .set_template_url(url.map(str::to_owned))
            .send()
            .await
            .map_err(Error::from_sdk)?;

        return Ok(discovery(
            output.capabilities(),
            output.parameters().iter().map(|p| p.parameter_key()),
        ));
    }

    async fn describe(&self, stack_id: &str) -> Result<Vec<Discovery>, Error> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(Error::from_sdk)?;

        return Ok(output
            .stacks()
            .iter()
            .map(|stack| {
                discovery(
                    stack.capabilities(),
                    stack.parameters().iter().map(|p| p.parameter_key()),
                )
            })
            .collect());
    }

    async fn update(&self, request: UpdateRequest) -> Result<(), Error> {
        let builder = self
            .client
            .update_stack()
            .stack_name(&request.stack_id)
            .set_capabilities(Some(request.capabilities))
            .set_parameters(Some(request.parameters.to_sdk()));

        let output = with_template(builder, request.template)
            .send().await.map_err(Error::from_sdk)?;
        tracing::info!(
            stack_id = output.stack_id().unwrap_or_default(),
            "Stack update started"
        );

        return Ok(());
    }

    async fn wait(&self, stack_id: &str, timeout: Duration) -> Result<(), Error> {
        match self
            .client
            .wait_until_stack_update_complete()
            .stack_name(stack_id)
            .wait(timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => Err(Error::WaitError(DisplayErrorContext(&err).to_string())),
        }
    }
}

impl StackApi for CloudFormation {
    fn validate_template_body<'a>(
        &'a self,
        body: &'a str,
    ) -> BoxFuture<'a, Result<Discovery, Error>> {
        self.validate_template(Some(body), None).boxed()
    }

    fn validate_template_url<'a>(
        &'a self,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Discovery, Error>> {
        self.validate_template(None, Some(url)).boxed()
    }

    fn describe_stacks<'a>(
        &'a self,
        stack_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Discovery>, Error>> {
        self.describe(stack_id).boxed()
    }

    fn update_stack(&self, request: UpdateRequest) -> BoxFuture<'_, Result<(), Error>> {
        self.update(request).boxed()
    }

    fn wait_until_stable<'a>(
        &'a self,
        stack_id: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self.wait(stack_id, timeout).boxed()
    }
}

/// Sets exactly one of template body, template URL or the previous-template flag.
fn with_template(
    builder: UpdateStackFluentBuilder,
    template: Template,
) -> UpdateStackFluentBuilder {
    return match template {
        Template::Body(body) => builder.template_body(body),
        Template::Url(url) => builder.template_url(url),
        Template::Previous => builder.use_previous_template(true),
    };
}

/// Fails unless a region is set and the credentials chain yields credentials.
async fn ensure_usable(sdk_config: &SdkConfig) -> Result<(), Error> {
    let region = match sdk_config.region() {
        Some(region) => region,
        None => {
            return Err(Error::ConfigurationError(String::from(
                "no region configured",
            )))
        }
    };
    let credentials_provider = match sdk_config.credentials_provider() {
        Some(provider) => provider,
        None => {
            return Err(Error::ConfigurationError(String::from(
                "no credentials provider available",
            )))
        }
    };
    if let Err(error) = credentials_provider.provide_credentials().await {
        return Err(Error::ConfigurationError(format!(
            "failed to load credentials: {}",
            DisplayErrorContext(&error)
        )));
    }

    tracing::debug!(region = %region, "Loaded AWS configuration");

    return Ok(());
}

fn discovery<'a, I>(capabilities: &[Capability], keys: I) -> Discovery
where
    I: Iterator<Item = Option<&'a str>>,
{
    return Discovery {
        capabilities: capabilities.to_vec(),
        parameter_keys: keys.flatten().map(str::to_owned).collect(),
    };
}

#[cfg(test)]
mod tests {
    use aws_config::BehaviorVersion;
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::{future, ProvideCredentials, SharedCredentialsProvider};
    use aws_credential_types::Credentials;
    use aws_sdk_cloudformation::operation::update_stack::builders::UpdateStackFluentBuilder;
    use aws_types::region::Region;
    use aws_types::SdkConfig;

    use super::ensure_usable;
    use super::with_template;
    use super::Error;
    use super::Template;

    #[derive(Debug)]
    struct NoCredentials;

    impl ProvideCredentials for NoCredentials {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no credentials in the environment",
            )))
        }
    }

    fn update_stack() -> UpdateStackFluentBuilder {
        let config = aws_sdk_cloudformation::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .build();

        return aws_sdk_cloudformation::Client::from_conf(config)
            .update_stack()
            .stack_name("my-stack");
    }

    #[tokio::test]
    async fn config_without_region() {
        let sdk_config = SdkConfig::builder().build();

        let result = ensure_usable(&sdk_config).await;
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ConfigurationError(_) => {}
            _ => panic!("Expected `ConfigurationError` error"),
        }
    }

    #[tokio::test]
    async fn config_without_credentials() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .build();

        let result = ensure_usable(&sdk_config).await;
        assert_eq!(
            Err(Error::ConfigurationError(String::from(
                "no credentials provider available"
            ))),
            result
        );
    }

    #[tokio::test]
    async fn credentials_fail_to_load() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .credentials_provider(SharedCredentialsProvider::new(NoCredentials))
            .build();

        let result = ensure_usable(&sdk_config).await;
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ConfigurationError(message) => {
                assert_eq!(true, message.contains("failed to load credentials"))
            }
            _ => panic!("Expected `ConfigurationError` error"),
        }
    }

    #[tokio::test]
    async fn config_with_region_and_credentials() {
        let credentials = Credentials::new("AKID", "SECRET", None, None, "test");
        let sdk_config = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .build();

        assert_eq!(Ok(()), ensure_usable(&sdk_config).await);
    }

    #[tokio::test]
    async fn template_body_only() {
        let builder = with_template(
            update_stack(),
            Template::Body(String::from("Resources: {}")),
        );
        let input = builder.as_input();

        assert_eq!(&Some(String::from("Resources: {}")), input.get_template_body());
        assert_eq!(&None, input.get_template_url());
        assert_eq!(&None, input.get_use_previous_template());
    }

    #[tokio::test]
    async fn template_url_only() {
        let url = String::from("https://bucket.s3.amazonaws.com/stack.yaml");
        let builder = with_template(update_stack(), Template::Url(url.clone()));
        let input = builder.as_input();

        assert_eq!(&None, input.get_template_body());
        assert_eq!(&Some(url), input.get_template_url());
        assert_eq!(&None, input.get_use_previous_template());
    }

    #[tokio::test]
    async fn previous_template_only() {
        let builder = with_template(update_stack(), Template::Previous);
        let input = builder.as_input();

        assert_eq!(&None, input.get_template_body());
        assert_eq!(&None, input.get_template_url());
        assert_eq!(&Some(true), input.get_use_previous_template());
        assert_eq!(&Some(String::from("my-stack")), input.get_stack_name());
    }
}
