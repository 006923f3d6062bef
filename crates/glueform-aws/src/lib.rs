//! AWS backends for glueform
//!
//! [`AwsResourceApi`] reconciles the bucket (S3), catalog database and job
//! (Glue) and the role and policies (IAM). [`AwsJobApi`] starts and observes
//! Glue job runs. Both share one [`AwsClients`] built from the `[aws]`
//! config section and the default credential chain.

mod jobs;
mod mapping;
mod resources;
mod scripts;

pub use jobs::AwsJobApi;
pub use resources::AwsResourceApi;
pub use scripts::upload_script;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use glueform_config::AwsConfig;
use tracing::info;

/// Service clients for one account and region.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub s3: aws_sdk_s3::Client,
    pub glue: aws_sdk_glue::Client,
    pub iam: aws_sdk_iam::Client,
    region: Option<String>,
}

impl AwsClients {
    /// Resolve credentials and region, then build the service clients.
    pub async fn load(config: &AwsConfig) -> Self {
        let sdk_config = load_sdk_config(config).await;
        let clients = Self::from_sdk_config(&sdk_config, config.endpoint_url.is_some());
        info!(
            region = clients.region().unwrap_or("<default chain>"),
            endpoint = config.endpoint_url.as_deref().unwrap_or("<aws>"),
            "AWS clients initialised"
        );
        clients
    }

    /// Build clients from an already loaded SDK config.
    ///
    /// `path_style` forces path-style S3 addressing, which local emulators
    /// behind a custom endpoint usually need.
    pub fn from_sdk_config(sdk_config: &SdkConfig, path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(path_style)
            .build();

        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            glue: aws_sdk_glue::Client::new(sdk_config),
            iam: aws_sdk_iam::Client::new(sdk_config),
            region: sdk_config.region().map(|r| r.to_string()),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}
