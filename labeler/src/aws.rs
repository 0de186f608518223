use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::config::PipelineConfig;

pub async fn load_sdk_config(config: &PipelineConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Path-style addressing is forced when a custom endpoint is configured.
pub fn s3_client(sdk_config: &SdkConfig, config: &PipelineConfig) -> aws_sdk_s3::Client {
    let builder = aws_sdk_s3::config::Builder::from(sdk_config);
    let s3_config = if config.endpoint.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };
    aws_sdk_s3::Client::from_conf(s3_config)
}

pub fn rekognition_client(sdk_config: &SdkConfig) -> aws_sdk_rekognition::Client {
    aws_sdk_rekognition::Client::new(sdk_config)
}
