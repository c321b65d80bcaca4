use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

// Creates the base AWS SDK configuration based on application config.
// Reads region and optional endpoint URL from `Config` and uses the default
// credential provider chain (env vars, profiles, etc.).
pub async fn create_sdk_config(config: &Config) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    info!(sdk_region = %config.aws_region, "Setting SDK region");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    if let Some(endpoint_url) = &config.localstack_endpoint {
        info!("Using localstack endpoint override: {}", endpoint_url);
        config_loader = config_loader.endpoint_url(endpoint_url);
    }

    config_loader.load().await
}

// Creates a DynamoDB client from a shared SdkConfig.
pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

// Creates an S3 client from a shared SdkConfig. Path-style addressing keeps
// LocalStack happy.
pub fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
