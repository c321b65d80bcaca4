use crate::config::Config;
use crate::errors::StoreError;
use aws_sdk_dynamodb::{
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
};
use aws_sdk_s3::{
    Client as S3Client, error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use tracing::{error, info};

/// Creates a DynamoDB table if it doesn't exist. An existing table is not an
/// error.
async fn ensure_table(
    client: &DynamoDbClient,
    table_name: &str,
    hash_key: &str,
    range_key: Option<&str>,
) -> Result<(), StoreError> {
    let mut request = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(hash_key)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| {
                    StoreError::Init(format!("Failed to build attribute definition: {}", e))
                })?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(hash_key)
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| StoreError::Init(format!("Failed to build key schema: {}", e)))?,
        )
        .billing_mode(BillingMode::PayPerRequest);

    if let Some(range_key) = range_key {
        request = request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(range_key)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(|e| {
                        StoreError::Init(format!("Failed to build attribute definition: {}", e))
                    })?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(range_key)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(|e| StoreError::Init(format!("Failed to build key schema: {}", e)))?,
            );
    }

    match request.send().await {
        Ok(_) => {
            info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating DynamoDB table '{}'", table_name);
            error!("{}: {}", context, e);
            Err(StoreError::Init(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the media bucket exists, creating it with the correct location
/// constraint if needed.
async fn ensure_media_bucket(
    client: &S3Client,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), StoreError> {
    let bucket_config = if region_str != "us-east-1" {
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        )
    } else {
        None
    };

    let mut request = client.create_bucket().bucket(bucket_name);
    if let Some(config) = bucket_config {
        request = request.create_bucket_configuration(config);
    }

    match request.send().await {
        Ok(_) => {
            info!("Startup: S3 bucket '{}' created or already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating S3 bucket '{}'", bucket_name);
            error!("{}: {}", context, sdk_err);
            Err(StoreError::Init(format!("{}: {}", context, sdk_err)))
        }
    }
}

/// Initializes required backend resources: the four feed tables and the
/// media bucket.
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    config: &Config,
) -> Result<(), StoreError> {
    info!("Startup: Initializing backend resources...");
    ensure_table(db_client, &config.memes_table(), "meme_id", None).await?;
    ensure_table(db_client, &config.likes_table(), "meme_id", Some("viewer_id")).await?;
    ensure_table(
        db_client,
        &config.subscriptions_table(),
        "follower_id",
        Some("target_id"),
    )
    .await?;
    ensure_table(db_client, &config.notifications_table(), "notification_id", None).await?;
    ensure_media_bucket(s3_client, &config.media_bucket_name, &config.aws_region).await?;
    info!("Startup: Backend resource initialization complete.");
    Ok(())
}
