use anyhow::Result;
use clap::Parser;
use tracing_subscriber::fmt::format::FmtSpan;

use cloudaudit_s3::{list_unencrypted_buckets, S3Store};

/// Read-only audit: ListBuckets plus one GetBucketEncryption per bucket.
#[derive(Parser, Debug)]
#[command(author, version, about = "s3-encryption-audit — report S3 buckets without default server-side encryption")]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_span_events(FmtSpan::CLOSE).init();
    let _cli = Cli::parse();

    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    if !credentials_available(&config).await {
        anyhow::bail!("AWS credentials not found. Configure them and retry.");
    }
    let store = S3Store::new(aws_sdk_s3::Client::new(&config));

    let unencrypted = list_unencrypted_buckets(&store)
        .await
        .map_err(|err| anyhow::anyhow!("unable to list buckets: {err}"))?;

    if unencrypted.is_empty() {
        println!("All buckets have default server-side encryption enabled.");
    } else {
        println!("Unencrypted buckets detected (default encryption missing):");
        for bucket in &unencrypted {
            println!("  - {bucket}");
        }
    }
    Ok(())
}

async fn credentials_available(config: &aws_config::SdkConfig) -> bool {
    use aws_credential_types::provider::ProvideCredentials;
    match config.credentials_provider() {
        Some(provider) => provider.provide_credentials().await.is_ok(),
        None => false,
    }
}
