mod aws;
mod config;
mod detection;
mod pipeline;
mod storage;

use config::PipelineConfig;
use detection::DetectionParams;
use detection::rekognition_service::RekognitionService;
use pipeline::labeler::Labeler;
use pipeline::writer::ArtifactWriter;
use std::process::ExitCode;
use storage::s3_service::S3Service;

const EXIT_CONFIG: u8 = 1;
const EXIT_CONNECTIVITY: u8 = 2;
const EXIT_WRITE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match PipelineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let sdk_config = aws::load_sdk_config(&config).await;
    let s3_service = S3Service::new(
        aws::s3_client(&sdk_config, &config),
        config.bucket.clone(),
        config.images_only,
    );
    let rekognition =
        RekognitionService::new(aws::rekognition_client(&sdk_config), config.bucket.clone());
    let labeler = Labeler::new(rekognition, DetectionParams::from(&config));
    let writer = ArtifactWriter::new(config.output.clone());

    log::info!(
        "Labeling s3://{}/{} (min confidence {}, max labels {})",
        s3_service.bucket_name(),
        config.prefix.as_deref().unwrap_or(""),
        labeler.params().min_confidence,
        labeler.params().max_labels
    );

    match pipeline::run(&s3_service, config.prefix.as_deref(), &labeler, &writer).await {
        Ok(summary) => {
            log::info!(
                "Done in {:.1}s: {} keys, {} labeled, {} failed, {} label rows, {} write failures",
                summary.elapsed.as_secs_f64(),
                summary.keys,
                summary.labeled(),
                summary.failed,
                summary.label_rows,
                summary.write.failures.len()
            );
            for (kind, path) in &summary.write.written {
                log::debug!("Wrote {} to {}", kind, path.display());
            }
            if summary.write.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_WRITE)
            }
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(EXIT_CONNECTIVITY)
        }
    }
}
