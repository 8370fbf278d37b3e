use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use speedcam::broadcast::UploadPhase;
use speedcam::calibration::{CaptureSurface, DisplaySize, FileSurface, NullSurface, OverlayStyle};
use speedcam::models::{DetectionFilter, DetectionSummary};
use speedcam::{
    init_logging, load_or_default, Job, JobId, PollSubscription, ProcessingConfig,
    SpeedcamClient, SyncEvent,
};

/// Command line client for the traffic speed-analysis server.
#[derive(Debug, Parser)]
#[command(name = "speedcam", version, about)]
struct Cli {
    /// Path to a JSON config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `api.base_url`.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the server is reachable.
    Health,
    /// List all jobs.
    List,
    /// Show one job.
    Show { id: JobId },
    /// Upload a video.
    Upload {
        path: PathBuf,
        /// Keep polling until the job finishes.
        #[arg(long)]
        watch: bool,
    },
    /// Poll a job until it finishes.
    Watch { id: JobId },
    /// Start processing a job.
    Process {
        id: JobId,
        /// Enable speed calculation (the job must be calibrated).
        #[arg(long)]
        speed: bool,
        /// km/h
        #[arg(long)]
        speed_limit: Option<f64>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long)]
        iou: Option<f64>,
        /// Return once processing has started.
        #[arg(long)]
        no_wait: bool,
    },
    /// Capture and save a four-point calibration.
    Calibrate {
        id: JobId,
        /// Size the clicks were made at, e.g. 1280x720.
        #[arg(long)]
        display: DisplaySize,
        /// Click position `x,y` in display coordinates; give it four times.
        #[arg(long = "click", value_parser = parse_click, required = true)]
        clicks: Vec<(f64, f64)>,
        /// Real-world distance in meters.
        #[arg(long)]
        distance: Option<f64>,
        /// Mark the distance as an estimate.
        #[arg(long)]
        approximate: bool,
        /// Write the frame with the overlay to this image file.
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Inspect or remove a stored calibration.
    Calibration {
        #[command(subcommand)]
        action: CalibrationAction,
    },
    /// List detections of a processed job.
    Detections {
        id: JobId,
        #[arg(long)]
        speeding: bool,
        #[arg(long)]
        min_speed: Option<f64>,
        #[arg(long)]
        max_speed: Option<f64>,
        /// Print a summary instead of every detection.
        #[arg(long)]
        summary: bool,
    },
    /// Aggregate counts across all jobs.
    Analytics,
    /// Download the annotated video.
    Download {
        id: JobId,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Download the CSV report.
    Report {
        id: JobId,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete a job.
    Delete { id: JobId },
}

#[derive(Debug, Subcommand)]
enum CalibrationAction {
    Show { id: JobId },
    Delete { id: JobId },
}

fn parse_click(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{}'", s))?;
    let x = x.trim().parse().map_err(|_| format!("invalid x '{}'", x))?;
    let y = y.trim().parse().map_err(|_| format!("invalid y '{}'", y))?;
    Ok((x, y))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
        speedcam::config::validate_config(&config)?;
    }
    init_logging(&config.logging);

    let client = SpeedcamClient::new(config)?;
    log::debug!("Running {:?}", cli.command);
    run(&client, cli.command).await
}

async fn run(client: &SpeedcamClient, command: Command) -> Result<()> {
    match command {
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.is_healthy() {
                bail!("server reports status '{}'", health.status);
            }
        }
        Command::List => {
            for job in client.list_jobs().await? {
                print_job_line(&job);
            }
        }
        Command::Show { id } => {
            let job = client.job(&id).await?;
            println!("{}", serde_json::to_string_pretty(job.as_ref())?);
        }
        Command::Upload { path, watch } => upload(client, path, watch).await?,
        Command::Watch { id } => follow(client.watch(&id)).await?,
        Command::Process {
            id,
            speed,
            speed_limit,
            confidence,
            iou,
            no_wait,
        } => {
            let mut processing: ProcessingConfig = client.config().processing.clone();
            processing.enable_speed_calculation |= speed;
            if let Some(limit) = speed_limit {
                processing.speed_limit = limit;
            }
            if let Some(confidence) = confidence {
                processing.confidence_threshold = confidence;
            }
            if let Some(iou) = iou {
                processing.iou_threshold = iou;
            }

            let subscription = match client.start_processing(&id, &processing).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    if let Some(job_id) = e.calibration_redirect() {
                        bail!(
                            "{}\nRun `speedcam calibrate {} --display WxH --click x,y ...` first",
                            e.user_message(),
                            job_id
                        );
                    }
                    return Err(e.into());
                }
            };
            println!("Processing started for job {}", id);
            if !no_wait {
                follow(subscription).await?;
            }
        }
        Command::Calibrate {
            id,
            display,
            clicks,
            distance,
            approximate,
            preview,
        } => {
            let surface: Box<dyn CaptureSurface> = match preview {
                Some(path) => Box::new(FileSurface::new(
                    path,
                    OverlayStyle::from_config(&client.config().calibration)?,
                )),
                None => Box::new(NullSurface),
            };

            let mut engine = client.open_calibration(&id, surface).await?;
            if !engine.points().is_empty() {
                println!("Replacing existing calibration for job {}", id);
                engine.reset();
            }
            for (x, y) in clicks {
                engine.click(x, y, display)?;
            }
            if let Some(distance) = distance {
                engine.set_reference_distance(distance);
            }
            engine.set_approximate(approximate);

            let outcome = engine.save().await?;
            println!(
                "Saved calibration for job {}: {} points, {} m",
                outcome.job_id,
                outcome.calibration.points().len(),
                outcome.calibration.reference_distance()
            );
        }
        Command::Calibration { action } => match action {
            CalibrationAction::Show { id } => match client.calibration(&id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Job {} is not calibrated", id),
            },
            CalibrationAction::Delete { id } => {
                client.delete_calibration(&id).await?;
                println!("Deleted calibration for job {}", id);
            }
        },
        Command::Detections {
            id,
            speeding,
            min_speed,
            max_speed,
            summary,
        } => {
            let filter = DetectionFilter {
                speeding_only: speeding,
                min_speed,
                max_speed,
                track_id: None,
            };
            let detections = client.detections(&id, &filter).await?;
            if summary {
                let summary = DetectionSummary::from_detections(&detections);
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for d in &detections {
                    println!(
                        "track {:>4}  frame {:>6}  t={:>8.2}s  {:>6.1} km/h{}",
                        d.track_id,
                        d.frame_number,
                        d.timestamp,
                        d.speed,
                        if d.is_speeding { "  SPEEDING" } else { "" }
                    );
                }
            }
        }
        Command::Analytics => {
            let summary = client.analytics().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Download { id, output } => {
            let data = client.download(&id).await?;
            write_output(&output, &data).await?;
        }
        Command::Report { id, output } => {
            let data = client.report(&id).await?;
            write_output(&output, &data).await?;
        }
        Command::Delete { id } => {
            let ack = client.delete_job(&id).await?;
            println!(
                "{}",
                ack.message.unwrap_or_else(|| format!("Deleted job {}", id))
            );
        }
    }

    Ok(())
}

async fn upload(client: &SpeedcamClient, path: PathBuf, watch: bool) -> Result<()> {
    let controller = client.upload_controller();
    let mut events = controller.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.phase {
                UploadPhase::Transferring => eprint!("\rUploading {}: {:>3}%", event.filename, event.percent),
                UploadPhase::Completed => {
                    eprintln!("\rUploading {}: 100%", event.filename);
                    break;
                }
                UploadPhase::Failed => {
                    eprintln!();
                    break;
                }
                UploadPhase::Started => {}
            }
        }
    });

    controller
        .select(&path)
        .await
        .with_context(|| format!("Cannot upload {:?}", path))?;
    let result = controller.upload().await;
    let _ = printer.await;
    let handoff = result?;

    println!("Created job {}", handoff.job.id);
    if watch {
        follow(handoff.subscription).await?;
    }
    Ok(())
}

/// Prints sync events until polling ends.
async fn follow(mut subscription: PollSubscription) -> Result<()> {
    while let Some(event) = subscription.next_event().await {
        match event {
            SyncEvent::Snapshot(job) => print_job_line(&job),
            SyncEvent::PollFailed {
                error, retry_in, ..
            } => eprintln!("poll failed: {} (retrying in {:?})", error, retry_in),
            SyncEvent::Stopped { job_id, status } => println!("Job {} {}", job_id, status),
            SyncEvent::Cancelled { job_id } => println!("Stopped watching job {}", job_id),
        }
    }

    if let Some(job) = subscription.latest() {
        if let Some(error) = job.failure() {
            bail!("job {} failed: {}", job.id, error);
        }
    }
    Ok(())
}

fn print_job_line(job: &Job) {
    let speed = job
        .avg_speed
        .map(|s| format!("{:.1} km/h avg", s))
        .unwrap_or_default();
    println!(
        "{:>5}  {:<11} {:>3}%  {:<32} vehicles={:<4} calibrated={:<5} {}",
        job.id,
        job.status,
        job.progress,
        job.filename,
        job.vehicle_count,
        job.is_calibrated,
        speed
    );
}

async fn write_output(path: &PathBuf, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote {} bytes to {:?}", data.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_click() {
        assert_eq!(parse_click("12.5, 40").unwrap(), (12.5, 40.0));
        assert!(parse_click("12.5").is_err());
        assert!(parse_click("a,b").is_err());
    }

    #[test]
    fn test_calibrate_args() {
        let cli = Cli::try_parse_from([
            "speedcam", "calibrate", "4", "--display", "640x360", "--click", "1,1", "--click",
            "2,2", "--click", "3,3", "--click", "4,4", "--distance", "12",
        ])
        .unwrap();
        match cli.command {
            Command::Calibrate {
                id,
                display,
                clicks,
                distance,
                ..
            } => {
                assert_eq!(id, JobId::new("4"));
                assert_eq!(display.width, 640.0);
                assert_eq!(clicks.len(), 4);
                assert_eq!(distance, Some(12.0));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
