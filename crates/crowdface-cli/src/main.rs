use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crowdface_core::{Detection, FaceSummary, IdentityRecord};
use rand::seq::SliceRandom;

mod client;

use client::CrowdfaceProxy;

#[derive(Parser)]
#[command(name = "crowdface", about = "Crowdface face identity CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    All,
    Named,
    Unknown,
}

impl Filter {
    fn as_str(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Named => "named",
            Filter::Unknown => "unknown",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// List stored identities
    List {
        #[arg(short, long, value_enum, default_value = "all")]
        filter: Filter,
    },
    /// Show one identity
    Show {
        id: u64,
        /// Write the identity's snapshot to this file
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Run a recognition tick on an image and its detections
    Submit {
        /// Image file (any format the image crate reads)
        image: PathBuf,
        /// JSON array of detections: [{"descriptor": [...], "boundingBox": {...}}]
        detections: PathBuf,
    },
    /// Add an image's faces to the enrollment session
    Capture { image: PathBuf, detections: PathBuf },
    /// List faces waiting in the enrollment session
    Captured,
    /// Drop one captured face, or the whole session without an index
    Discard { index: Option<u32> },
    /// Save the enrollment session under a name
    Register { name: String },
    /// Guess the name of a random unknown identity
    Quiz {
        /// Where to write the snapshot to look at
        #[arg(long, default_value = "crowdface-quiz.jpg")]
        image: PathBuf,
    },
    /// Record a quiz answer for a specific identity
    Answer { id: u64, answer: String },
    /// Set an identity's name directly
    Rename { id: u64, name: String },
    /// Send an identity back to the quiz
    Reset { id: u64 },
    /// Delete an identity
    Remove { id: u64 },
    /// Delete every identity
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show recently seen identities
    Recent,
    /// Import a JSON export of records
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    let proxy = CrowdfaceProxy::new(&conn)
        .await
        .context("crowdfaced is not reachable")?;

    match cli.command {
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::List { filter } => {
            let faces: Vec<FaceSummary> =
                serde_json::from_str(&proxy.list_faces(filter.as_str()).await?)?;
            if faces.is_empty() {
                println!("No identities stored");
            }
            for face in &faces {
                println!("{}", describe(face));
            }
        }
        Commands::Show { id, image } => {
            let record: IdentityRecord = serde_json::from_str(&proxy.get_face(id).await?)?;
            println!("{}", describe(&record.summary()));
            for answer in &record.answers {
                println!("  answer: {} ({})", answer.text, answer.at.to_rfc3339());
            }
            if let Some(path) = image {
                write_snapshot(&record, &path)?;
                println!("Snapshot written to {}", path.display());
            }
        }
        Commands::Submit { image, detections } => {
            let (width, height, rgb) = load_frame(&image)?;
            let detections = load_detections(&detections)?;
            let labels: Vec<serde_json::Value> = serde_json::from_str(
                &proxy.submit_frame(width, height, rgb, &detections).await?,
            )?;
            for label in &labels {
                println!(
                    "#{} {} [{}]",
                    label["id"],
                    label["label"].as_str().unwrap_or_default(),
                    label["outcome"].as_str().unwrap_or_default()
                );
            }
        }
        Commands::Capture { image, detections } => {
            let (width, height, rgb) = load_frame(&image)?;
            let detections = load_detections(&detections)?;
            let size = proxy.capture(width, height, rgb, &detections).await?;
            println!("{size} face(s) captured for enrollment");
        }
        Commands::Captured => {
            let faces: Vec<serde_json::Value> =
                serde_json::from_str(&proxy.captured_faces().await?)?;
            if faces.is_empty() {
                println!("Enrollment session is empty");
            }
            for face in &faces {
                println!(
                    "[{}] {} dims, {} byte snapshot",
                    face["index"], face["dimension"], face["imageBytes"]
                );
            }
        }
        Commands::Discard { index: Some(index) } => {
            proxy.remove_captured(index).await?;
            println!("Discarded captured face {index}");
        }
        Commands::Discard { index: None } => {
            proxy.clear_captured().await?;
            println!("Enrollment session cleared");
        }
        Commands::Register { name } => {
            let ids = proxy.register(&name).await?;
            println!("Registered {} face(s) as {name}: {ids:?}", ids.len());
        }
        Commands::Quiz { image } => quiz(&proxy, &image).await?,
        Commands::Answer { id, answer } => {
            let Some(answer) = quiz_answer(&answer) else {
                bail!("answer must not be blank");
            };
            let name = proxy.record_answer(id, answer).await?;
            println!("Answer recorded; identity {id} is {name}");
        }
        Commands::Rename { id, name } => {
            proxy.rename(id, &name).await?;
            println!("Identity {id} renamed to {}", name.trim());
        }
        Commands::Reset { id } => {
            proxy.reset_name(id).await?;
            println!("Identity {id} is unknown again");
        }
        Commands::Remove { id } => {
            if proxy.remove_face(id).await? {
                println!("Identity {id} removed");
            } else {
                println!("No identity {id}");
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every identity without --yes");
            }
            proxy.clear_all().await?;
            println!("All identities deleted");
        }
        Commands::Recent => {
            let recent: Vec<serde_json::Value> = serde_json::from_str(&proxy.recent().await?)?;
            for sighting in &recent {
                println!(
                    "#{} {} {}% ({})",
                    sighting["id"],
                    sighting["name"].as_str().unwrap_or_default(),
                    sighting["confidence"],
                    sighting["band"].as_str().unwrap_or_default()
                );
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let report: serde_json::Value = serde_json::from_str(&proxy.import(&text).await?)?;
            println!(
                "Imported {} record(s), skipped {}",
                report["imported"].as_array().map_or(0, Vec::len),
                report["skipped"]
            );
        }
    }

    Ok(())
}

async fn quiz(proxy: &CrowdfaceProxy<'_>, image: &Path) -> Result<()> {
    let unknown: Vec<FaceSummary> = serde_json::from_str(&proxy.list_faces("unknown").await?)?;
    let Some(face) = pick_quiz_subject(&unknown, &mut rand::thread_rng()) else {
        println!("Everyone has a name. Nothing to ask.");
        return Ok(());
    };

    let record: IdentityRecord = serde_json::from_str(&proxy.get_face(face.id).await?)?;
    write_snapshot(&record, image)?;
    println!("Who is this? Snapshot of identity {} at {}", face.id, image.display());
    print!("> ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let Some(answer) = quiz_answer(&line) else {
        println!("No answer given");
        return Ok(());
    };

    let name = proxy.record_answer(face.id, answer).await?;
    if name == crowdface_core::types::UNKNOWN_NAME {
        println!("Thanks! Not enough matching answers yet.");
    } else {
        println!("Thanks! Identity {} is now {name}.", face.id);
    }
    Ok(())
}

/// The typed answer without surrounding whitespace, or `None` if blank.
fn quiz_answer(line: &str) -> Option<&str> {
    Some(line.trim()).filter(|answer| !answer.is_empty())
}

fn pick_quiz_subject<'a, R: rand::Rng + ?Sized>(
    unknown: &'a [FaceSummary],
    rng: &mut R,
) -> Option<&'a FaceSummary> {
    unknown.choose(rng)
}

fn describe(face: &FaceSummary) -> String {
    format!(
        "#{} {} ({} angle(s), {} answer(s), since {})",
        face.id,
        face.name,
        face.angles,
        face.answers,
        face.created_at.format("%Y-%m-%d %H:%M")
    )
}

/// Decode an image file into packed RGB8.
fn load_frame(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
    let img = image::open(path)
        .with_context(|| format!("cannot read image {}", path.display()))?
        .to_rgb8();
    Ok((img.width(), img.height(), img.into_raw()))
}

/// Read a detections file, checking its shape before it goes on the bus.
fn load_detections(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let detections: Vec<Detection> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a detections array", path.display()))?;
    tracing::debug!(count = detections.len(), "detections loaded");
    Ok(text)
}

fn write_snapshot(record: &IdentityRecord, path: &Path) -> Result<()> {
    if record.image.is_empty() {
        bail!("identity {} has no snapshot", record.id);
    }
    std::fs::write(path, record.image.as_bytes())
        .with_context(|| format!("cannot write {}", path.display()))
}
