use chrono::Utc;
use clap::{Parser, Subcommand};
use labwatch_core::classify::ClassifiedBatch;
use labwatch_core::patients::PatientIndex;
use labwatch_core::{ObservationClassifier, RunReport, ThresholdTable};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "labwatch")]
#[command(about = "Offline tools for classifying FHIR observation exports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify local NDJSON export files and print the run report
    Classify {
        /// Observation NDJSON file (repeatable)
        #[arg(long = "observations", required = true)]
        observations: Vec<PathBuf>,
        /// Patient NDJSON file
        #[arg(long)]
        patients: PathBuf,
        /// Threshold table JSON (defaults to the built-in table)
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// List the active threshold table
    Thresholds {
        /// Threshold table JSON (defaults to the built-in table)
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
    /// Print the patient identities resolved from an export file
    Patients {
        /// Patient NDJSON file
        #[arg(long)]
        patients: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Classify {
            observations,
            patients,
            thresholds,
        }) => {
            classify_files(&observations, &patients, thresholds.as_deref())?;
        }
        Some(Commands::Thresholds { thresholds }) => {
            let table = ThresholdTable::load(thresholds.as_deref())?;
            for definition in table.sorted() {
                println!(
                    "{}  {}  {}-{} {}",
                    definition.code, definition.name, definition.low, definition.high,
                    definition.unit
                );
            }
        }
        Some(Commands::Patients { patients }) => {
            let index = read_patient_index(&patients)?;
            if index.is_empty() {
                println!("No patients found.");
            } else {
                for identity in index.sorted() {
                    let age = identity
                        .age_years
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "-".into());
                    let gender = identity.gender.as_deref().unwrap_or("-");
                    println!(
                        "ID: {}, Name: {}, Gender: {}, Age: {}",
                        identity.id, identity.display_name, gender, age
                    );
                }
            }
        }
        None => {
            println!("Use 'labwatch --help' for commands");
        }
    }

    Ok(())
}

fn classify_files(
    observation_files: &[PathBuf],
    patient_file: &Path,
    thresholds: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = ThresholdTable::load(thresholds)?;
    let classifier = ObservationClassifier::new(table);
    let index = read_patient_index(patient_file)?;

    let mut batch = ClassifiedBatch::default();
    for file in observation_files {
        let text = std::fs::read_to_string(file)?;
        batch.absorb(classifier.classify(&text, &index));
    }

    let report = RunReport::build(
        Uuid::new_v4(),
        Utc::now(),
        batch.results,
        batch.stats,
        index.len(),
    );
    println!("{}", report.subject());
    println!();
    println!("{}", report.render()?);
    Ok(())
}

fn read_patient_index(patient_file: &Path) -> Result<PatientIndex, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(patient_file)?;
    let mut index = PatientIndex::new();
    index.ingest_ndjson(&text, Utc::now().date_naive());
    Ok(index)
}
