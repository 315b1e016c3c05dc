// Student ID Cards - command line shell
// Parses arguments, calls the roster, prints the outcome.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use student_id_cards::{
    format_class_label, format_export_date, normalize_date, Config, MergeMode, RecordFilter,
    Roster, StudentForm, StudentRecord, StudentSaved, ARCHIVE_NAME,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "student-id-cards")]
#[command(about = "Student records and printable ID cards", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a student and render their card
    Add {
        #[command(flatten)]
        student: StudentArgs,
    },

    /// Replace a student's details and re-render their card
    Edit {
        id: u64,
        #[command(flatten)]
        student: StudentArgs,
    },

    /// Delete one student and their card (the photo is kept)
    Delete { id: u64 },

    /// Delete every student, photo and card
    DeleteAll {
        /// Must be the word DELETE
        #[arg(long)]
        confirm: String,
    },

    /// List students
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Render one student's card
    Render { id: u64 },

    /// Render cards for the matching students and zip them
    RenderAll {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = ARCHIVE_NAME)]
        output: PathBuf,
    },

    /// Merge students from a CSV file
    Import {
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = ImportMode::AddNew)]
        mode: ImportMode,
    },

    /// Write every student to a CSV file
    Export { csv: PathBuf },
}

#[derive(Args)]
struct StudentArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    father_name: String,
    #[arg(long)]
    roll_no: String,
    #[arg(long = "class")]
    class_level: String,
    #[arg(long)]
    gr_number: String,
    #[arg(long)]
    phone: String,
    #[arg(long, value_parser = parse_date)]
    date_of_birth: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    date_of_issue: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    date_of_expiry: NaiveDate,
    /// Image file to crop and store as the student's photo
    #[arg(long)]
    photo: Option<PathBuf>,
}

impl StudentArgs {
    fn into_form(self) -> (StudentForm, Option<PathBuf>) {
        let form = StudentForm {
            name: self.name,
            father_name: self.father_name,
            roll_no: self.roll_no,
            class_level: self.class_level,
            gr_number: self.gr_number,
            phone: self.phone,
            date_of_birth: self.date_of_birth,
            date_of_issue: self.date_of_issue,
            date_of_expiry: self.date_of_expiry,
            photo_path: None,
        };
        (form, self.photo)
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Part of the name (any case)
    #[arg(long)]
    name: Option<String>,
    /// Exact class
    #[arg(long = "class")]
    class_level: Option<String>,
    /// Part of the roll number
    #[arg(long)]
    roll_no: Option<String>,
}

impl From<FilterArgs> for RecordFilter {
    fn from(args: FilterArgs) -> Self {
        RecordFilter {
            name: args.name,
            class_level: args.class_level,
            roll_no: args.roll_no,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportMode {
    AddNew,
    ReplaceAll,
    Update,
}

impl From<ImportMode> for MergeMode {
    fn from(mode: ImportMode) -> Self {
        match mode {
            ImportMode::AddNew => MergeMode::AddNewOnly,
            ImportMode::ReplaceAll => MergeMode::ReplaceAll,
            ImportMode::Update => MergeMode::UpdateExisting,
        }
    }
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    normalize_date(raw).ok_or_else(|| format!("not a date: {}", raw))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "student_id_cards=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let roster = Roster::open(Config::from_env()).context("Failed to open roster")?;

    let loaded = roster.load();
    if let Some(advisory) = &loaded.advisory {
        eprintln!("⚠️  {}", advisory);
    }

    match cli.command {
        Commands::Add { student } => {
            let (form, photo) = student.into_form();
            let saved = roster
                .add_student(form, photo.as_deref())
                .context("Failed to add student")?;
            println!("✅ Student saved (id {})", saved.record.id);
            print_card(&saved);
        }
        Commands::Edit { id, student } => {
            let (form, photo) = student.into_form();
            let saved = roster
                .edit_student(id, form, photo.as_deref())
                .context("Failed to update student")?;
            println!("✅ Student updated (id {})", saved.record.id);
            print_card(&saved);
        }
        Commands::Delete { id } => {
            let removed = roster.delete_student(id).context("Failed to delete student")?;
            println!("🗑️  Deleted {} (roll {})", removed.name, removed.roll_no);
        }
        Commands::DeleteAll { confirm } => {
            let outcome = roster.delete_all(&confirm).context("Delete all refused")?;
            println!("🗑️  {}", outcome.message);
            println!("✓ All records, photos and cards removed");
        }
        Commands::List { filter } => {
            let records = roster.list(&filter.into());
            print_records(&records);
        }
        Commands::Render { id } => {
            let path = roster.render_card(id).context("Failed to render card")?;
            println!("🪪 Card: {}", path.display());
        }
        Commands::RenderAll { filter, output } => {
            println!("🖨️  Generating ID cards...");
            let outcome = roster
                .render_filtered(&filter.into(), &output, |done, total| {
                    println!("   [{}/{}]", done, total);
                })
                .context("Failed to generate cards")?;

            for failure in &outcome.report.failures {
                eprintln!("❌ {} ({}): {}", failure.name, failure.roll_no, failure.reason);
            }
            println!("\n{}", outcome.report.summary());
            match outcome.archive_path {
                Some(path) => println!("📦 Archive: {}", path.display()),
                None => println!("📦 No cards to archive"),
            }
        }
        Commands::Import { csv, mode } => {
            let outcome = roster
                .import(&csv, mode.into())
                .with_context(|| format!("Failed to import {}", csv.display()))?;

            for failure in &outcome.report.failures {
                eprintln!(
                    "❌ Line {} (roll {}): {}",
                    failure.line_number, failure.roll_no, failure.reason
                );
            }
            println!("📥 {}", outcome.report.summary());
        }
        Commands::Export { csv } => {
            let count = roster
                .export(&csv)
                .with_context(|| format!("Failed to export {}", csv.display()))?;
            println!("📤 Exported {} students to {}", count, csv.display());
        }
    }

    Ok(())
}

fn print_card(saved: &StudentSaved) {
    match &saved.card_error {
        None => println!("🪪 Card: {}", saved.card_path.display()),
        Some(reason) => eprintln!("❌ Student was saved but the card failed: {}", reason),
    }
}

fn print_records(records: &[StudentRecord]) {
    println!("📋 {} students", records.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for record in records {
        println!(
            "{:>4}  {:<10} {:<24} {:<24} {:<6} {}",
            record.id,
            record.roll_no,
            record.name,
            record.father_name,
            format_class_label(&record.class_level),
            format_export_date(record.expiry_date()),
        );
    }
}
