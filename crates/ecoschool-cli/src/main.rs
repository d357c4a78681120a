// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ecoschool_core::batch::{BatchConfig, BatchExporter};
use ecoschool_core::carbon::{calculate, EmissionInput};
use ecoschool_core::config::{AppConfig, DEFAULT_DATA_DIR};
use ecoschool_core::directory::{SchoolDirectory, SchoolRecord};
use ecoschool_core::energy::{EnergyDataset, EnergyRequest};
use ecoschool_core::export::{
    group_thousands, render_report_pdf, report_file_name, CaptureFormat, CaptureRequest,
    CaptureSettings, Capturer, ChromeLauncher, EmissionView, ReportSummary,
};
use ecoschool_core::form::{FieldValue, Step1Form, Wizard};
use ecoschool_core::picker::{PickOutcome, SchoolPicker};
use ecoschool_core::practices::{PracticeCategory, CATALOG};
use ecoschool_core::schoolinfo::{
    BasicInfoRequest, CachedSource, Reconciler, SchoolInfoClient, SchoolInfoSource,
};
use ecoschool_core::session::SessionStore;
use ecoschool_core::{current_year, parse_year, EcoError};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding seoul-schools.json and seoul-schools-with-energy.json
    #[arg(long, env = "ECOSCHOOL_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// schoolinfo.go.kr OpenAPI key
    #[arg(long, env = "SCHOOLINFO_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "SCHOOLINFO_ACCOUNT", global = true)]
    account: Option<String>,

    /// Session file (defaults to the per-user config directory)
    #[arg(long, env = "ECOSCHOOL_SESSION", global = true)]
    session: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest schools by name
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Class, student, staff and area figures from the schoolinfo OpenAPI
    Basic {
        #[arg(long)]
        name: String,
        /// Seoul district, e.g. 강남구
        #[arg(long)]
        region: String,
        /// 초등, 중등, 고등, 특수, 그외 or 각종
        #[arg(long)]
        level: String,
        #[arg(long)]
        year: Option<String>,
        /// Replay and record upstream responses in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Metered usage from the energy dataset
    Energy {
        #[arg(long)]
        name: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        year: Option<String>,
    },
    /// Pick a school (`name|level|region` or a directory name) and fill step 1 hints
    Pick { school: String },
    /// Edit or check the step 1 form
    Form {
        #[command(subcommand)]
        action: FormAction,
    },
    /// Carbon estimate; without flags the session's step 1 values are used
    Calc {
        #[arg(long)]
        electricity: Option<String>,
        #[arg(long)]
        gas: Option<String>,
        #[arg(long)]
        water: Option<String>,
    },
    /// Practice checklist
    Practice {
        #[command(subcommand)]
        action: PracticeAction,
    },
    /// Show or reset the saved session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Write the summary PDF for the current session
    Report {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// TTF font with Hangul glyphs
        #[arg(long, env = "ECOSCHOOL_REPORT_FONT")]
        font: Option<PathBuf>,
    },
    /// Screenshot a page of the running app through headless Chrome
    Capture {
        #[arg(long)]
        url: String,
        #[arg(long)]
        selector: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Png)]
        format: OutputFormat,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, env = "CHROME_PATH")]
        chrome_path: Option<PathBuf>,
    },
    /// Build the all-schools CSV (students, staff, area, energy)
    ExportCsv {
        #[arg(short, long, env = "OUTPUT")]
        output: Option<PathBuf>,
        #[arg(long, env = "CONCURRENCY")]
        concurrency: Option<usize>,
        #[arg(long, env = "YEAR")]
        year: Option<String>,
        #[arg(long, env = "ALLOW_EMPTY_BASIC")]
        allow_empty_basic: bool,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Convert the education office CSV into seoul-schools.json
    ImportSchools {
        csv: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum FormAction {
    /// Set one field
    Set { field: FormField, value: String },
    /// Show the form with hints
    Show,
    /// Report missing required fields
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormField {
    SchoolName,
    ClassCount,
    StudentCount,
    StaffCount,
    Area,
    CoolingTemp,
    HeatingTemp,
    Solar,
    Electricity,
    Gas,
    Water,
}

impl FormField {
    fn slot(self, form: &mut Step1Form) -> &mut FieldValue {
        match self {
            Self::SchoolName => &mut form.basic.school_name,
            Self::ClassCount => &mut form.basic.class_count,
            Self::StudentCount => &mut form.basic.student_count,
            Self::StaffCount => &mut form.basic.staff_count,
            Self::Area => &mut form.basic.school_area_m2,
            Self::CoolingTemp => &mut form.basic.cooling_temp_c,
            Self::HeatingTemp => &mut form.basic.heating_temp_c,
            Self::Solar => &mut form.basic.solar_annual_kwh,
            Self::Electricity => &mut form.emissions.electricity_kwh,
            Self::Gas => &mut form.emissions.gas_m3,
            Self::Water => &mut form.emissions.water_m3,
        }
    }
}

#[derive(Subcommand)]
enum PracticeAction {
    /// List every practice with its state
    List,
    /// Flip one practice by id
    Toggle { id: String },
    /// Per-category progress
    Status,
}

#[derive(Subcommand)]
enum SessionAction {
    Show,
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Png,
    Pdf,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new()
        .add_filter_allow_str("ecoschool")
        .build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("Logger already initialized: {}", e);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn year_arg(raw: Option<&str>) -> Result<Option<i32>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_year(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("year must be four digits, got {}", s)),
    }
}

fn schoolinfo_source(
    config: &AppConfig,
    cache_dir: Option<&PathBuf>,
) -> Result<Option<Box<dyn SchoolInfoSource>>> {
    if config.api_key.is_none() {
        return Ok(None);
    }
    let client = SchoolInfoClient::from_config(config)?;
    Ok(Some(match cache_dir {
        Some(dir) => Box::new(
            CachedSource::new(client, dir)
                .with_context(|| format!("Failed to create cache dir {}", dir.display()))?,
        ),
        None => Box::new(client),
    }))
}

fn load_directory(config: &AppConfig) -> Result<SchoolDirectory> {
    SchoolDirectory::load(config.schools_path()).with_context(|| {
        format!(
            "Failed to load school directory from {}",
            config.schools_path().display()
        )
    })
}

fn load_energy(config: &AppConfig) -> Result<EnergyDataset> {
    EnergyDataset::load(config.energy_path()).with_context(|| {
        format!(
            "Failed to load energy dataset from {}",
            config.energy_path().display()
        )
    })
}

fn resolve_school(directory: &SchoolDirectory, school: &str) -> Result<SchoolRecord> {
    if school.contains('|') {
        return Ok(SchoolRecord::try_from(school)?);
    }
    let matches = directory.search(school, None);
    matches
        .iter()
        .find(|r| r.name == school.trim())
        .or_else(|| matches.first())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No school matches {}", school))
}

fn show_form(form: &Step1Form) {
    let rows = [
        ("학교명", &form.basic.school_name),
        ("학급 수", &form.basic.class_count),
        ("학생 수", &form.basic.student_count),
        ("교직원 수", &form.basic.staff_count),
        ("학교 면적(m²)", &form.basic.school_area_m2),
        ("냉방 온도(°C)", &form.basic.cooling_temp_c),
        ("난방 온도(°C)", &form.basic.heating_temp_c),
        ("태양광 발전량(kWh)", &form.basic.solar_annual_kwh),
        ("전기 사용량(kWh)", &form.emissions.electricity_kwh),
        ("가스 사용량(m³)", &form.emissions.gas_m3),
        ("물 사용량(m³)", &form.emissions.water_m3),
    ];
    for (label, field) in rows {
        let marker = if field.entered.trim().is_empty() && !field.is_blank() {
            " (hint)"
        } else {
            ""
        };
        println!("{:<20} {}{}", label, field.resolved(), marker);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::new(&cli.data_dir, cli.api_key.clone()).with_account(cli.account.clone());
    let store = match &cli.session {
        Some(path) => SessionStore::new(path),
        None => SessionStore::at_config_root(),
    };

    match cli.command {
        Commands::Search { query, limit } => {
            let directory = load_directory(&config)?;
            for record in directory.search(&query, limit) {
                println!("{}\t{}\t{}", record.name, record.level, record.region);
            }
        }
        Commands::Basic {
            name,
            region,
            level,
            year,
            cache_dir,
        } => {
            config.require_api_key()?;
            let source = schoolinfo_source(&config, cache_dir.as_ref())?
                .ok_or_else(|| EcoError::Configuration("SCHOOLINFO_API_KEY is not set".into()))?;
            let request =
                BasicInfoRequest::new(&name, &region, &level).with_year(year_arg(year.as_deref())?);
            let info = Reconciler::new(source).basic_info(&request, current_year())?;
            print_json(&info)?;
        }
        Commands::Energy {
            name,
            region,
            level,
            year,
        } => {
            let energy = load_energy(&config)?;
            let request = EnergyRequest::new(&name)
                .region(region.as_deref())
                .level(level.as_deref())
                .year(year.as_deref());
            print_json(&energy.lookup(&request, current_year())?)?;
        }
        Commands::Pick { school } => {
            let directory = load_directory(&config)?;
            let record = resolve_school(&directory, &school)?;
            let reconciler = schoolinfo_source(&config, None)?.map(Reconciler::new);
            let picker = SchoolPicker::new(reconciler, load_energy(&config)?, current_year());

            let PickOutcome::Fresh(result) = picker.pick(&record) else {
                return Ok(());
            };
            let mut snapshot = store.load()?;
            let form = snapshot.step1.get_or_insert_with(Step1Form::default);
            form.basic.school_name = FieldValue::entered(&record.name);
            // suggestions from a previously picked school must not linger
            form.clear_hints();
            match &result.basic {
                Ok(info) => form.apply_basic_hints(info),
                Err(e) => eprintln!("학교 기본 정보를 불러오지 못했습니다: {}", e),
            }
            match &result.energy {
                Ok(energy) => form.apply_energy_hints(energy),
                Err(e) => eprintln!("에너지 사용량을 불러오지 못했습니다: {}", e),
            }
            show_form(form);
            store.save(&snapshot)?;
        }
        Commands::Form { action } => {
            let mut snapshot = store.load()?;
            match action {
                FormAction::Set { field, value } => {
                    let form = snapshot.step1.get_or_insert_with(Step1Form::default);
                    *field.slot(form) = FieldValue::entered(&value);
                    store.save(&snapshot)?;
                }
                FormAction::Show => show_form(snapshot.step1.as_ref().unwrap_or(&Step1Form::default())),
                FormAction::Check => {
                    let mut wizard = Wizard::default();
                    match wizard.advance(&snapshot) {
                        Ok(step) => println!("Step 1 complete; next is step {}", step),
                        Err(EcoError::IncompleteStep { missing }) => {
                            println!("필수 입력 항목을 모두 입력해주세요: {}", missing.join(", "));
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Commands::Calc {
            electricity,
            gas,
            water,
        } => {
            let input = if electricity.is_none() && gas.is_none() && water.is_none() {
                store
                    .load()?
                    .step1
                    .map(|form| form.emission_input())
                    .unwrap_or_default()
            } else {
                EmissionInput::new(
                    electricity.as_deref().unwrap_or(""),
                    gas.as_deref().unwrap_or(""),
                    water.as_deref().unwrap_or(""),
                )
            };
            print_json(&EmissionView::from(&calculate(&input)))?;
        }
        Commands::Practice { action } => {
            let mut snapshot = store.load()?;
            match action {
                PracticeAction::List => {
                    for category in PracticeCategory::ALL {
                        println!("{}", category.title());
                        for practice in category.items() {
                            let mark = if snapshot.step2.is_adopted(practice.id) {
                                "[x]"
                            } else {
                                "[ ]"
                            };
                            println!("  {} {:<11} {}", mark, practice.id, practice.label);
                        }
                    }
                }
                PracticeAction::Toggle { id } => {
                    let adopted = snapshot.step2.toggle(&id)?;
                    store.save(&snapshot)?;
                    println!("{} {}", if adopted { "[x]" } else { "[ ]" }, id);
                }
                PracticeAction::Status => {
                    for p in snapshot.step2.category_progress() {
                        println!("{}: {}/{} ({}%)", p.title, p.selected, p.total, p.percent);
                    }
                    println!(
                        "total: {}/{}",
                        snapshot.step2.total_selected(),
                        CATALOG.len()
                    );
                }
            }
        }
        Commands::Session { action } => match action {
            SessionAction::Show => print_json(&store.load_storage()?)?,
            SessionAction::Clear => {
                store.clear()?;
                println!("Session cleared: {}", store.path().display());
            }
        },
        Commands::Report { output, font } => {
            let summary = ReportSummary::from_snapshot(&store.load()?)?;
            let output = output.unwrap_or_else(|| {
                PathBuf::from(report_file_name(
                    &summary.school_name,
                    chrono::Local::now().date_naive(),
                ))
            });
            let bytes = render_report_pdf(&summary, font.as_deref())?;
            fs::write(&output, bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            let total = summary
                .total_rounded()
                .map(|t| format!("{} kgCO₂eq", group_thousands(t)))
                .unwrap_or_else(|| "-".to_string());
            println!("{} (총 탄소배출량 {})", output.display(), total);
        }
        Commands::Capture {
            url,
            selector,
            format,
            output,
            chrome_path,
        } => {
            let mut request = CaptureRequest::new(&url);
            request.selector = selector;
            request.format = match format {
                OutputFormat::Png => CaptureFormat::Png,
                OutputFormat::Pdf => CaptureFormat::Pdf,
            };
            request.session_data = Some(store.load_storage()?);
            let capturer = Capturer::new(
                ChromeLauncher::new(chrome_path),
                CaptureSettings::default(),
            );
            let shot = capturer.capture(&request)?;
            fs::write(&output, &shot.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !shot.element_found && request.selector.is_some() {
                eprintln!("Selector not found; saved a full-page screenshot instead");
            }
            println!("{} ({} bytes)", output.display(), shot.bytes.len());
        }
        Commands::ExportCsv {
            output,
            concurrency,
            year,
            allow_empty_basic,
            cache_dir,
        } => {
            let year = year_arg(year.as_deref())?.unwrap_or_else(current_year);
            let mut batch = BatchConfig::from_app(&config, year);
            if let Some(output) = output {
                batch.output = output;
            }
            if let Some(n) = concurrency {
                batch.concurrency = n.max(1);
            }
            if let Some(dir) = cache_dir.as_ref() {
                batch.cache_dir = dir.clone();
            }
            batch.allow_empty_basic = allow_empty_basic;

            let source = schoolinfo_source(&config, None)?;
            let report = BatchExporter::new(batch, source)?.run(current_year())?;
            println!(
                "{} ({} rows, {} groups)",
                report.output.display(),
                report.rows,
                report.groups
            );
        }
        Commands::ImportSchools { csv, output } => {
            let file = fs::File::open(&csv)
                .with_context(|| format!("Failed to open {}", csv.display()))?;
            let directory = SchoolDirectory::import_csv(file)?;
            let output = output.unwrap_or_else(|| config.schools_path());
            directory.save(&output)?;
            info!("Directory imported — records={}", directory.len());
            println!("{} ({} schools)", output.display(), directory.len());
        }
    }

    Ok(())
}
