use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use services::{AppServices, Clock, LoadError, QuestionLoader};
use survey_core::model::{Country, ModelId, UserId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidModel { raw: String },
    InvalidUser { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidModel { raw } => write!(f, "invalid --model value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Questions,
    Counts,
    Attribution,
    Progress,
    Dashboard,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "questions" => Some(Self::Questions),
            "counts" => Some(Self::Counts),
            "attribution" => Some(Self::Attribution),
            "progress" => Some(Self::Progress),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    dataset_url: Option<String>,
    dataset_dir: Option<PathBuf>,
    models: Vec<ModelId>,
    country: Option<Country>,
    user: Option<UserId>,
    shuffle: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- questions   --model <m> --country <c> [--no-shuffle]");
    eprintln!("  cargo run -p app -- counts      --country <c> --model <m> [--model <m>]...");
    eprintln!("  cargo run -p app -- attribution");
    eprintln!("  cargo run -p app -- progress    --user <id> [--country <c>] [--model <m>]...");
    eprintln!("  cargo run -p app -- dashboard   [--country <c> --model <m>...]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://survey.sqlite3)");
    eprintln!("  --dataset-url <url>       Base URL of the dataset files");
    eprintln!("  --dataset-dir <dir>       Directory with <model>.csv and attribution.csv");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SURVEY_DB_URL, SURVEY_DATASET_URL, SURVEY_DATASET_DIR,");
    eprintln!("  SURVEY_DATASET_TEMPLATE, SURVEY_ATTRIBUTION_FILE, RUST_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("SURVEY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://survey.sqlite3".into(), normalize_sqlite_url);
        let mut dataset_url = std::env::var("SURVEY_DATASET_URL").ok();
        let mut dataset_dir = std::env::var("SURVEY_DATASET_DIR").ok().map(PathBuf::from);
        let mut models = Vec::new();
        let mut country = None;
        let mut user = None;
        let mut shuffle = true;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--dataset-url" => dataset_url = Some(require_value(args, "--dataset-url")?),
                "--dataset-dir" => {
                    dataset_dir = Some(PathBuf::from(require_value(args, "--dataset-dir")?));
                }
                "--model" => {
                    let value = require_value(args, "--model")?;
                    let model = ModelId::new(&value)
                        .map_err(|_| ArgsError::InvalidModel { raw: value.clone() })?;
                    if !models.contains(&model) {
                        models.push(model);
                    }
                }
                "--country" => country = Some(Country::new(require_value(args, "--country")?)),
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user = Some(
                        UserId::new(value.clone())
                            .map_err(|_| ArgsError::InvalidUser { raw: value })?,
                    );
                }
                "--no-shuffle" => shuffle = false,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            dataset_url,
            dataset_dir,
            models,
            country,
            user,
            shuffle,
        })
    }

    fn country(&self) -> Result<&Country, ArgsError> {
        self.country
            .as_ref()
            .ok_or(ArgsError::MissingFlag { flag: "--country" })
    }

    fn first_model(&self) -> Result<&ModelId, ArgsError> {
        self.models
            .first()
            .ok_or(ArgsError::MissingFlag { flag: "--model" })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

async fn questions(loader: &QuestionLoader, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let model = args.first_model()?;
    let country = args.country()?;
    let base = loader.content_base();
    let set = match loader.clone().with_shuffle(args.shuffle).load(model, country).await {
        Ok(set) => set,
        Err(err @ (LoadError::NoData { .. } | LoadError::NoQuestions { .. })) => {
            println!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    for q in &set.questions {
        println!(
            "[{}/{}] {}  {}/{}/{}",
            q.index() + 1,
            q.total(),
            q.id(),
            q.category(),
            q.sub_category(),
            q.variant()
        );
        for shown in q.images() {
            let location = base
                .as_ref()
                .and_then(|b| shown.image.resolve(b))
                .map_or_else(|| shown.image.to_string(), |u| u.to_string());
            println!("    {:<6} {location}", shown.step.label());
        }
    }
    Ok(())
}

async fn counts(loader: &QuestionLoader, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let country = args.country()?;
    args.first_model()?;
    for (model, count) in loader.count_questions(&args.models, country).await {
        println!("{model:<12} {count}");
    }
    Ok(())
}

async fn attribution(loader: &QuestionLoader) -> Result<(), Box<dyn std::error::Error>> {
    let questions = match loader.load_attribution().await {
        Ok(questions) => questions,
        Err(err @ LoadError::NoData { .. }) => {
            println!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    for q in questions {
        let outputs: Vec<String> = q.outputs.iter().map(|o| o.model.to_string()).collect();
        println!(
            "[{}/{}] {}  {}  step {}  ({})",
            q.index + 1,
            q.total,
            q.id,
            q.country.display_name(),
            q.step,
            outputs.join(", ")
        );
    }
    Ok(())
}

async fn progress(services: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let user = args
        .user
        .as_ref()
        .ok_or(ArgsError::MissingFlag { flag: "--user" })?;
    let tracker = services.progress();
    let Some(stored) = tracker.progress_for(user).await? else {
        println!("no progress stored for {user}");
        return Ok(());
    };

    let models = if args.models.is_empty() {
        stored.models()
    } else {
        args.models.clone()
    };
    let totals: BTreeMap<ModelId, usize> = match &args.country {
        Some(country) => services.loader().count_questions(&models, country).await,
        None => BTreeMap::new(),
    };

    for model in &models {
        match totals.get(model) {
            Some(&total) => {
                let point = tracker.resume(user, model, total).await?;
                let repaired = if point.repaired { "  (reset)" } else { "" };
                println!(
                    "{model:<12} {}/{total}  {:?}{repaired}",
                    point.index, point.state
                );
            }
            None => println!(
                "{model:<12} index {}  completed {}",
                stored.current_index(model),
                stored.completed_for(model).len()
            ),
        }
    }
    Ok(())
}

async fn dashboard(services: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let dashboard = services.dashboard();

    if let Some(country) = &args.country {
        let totals = services.loader().count_questions(&args.models, country).await;
        println!("Participant progress ({})", country.display_name());
        for row in dashboard.user_progress(&totals).await? {
            let name = row.display_name.as_deref().unwrap_or("-");
            println!(
                "  {:<24} {:<20} {:>4}/{:<4} {:>5.1}%",
                row.user_id.as_str(),
                name,
                row.completed,
                row.total,
                row.percent
            );
            for m in &row.models {
                println!(
                    "      {:<12} {:>4}/{:<4} {:>5.1}%",
                    m.model.as_str(),
                    m.completed,
                    m.total,
                    m.percent
                );
            }
        }
        println!();
    }

    let stats = dashboard.response_stats().await?;
    println!("Survey responses");
    for model in &stats.models {
        println!("  {} ({} responses)", model.model, model.responses);
        for (choice, means) in model.choices.iter().zip(&model.means) {
            println!(
                "    {:<6} best {:>4}  worst {:>4}  quality {:.2}  cultural {:.2}",
                choice.step.label(),
                choice.best,
                choice.worst,
                means.image_quality,
                means.cultural_representativeness
            );
        }
        for best in &model.best_by_country {
            println!(
                "    favourite in {}: {}",
                best.country.display_name(),
                best.best_step.label()
            );
        }
    }

    println!();
    println!("Attribution ratings");
    for output in dashboard.attribution_stats().await? {
        println!(
            "  {:<8} n={:<4} prompt {:.2}  cultural {:.2}  quality {:.2}  preferred {}",
            output.model.as_str(),
            output.samples,
            output.prompt_adherence,
            output.cultural_representativeness,
            output.image_quality,
            output.preferred
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let source =
        AppServices::dataset_source(args.dataset_url.as_deref(), args.dataset_dir.as_deref())?;

    // Open and migrate SQLite before any command runs.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::default_clock(), source).await?;
    info!(db = %args.db_url, "storage ready");

    match cmd {
        Command::Questions => questions(services.loader(), &args).await,
        Command::Counts => counts(services.loader(), &args).await,
        Command::Attribution => attribution(services.loader()).await,
        Command::Progress => progress(&services, &args).await,
        Command::Dashboard => dashboard(&services, &args).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_owned());
        Args::parse(&mut iter)
    }

    #[test]
    fn repeated_models_are_deduplicated() {
        let args = parse(&["--model", "Flux", "--model", "flux", "--model", "qwen"]).unwrap();
        let names: Vec<&str> = args.models.iter().map(ModelId::as_str).collect();
        assert_eq!(names, vec!["flux", "qwen"]);
        assert!(args.shuffle);
    }

    #[test]
    fn missing_values_and_unknown_flags_are_errors() {
        assert!(matches!(
            parse(&["--country"]),
            Err(ArgsError::MissingValue { flag: "--country" })
        ));
        assert!(matches!(
            parse(&["--colour", "red"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(&["--user", "  "]),
            Err(ArgsError::InvalidUser { .. })
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/survey.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/survey.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
