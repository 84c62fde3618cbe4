//! `adaptctl` - CLI for the adaptive engine
//!
//! This binary records answers, imports content and history, calibrates item
//! parameters and queries the adaptive policy from the command line.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, Table};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use adaptive_engine::calibration::{CalibrationOptions, Calibrator};
use adaptive_engine::cli::{
    CalibrateCommand, Cli, Command, ConfigCommand, EvaluateCommand, ImportCommand, LearnerCommand,
    NextCommand, OutputFormat, ParamsCommand, RecordCommand, SeedCommand, SessionCommand,
};
use adaptive_engine::evaluation::run_evaluation;
use adaptive_engine::policy::{define_session_params, ItemSelector, SessionField};
use adaptive_engine::storage::AttemptFilter;
use adaptive_engine::synthetic::{seed_synthetic_attempts, SeedOptions};
use adaptive_engine::{
    init_logging, AdaptiveEngine, Attempt, AttemptInput, Config, Course, Error, Item,
    KnowledgeComponent, Learner, Storage,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Configuration commands must work even when the database cannot open.
    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd, cli.format);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    let db_path = config.database_path();
    let storage = Storage::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let format = cli.format;

    match cli.command {
        Command::Learner(cmd) => handle_learner(&storage, &config, cmd, format),
        Command::Record(cmd) => handle_record(&storage, &config, cmd, format),
        Command::Import(cmd) => handle_import(&storage, &config, cmd, format),
        Command::Calibrate(cmd) => handle_calibrate(&storage, &config, cmd, format),
        Command::Params(cmd) => handle_params(&storage, &config, cmd, format),
        Command::Session(cmd) => handle_session(&storage, &config, cmd, format),
        Command::Next(cmd) => handle_next(&storage, &config, &cmd, format),
        Command::Evaluate(cmd) => handle_evaluate(&storage, &config, &cmd, format),
        Command::Seed(cmd) => handle_seed(&storage, cmd, format),
        Command::Status => handle_status(&storage, format),
        Command::Config(cmd) => handle_config(cli.config, cmd, format),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rng_from(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

fn handle_learner(
    storage: &Storage,
    config: &Config,
    cmd: LearnerCommand,
    format: OutputFormat,
) -> Result<()> {
    let engine = AdaptiveEngine::new(storage, config);
    match cmd {
        LearnerCommand::Show { user, course } => {
            let learners: Vec<Learner> = match course {
                Some(course) => engine.find_learner(&user, &course)?.into_iter().collect(),
                None => storage.learners_for_user(&user)?,
            };
            if learners.is_empty() {
                return Err(Error::not_found("learner", user).into());
            }
            match format {
                OutputFormat::Json => print_json(&learners)?,
                OutputFormat::Table => {
                    let mut table = Table::new();
                    table.set_header(vec!["Course", "Mastery", "Ability", "Updated"]);
                    for learner in &learners {
                        table.add_row(vec![
                            Cell::new(&learner.course_id),
                            Cell::new(format!("{:.4}", learner.mastery)),
                            Cell::new(format!("{:.4}", learner.ability)),
                            Cell::new(learner.updated_at.to_rfc3339()),
                        ]);
                    }
                    println!("{table}");
                }
                OutputFormat::Plain => {
                    for learner in &learners {
                        println!(
                            "{} / {}: mastery {:.4}, ability {:.4}",
                            learner.user_id, learner.course_id, learner.mastery, learner.ability
                        );
                    }
                }
            }
        }
        LearnerCommand::Components { user, course } => {
            let learner = engine
                .find_learner(&user, &course)?
                .ok_or_else(|| Error::not_found("learner", format!("{user}/{course}")))?;
            let masteries = engine.component_masteries(&learner)?;
            match format {
                OutputFormat::Json => print_json(&masteries)?,
                OutputFormat::Table => {
                    let mut table = Table::new();
                    table.set_header(vec!["Component", "Mastery", "Updated"]);
                    for mastery in &masteries {
                        table.add_row(vec![
                            Cell::new(&mastery.component_id),
                            Cell::new(format!("{:.4}", mastery.mastery)),
                            Cell::new(mastery.updated_at.to_rfc3339()),
                        ]);
                    }
                    println!("{table}");
                }
                OutputFormat::Plain => {
                    if masteries.is_empty() {
                        println!("No component mastery recorded.");
                    }
                    for mastery in &masteries {
                        println!("{}: {:.4}", mastery.component_id, mastery.mastery);
                    }
                }
            }
        }
    }
    Ok(())
}

fn handle_record(
    storage: &Storage,
    config: &Config,
    cmd: RecordCommand,
    format: OutputFormat,
) -> Result<()> {
    let input = AttemptInput {
        user_id: cmd.user,
        item_id: cmd.item,
        session_id: cmd.session,
        success_ratio: cmd.success_ratio,
        is_correct: cmd.correct,
        time_spent: cmd.time_spent,
        timestamp: cmd.at,
    };
    let outcome = AdaptiveEngine::new(storage, config).record_attempt(&input)?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }
    if outcome.duplicate {
        println!("Duplicate attempt; nothing changed.");
        return Ok(());
    }
    if let Some(id) = outcome.attempt_id {
        println!("Recorded attempt {id}.");
    }
    match &outcome.update {
        Some(update) => {
            println!(
                "Mastery {:.4} -> {:.4}, ability {:.4} -> {:.4} ({} params)",
                update.previous_mastery,
                update.learner.mastery,
                update.previous_ability,
                update.learner.ability,
                update.params_source
            );
            for component in &update.components {
                println!(
                    "  {}: {:.4} -> {:.4}",
                    component.component_id, component.previous, component.mastery
                );
            }
        }
        None => println!("Learner unchanged (ungraded or outside a session)."),
    }
    Ok(())
}

/// Parse one JSON object per non-blank line from `path`, or stdin for `-`.
fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| Error::ImportLine {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn handle_import(
    storage: &Storage,
    config: &Config,
    cmd: ImportCommand,
    format: OutputFormat,
) -> Result<()> {
    let (kind, read, written) = match cmd {
        ImportCommand::Courses { file } => {
            let courses: Vec<Course> = read_json_lines(&file)?;
            storage.transaction(|store| {
                courses.iter().try_for_each(|c| store.upsert_course(c))
            })?;
            ("courses", courses.len(), courses.len())
        }
        ImportCommand::Components { file } => {
            let components: Vec<KnowledgeComponent> = read_json_lines(&file)?;
            storage.transaction(|store| {
                components.iter().try_for_each(|c| store.upsert_component(c))
            })?;
            ("components", components.len(), components.len())
        }
        ImportCommand::Items { file } => {
            let items: Vec<Item> = read_json_lines(&file)?;
            storage.transaction(|store| items.iter().try_for_each(|i| store.upsert_item(i)))?;
            ("items", items.len(), items.len())
        }
        ImportCommand::Attempts { file } => {
            let attempts: Vec<Attempt> = read_json_lines(&file)?;
            let engine = AdaptiveEngine::new(storage, config);
            let inserted = storage.transaction(|_| {
                let mut inserted = 0_usize;
                for attempt in &attempts {
                    if engine.import_attempt(attempt)?.is_some() {
                        inserted += 1;
                    }
                }
                Ok(inserted)
            })?;
            ("attempts", attempts.len(), inserted)
        }
    };

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "kind": kind,
            "read": read,
            "written": written,
        }));
    }
    println!("Imported {written} of {read} {kind}.");
    Ok(())
}

fn handle_calibrate(
    storage: &Storage,
    config: &Config,
    cmd: CalibrateCommand,
    format: OutputFormat,
) -> Result<()> {
    let mut options = CalibrationOptions::from_config(&config.calibration);
    options.course_id = cmd.course;
    if let Some(min_attempts) = cmd.min_attempts {
        options.min_attempts = min_attempts;
    }
    if let Some(label) = cmd.label {
        options.version = label;
    }
    if let Some(source) = cmd.source {
        options.source = source;
    }

    let summary = Calibrator::new(storage).run(&options)?;
    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!(
        "Calibrated {} items as version {} ({} below {} attempts, {} without metadata).",
        summary.calibrated,
        summary.version,
        summary.below_threshold,
        options.min_attempts,
        summary.missing_metadata
    );
    Ok(())
}

fn handle_params(
    storage: &Storage,
    config: &Config,
    cmd: ParamsCommand,
    format: OutputFormat,
) -> Result<()> {
    let ParamsCommand::Show { item, all } = cmd;

    if all {
        let versions = storage.item_params_versions(&item)?;
        match format {
            OutputFormat::Json => print_json(&versions)?,
            OutputFormat::Plain | OutputFormat::Table => {
                let mut table = Table::new();
                table.set_header(vec!["Version", "Latest", "a", "b", "c", "Attempts", "Source"]);
                for record in &versions {
                    table.add_row(vec![
                        Cell::new(&record.version),
                        Cell::new(if record.is_latest { "yes" } else { "" }),
                        Cell::new(format!("{:.4}", record.params.discrimination)),
                        Cell::new(format!("{:.4}", record.params.difficulty)),
                        Cell::new(format!("{:.4}", record.params.guessing)),
                        Cell::new(record.attempts),
                        Cell::new(record.source.as_deref().unwrap_or("-")),
                    ]);
                }
                println!("{table}");
            }
        }
        return Ok(());
    }

    let stored = storage
        .get_item(&item)?
        .ok_or_else(|| Error::not_found("item", &item))?;
    let (params, source) =
        AdaptiveEngine::new(storage, config).resolve_item_params(&stored, None)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "item_id": stored.id,
            "params": params,
            "source": source,
        }))?,
        OutputFormat::Plain | OutputFormat::Table => {
            println!("Item:           {}", stored.id);
            println!("Source:         {source}");
            println!("Discrimination: {:.4}", params.discrimination);
            println!("Difficulty:     {:.4}", params.difficulty);
            println!("Guessing:       {:.4}", params.guessing);
        }
    }
    Ok(())
}

fn handle_session(
    storage: &Storage,
    config: &Config,
    cmd: SessionCommand,
    format: OutputFormat,
) -> Result<()> {
    let fields: Vec<SessionField> = if cmd.fields.is_empty() {
        SessionField::ALL.to_vec()
    } else {
        cmd.fields.into_iter().map(SessionField::from).collect()
    };

    let learner =
        AdaptiveEngine::new(storage, config).get_or_create_learner(&cmd.user, &cmd.course)?;
    let params = define_session_params(&learner, &fields, &config.policy);

    match format {
        OutputFormat::Json => print_json(&params)?,
        OutputFormat::Plain | OutputFormat::Table => {
            let value = serde_json::to_value(&params)?;
            let mut table = Table::new();
            table.set_header(vec!["Field", "Value"]);
            for field in &fields {
                let shown = match value.get(field.as_str()) {
                    Some(serde_json::Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => "-".to_string(),
                };
                table.add_row(vec![Cell::new(field), Cell::new(shown)]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn handle_next(
    storage: &Storage,
    config: &Config,
    cmd: &NextCommand,
    format: OutputFormat,
) -> Result<()> {
    let mut rng = rng_from(cmd.seed);
    let selection = ItemSelector::new(storage, config).next_item(
        &cmd.user,
        &cmd.course,
        cmd.session.as_deref(),
        &mut rng,
    )?;

    match (format, selection) {
        (OutputFormat::Json, selection) => print_json(&selection)?,
        (_, Some(selection)) => {
            println!(
                "{} ({}, {}){}",
                selection.item.id,
                selection.item.difficulty,
                selection.item.mcq_type,
                if selection.fallback { " [fallback]" } else { "" }
            );
        }
        (_, None) => println!("No item left to offer."),
    }
    Ok(())
}

fn handle_evaluate(
    storage: &Storage,
    config: &Config,
    cmd: &EvaluateCommand,
    format: OutputFormat,
) -> Result<()> {
    let attempts = storage.attempts(&AttemptFilter {
        course_id: cmd.course.as_deref(),
        graded_only: true,
        ..Default::default()
    })?;
    let items = storage.all_items()?;
    let params = storage.latest_params_map()?;

    let scorecard = run_evaluation(&attempts, &items, params, config);
    if let Some(out) = &cmd.out {
        scorecard
            .write_json(out)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }
    if let Some(csv) = &cmd.csv {
        scorecard
            .write_csv(csv)
            .with_context(|| format!("failed to write {}", csv.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&scorecard)?,
        OutputFormat::Plain | OutputFormat::Table => {
            println!(
                "Split: {} train / {} validation / {} test",
                scorecard.splits.train, scorecard.splits.validation, scorecard.splits.test
            );
            println!("{}", scorecard.to_table());
        }
    }
    Ok(())
}

fn handle_seed(storage: &Storage, cmd: SeedCommand, format: OutputFormat) -> Result<()> {
    let options = SeedOptions {
        user_id: cmd.user,
        course_id: cmd.course,
        attempts_per_item: cmd.attempts_per_item,
        min_success_ratio: cmd.min_ratio,
        max_success_ratio: cmd.max_ratio,
    };
    let mut rng = rng_from(cmd.seed);
    let summary = seed_synthetic_attempts(storage, &options, &mut rng)?;

    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!(
        "Seeded {} attempts over {} items for {} in {}.",
        summary.inserted, summary.items, options.user_id, options.course_id
    );
    Ok(())
}

fn handle_status(storage: &Storage, format: OutputFormat) -> Result<()> {
    let stats = storage.stats()?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
        }))?,
        OutputFormat::Plain | OutputFormat::Table => {
            let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
                t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
            };
            println!("adaptctl status");
            println!("---------------");
            println!("Database:        {}", storage.path().display());
            println!("Size:            {} bytes", stats.db_size_bytes);
            println!("Courses:         {}", stats.courses);
            println!("Items:           {}", stats.items);
            println!("Calibrated:      {}", stats.calibrated_items);
            println!("Learners:        {}", stats.learners);
            println!(
                "Attempts:        {} ({} graded)",
                stats.attempts, stats.graded_attempts
            );
            println!("Oldest attempt:  {}", when(stats.oldest_attempt));
            println!("Newest attempt:  {}", when(stats.newest_attempt));
        }
    }
    Ok(())
}

fn handle_config(
    config_path: Option<std::path::PathBuf>,
    cmd: ConfigCommand,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let config = Config::load_from(config_path).context("failed to load configuration")?;
            if format == OutputFormat::Json {
                print_json(&config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[BKT]");
                println!("  Guessing:           {}", config.bkt.guessing_probability);
                println!("  Slipping:           {}", config.bkt.slipping_probability);
                println!("  Learning rate:      {}", config.bkt.learning_rate);
                println!("  Initial mastery:    {}", config.bkt.initial_mastery);
                println!("  Corrected update:   {}", config.bkt.corrected);
                println!();
                println!("[IRT]");
                println!("  Prior mean:         {}", config.irt.prior_mean);
                println!("  Prior variance:     {}", config.irt.prior_variance);
                println!("  Learning rate:      {}", config.irt.learning_rate);
                println!();
                println!("[Policy]");
                println!("  Epsilon:            {}", config.policy.epsilon);
                println!(
                    "  Difficulty bands:   easy < {} <= medium < {} <= hard",
                    config.policy.easy_below, config.policy.hard_from
                );
                println!(
                    "  Avoid repeats:      {} min",
                    config.policy.avoid_repeat_minutes
                );
                println!();
                println!("[Calibration]");
                println!("  Min attempts:       {}", config.calibration.min_attempts);
                println!();
                println!("[Evaluation]");
                println!(
                    "  Success threshold:  {}",
                    config.evaluation.success_threshold
                );
                println!(
                    "  Split:              {} / {}",
                    config.evaluation.train_ratio, config.evaluation.validation_ratio
                );
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                config_path
                    .unwrap_or_else(Config::default_config_path)
                    .display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            Config::load_from(Some(path.clone()))
                .with_context(|| format!("invalid configuration: {}", path.display()))?;
            println!("Configuration is valid: {}", path.display());
        }
    }
    Ok(())
}
