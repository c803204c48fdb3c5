use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use ped_core::{compile_pattern, load_records, save_records_to_file};
use ped_subs::{Column, SubstitutionSet, XliffProvider};
use std::path::PathBuf;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn required<'a, T>(matches: &'a ArgMatches, id: &str) -> CliResult<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(id)
        .ok_or_else(|| format!("missing argument <{}>", id).into())
}

fn path_arg(id: &'static str, help: &'static str, index: usize) -> Arg {
    Arg::new(id)
        .help(help)
        .required(true)
        .index(index)
        .value_parser(value_parser!(PathBuf))
}

fn cli() -> Command {
    Command::new("ped-subs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Apply substitution rule sets to MT output and measure post-edit density")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log per-entry effects and per-file details")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("score")
                .about("Print the document PED of a record export")
                .arg(path_arg("records", "JSON or CSV file, or a directory of them", 1)),
        )
        .subcommand(
            Command::new("filter")
                .about("Print the rows whose column matches a pattern")
                .arg(path_arg("records", "JSON or CSV file, or a directory of them", 1))
                .arg(
                    Arg::new("pattern")
                        .help("Regular expression")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::new("column")
                        .long("column")
                        .short('c')
                        .help("Column to search: source, target or mt (default: source)")
                        .default_value("source"),
                ),
        )
        .subcommand(
            Command::new("apply-table")
                .about("Run a rule set over records, scoring every entry")
                .arg(path_arg("rules", "Rule set JSON file", 1))
                .arg(path_arg("records", "JSON or CSV file, or a directory of them", 2))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Write the updated records to this file")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("save-rules")
                        .long("save-rules")
                        .help("Write the re-ranked rule set to this file")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("apply-files")
                .about("Run a rule set over XLIFF files and write them back")
                .arg(path_arg("rules", "Rule set JSON file", 1))
                .arg(
                    Arg::new("paths")
                        .help("XLIFF files or directories containing them")
                        .required(true)
                        .num_args(1..)
                        .index(2)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .short('n')
                        .help("Report changes without writing files")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn main() -> CliResult<()> {
    let matches = cli().get_matches();

    let default_level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match matches.subcommand() {
        Some(("score", sub)) => score(sub),
        Some(("filter", sub)) => filter(sub),
        Some(("apply-table", sub)) => apply_table(sub),
        Some(("apply-files", sub)) => apply_files(sub),
        _ => Err("unknown subcommand".into()),
    }
}

fn score(matches: &ArgMatches) -> CliResult<()> {
    let mut store = load_records(required::<PathBuf>(matches, "records")?)?;
    let ped = store.score()?;
    println!("Rows: {}", store.len());
    println!("PED:  {:.4}", ped);
    Ok(())
}

fn filter(matches: &ArgMatches) -> CliResult<()> {
    let store = load_records(required::<PathBuf>(matches, "records")?)?;
    let pattern = compile_pattern(required::<String>(matches, "pattern")?)?;
    let column: Column = required::<String>(matches, "column")?.parse()?;

    let rows = store.filter_by_regex(column, &pattern);
    for &row in &rows {
        if let Some(record) = store.get(row) {
            println!("[{}] {}", row, record.source);
            println!("    mt:     {}", record.mt);
            if let Some(target) = &record.target {
                println!("    target: {}", target);
            }
        }
    }
    println!("{} of {} rows match", rows.len(), store.len());
    Ok(())
}

fn apply_table(matches: &ArgMatches) -> CliResult<()> {
    let mut set = SubstitutionSet::load_from_json(required::<PathBuf>(matches, "rules")?)?;
    let mut store = load_records(required::<PathBuf>(matches, "records")?)?;

    let run = set.apply_to_table(&mut store)?;
    if let Some(baseline) = run.baseline() {
        println!("Baseline PED: {:.4}", baseline);
        for (effect, score) in run.effects.iter().zip(run.scores.iter().skip(1)) {
            println!(
                "  [{}] {:<40} effect {:+.4}  PED {:.4}  ({} rows)",
                effect.id, effect.label, effect.effect, score, effect.invalidated
            );
        }
        println!("Aggregate effect: {:+.4}", run.aggregate_effect);
    } else {
        println!("Rule set is empty");
    }

    if let Some(output) = matches.get_one::<PathBuf>("output") {
        save_records_to_file(&store, output)?;
        println!("Records written to {}", output.display());
    }
    if let Some(rules) = matches.get_one::<PathBuf>("save-rules") {
        set.save_to_json(rules)?;
        println!("Ranked rule set written to {}", rules.display());
    }
    Ok(())
}

fn apply_files(matches: &ArgMatches) -> CliResult<()> {
    let set = SubstitutionSet::load_from_json(required::<PathBuf>(matches, "rules")?)?;
    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("paths")
        .map(|paths| paths.cloned().collect())
        .unwrap_or_default();
    let write = !matches.get_flag("dry-run");

    let provider = XliffProvider::new();
    let paths = provider.expand_paths(&inputs)?;
    let report = set.apply_to_tree_batch(&paths, &provider, write);

    for (path, file) in &report.files {
        println!(
            "{}: {} of {} units changed{}",
            path.display(),
            file.run.changed,
            file.run.units,
            if file.written { ", written" } else { "" }
        );
        for failure in &file.run.failures {
            println!(
                "    unit {} ({}): {}",
                failure.unit,
                failure.unit_id.as_deref().unwrap_or("?"),
                failure.error
            );
        }
    }
    for (path, error) in &report.failed {
        eprintln!("{}: {}", path.display(), error);
    }
    println!(
        "{} files, {} units changed, {} unit failures, {} files failed",
        report.files.len(),
        report.changed_units(),
        report.unit_failures(),
        report.failed.len()
    );
    Ok(())
}
