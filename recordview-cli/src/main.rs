use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use recordview::document::load_records;
use recordview::schema::parse_view_definition;
use recordview::value::{parse_date_bound, DateBound};
use recordview::{
    CsvExporter, ExportScope, FilterRule, PageSpec, SortSpec, Value, ViewController,
};
use std::path::PathBuf;
use std::process;

/// recordview: filter, sort, page and export tabular records from the command line
#[derive(Parser)]
#[command(name = "recordview", version, about)]
struct Cli {
    /// View definition YAML (columns, id field, default sort and filters)
    #[arg(long)]
    view: PathBuf,

    /// Record file (.json, .jsonl, .yaml or .csv)
    #[arg(long)]
    records: PathBuf,

    /// Output format
    #[arg(long, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Yaml,
    Json,
}

#[derive(Args)]
struct QueryArgs {
    /// Exact-match filter (e.g. --filter status=completed)
    #[arg(long = "filter", value_parser = parse_key_value)]
    filters: Vec<(String, String)>,

    /// Set-membership filter (e.g. --in method=Cash,Card)
    #[arg(long = "in", value_parser = parse_key_value)]
    in_sets: Vec<(String, String)>,

    /// Free-text search (e.g. --search method=mpesa)
    #[arg(long = "search", value_parser = parse_key_value)]
    searches: Vec<(String, String)>,

    /// Date range, either side optional (e.g. --date date=2024-01-01..2024-01-31)
    #[arg(long = "date", value_parser = parse_key_value)]
    dates: Vec<(String, String)>,

    /// Sort order (e.g. --sort amount:desc)
    #[arg(long)]
    sort: Option<SortSpec>,
}

#[derive(Subcommand)]
enum Command {
    /// Show one page of the filtered, sorted records
    Query {
        #[command(flatten)]
        query: QueryArgs,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page (default: the view's page size)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Write records as CSV
    Export {
        #[command(flatten)]
        query: QueryArgs,
        /// Record ids to select (repeatable); implies --scope selected
        #[arg(long = "select")]
        select: Vec<String>,
        /// Which records to write: selected, filtered or page
        #[arg(long)]
        scope: Option<ExportScope>,
        /// Comma-separated columns (default: the view's export columns)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Field delimiter
        #[arg(long, default_value_t = ',')]
        delimiter: char,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List distinct values of a field with their counts
    Facets {
        /// Field name
        field: String,
    },

    /// Check the view definition against the record file
    Check,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let definition = parse_view_definition(&cli.view)?;
    let records = load_records(&cli.records)?;
    log::info!(
        "Loaded {} records for view {}",
        records.len(),
        definition.name.as_deref().unwrap_or("<unnamed>")
    );
    let mut view = ViewController::from_definition(&definition, records)?;

    match cli.command {
        Command::Query {
            query,
            page,
            page_size,
        } => {
            apply_query(&mut view, query)?;
            let size = page_size.unwrap_or(definition.page_size);
            view.set_page_spec(PageSpec::new(size, page.saturating_sub(1))?)?;
            print_page(&view, &cli.format)?;
        }

        Command::Export {
            query,
            select,
            scope,
            columns,
            delimiter,
            output,
        } => {
            apply_query(&mut view, query)?;
            let scope = scope.unwrap_or(if select.is_empty() {
                ExportScope::Filtered
            } else {
                ExportScope::Selected
            });
            view.select_all(select);

            let columns = if columns.is_empty() {
                definition.export_column_names()
            } else {
                columns
            };
            let names: Vec<&str> = columns.iter().map(String::as_str).collect();
            let delimiter = u8::try_from(delimiter)
                .map_err(|_| format!("Delimiter '{delimiter}' must be a single-byte character"))?;
            let csv = view.export_csv_with(scope, &names, &CsvExporter::new().delimiter(delimiter))?;

            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .map_err(|e| format!("Failed to write '{}': {e}", path.display()))?;
                    log::info!("Wrote export to {}", path.display());
                }
                None => print!("{csv}"),
            }
        }

        Command::Facets { field } => {
            let facets = view.facet_values(&field)?;
            let value = serde_json::to_value(&facets)?;
            match cli.format {
                OutputFormat::Table => {
                    for facet in &facets {
                        println!("{}\t{}", facet.value, facet.count);
                    }
                }
                _ => print_output(&value, &cli.format)?,
            }
        }

        Command::Check => {
            let info = view.page_info();
            print_output(
                &serde_json::json!({
                    "ok": true,
                    "view": definition.name,
                    "columns": view.accessors().names().collect::<Vec<_>>(),
                    "records": view.store().len(),
                    "version": view.version(),
                    "matching": info.total_count,
                    "pages": info.page_count,
                }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

fn apply_query(
    view: &mut ViewController<serde_json::Value>,
    query: QueryArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    for rule in query_rules(&query)? {
        view.set_filter_rule(rule)?;
    }
    if let Some(sort) = query.sort {
        view.set_sort_spec(Some(sort))?;
    }
    Ok(())
}

fn query_rules(query: &QueryArgs) -> Result<Vec<FilterRule>, String> {
    let mut rules = Vec::new();
    for (field, raw) in &query.filters {
        rules.push(FilterRule::equals(field, arg_to_value(raw)));
    }
    for (field, raw) in &query.in_sets {
        rules.push(FilterRule::in_set(
            field,
            raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(arg_to_value),
        ));
    }
    for (field, text) in &query.searches {
        rules.push(FilterRule::contains(field, text));
    }
    for (field, range) in &query.dates {
        let (start, end) = parse_date_range(range)?;
        rules.push(FilterRule::date_range(field, start, end));
    }
    Ok(rules)
}

/// Numbers and booleans are parsed as JSON; everything else is text
fn arg_to_value(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|json| Value::from_json(&json))
        .unwrap_or_else(|_| Value::Text(raw.to_string()))
}

type DateRange = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

fn parse_date_range(range: &str) -> Result<DateRange, String> {
    let (start, end) = range
        .split_once("..")
        .ok_or_else(|| format!("Invalid date range '{range}': expected START..END"))?;
    let bound = |text: &str, kind: DateBound| -> Result<Option<DateTime<Utc>>, String> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse_date_bound(text, kind)
            .map(Some)
            .ok_or_else(|| format!("Invalid date '{text}'"))
    };
    Ok((bound(start, DateBound::Start)?, bound(end, DateBound::End)?))
}

fn print_page(
    view: &ViewController<serde_json::Value>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = view.page_info();
    match format {
        OutputFormat::Table => {
            let rows = view.export_rows(ExportScope::CurrentPage, &[])?;
            let labels: Vec<&str> = view.accessors().fields().iter().map(|f| f.label.as_str()).collect();
            let mut widths: Vec<usize> = labels.iter().map(|l| l.chars().count()).collect();
            for row in &rows {
                for (width, cell) in widths.iter_mut().zip(row.values()) {
                    *width = (*width).max(cell.chars().count());
                }
            }
            print_table_line(labels.iter().copied(), &widths);
            for row in &rows {
                print_table_line(row.values(), &widths);
            }
            println!(
                "-- page {} of {} ({} records)",
                info.page_index + 1,
                info.page_count,
                info.total_count
            );
        }
        _ => {
            let page = view.page();
            print_output(
                &serde_json::json!({
                    "page": serde_json::to_value(info)?,
                    "rows": page.rows,
                }),
                format,
            )?;
        }
    }
    Ok(())
}

fn print_table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    println!("{}", line.join("  ").trim_end());
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml | OutputFormat::Table => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
