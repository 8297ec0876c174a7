use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use metacatalog::add::{
    NewEntry, NewLicense, NewPerson, add_details_to_entry, add_entry, add_group,
    add_keyword, add_keywords_to_entry, add_license, add_person, add_persons_to_entry,
    add_variable, create_datasource,
};
use metacatalog::app::App;
use metacatalog::config::{ConfigLoader, ResolvedConfig};
use metacatalog::data::DataFilter;
use metacatalog::domain::{DataSourceKind, Detail, Location, Lookup, RecordId, parse_timestamp, parse_uuid};
use metacatalog::error::CatalogError;
use metacatalog::find::{EntryQuery, GroupQuery, PersonQuery, VersionFilter};
use metacatalog::output::JsonOutput;
use metacatalog::store::Store;

#[derive(Parser)]
#[command(name = "metacatalog")]
#[command(about = "Metadata catalog for environmental datasets")]
#[command(version, author)]
struct Cli {
    /// Config file (default: ./metacatalog.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Catalog file, overrides the config
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the catalog and install default lookup records")]
    Init,
    #[command(about = "Add records to the catalog")]
    Add(AddArgs),
    #[command(about = "Search the catalog")]
    Find(FindArgs),
    #[command(about = "Show the consolidated metadata of a UUID")]
    Show { uuid: String },
    #[command(about = "Load the data of a UUID")]
    Data(DataArgs),
    #[command(about = "Import a JSON records file as internal data of an entry")]
    Import { entry: RecordId, file: Utf8PathBuf },
    #[command(about = "Append a JSON records file to the internal data of an entry")]
    Append { entry: RecordId, file: Utf8PathBuf },
    #[command(about = "Delete the internal data of an entry")]
    Delete {
        entry: RecordId,
        /// Also remove the datasource record
        #[arg(long)]
        delete_source: bool,
    },
}

#[derive(Args)]
struct AddArgs {
    #[command(subcommand)]
    command: AddCommand,
}

#[derive(Subcommand)]
enum AddCommand {
    Person {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        affiliation: Option<String>,
        #[arg(long)]
        organisation: Option<String>,
    },
    License {
        #[arg(long)]
        short_title: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        link: Option<String>,
    },
    Variable {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        unit: String,
        #[arg(long = "column")]
        columns: Vec<String>,
    },
    Keyword { path: String },
    Entry(EntryArgs),
    Coauthor {
        #[arg(long)]
        entry: RecordId,
        #[arg(long = "person", required = true)]
        persons: Vec<String>,
        #[arg(long, default_value = "coAuthor")]
        role: String,
    },
    Tag {
        #[arg(long)]
        entry: RecordId,
        #[arg(long = "keyword", required = true)]
        keywords: Vec<String>,
        #[arg(long)]
        alias: Option<String>,
    },
    Group {
        #[arg(long = "type")]
        group_type: String,
        #[arg(long = "entry", required = true)]
        entries: Vec<RecordId>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Datasource {
        #[arg(long)]
        entry: RecordId,
        #[arg(long = "type", default_value = "internal")]
        kind: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        index: Option<String>,
    },
    Detail {
        #[arg(long)]
        entry: RecordId,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Args)]
struct EntryArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    #[arg(long)]
    variable: String,
    #[arg(long)]
    license: Option<String>,
    #[arg(long = "abstract")]
    abstract_text: Option<String>,
    #[arg(long)]
    external_id: Option<String>,
    #[arg(long, requires = "lat")]
    lon: Option<f64>,
    #[arg(long, requires = "lon")]
    lat: Option<f64>,
    #[arg(long)]
    embargo: bool,
    #[arg(long)]
    partial: bool,
    #[arg(long)]
    comment: Option<String>,
    #[arg(long)]
    citation: Option<String>,
}

#[derive(Args)]
struct FindArgs {
    #[command(subcommand)]
    command: FindCommand,
}

#[derive(Subcommand)]
enum FindCommand {
    Entry {
        #[arg(long)]
        id: Option<RecordId>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        variable: Option<String>,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        #[arg(long)]
        all_versions: bool,
        #[arg(long)]
        include_partial: bool,
        #[arg(long)]
        as_result: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    Group {
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "type")]
        group_type: Option<String>,
        #[arg(long)]
        as_result: bool,
    },
    Person {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        organisation: Option<String>,
    },
}

#[derive(Args)]
struct DataArgs {
    uuid: String,
    #[arg(long)]
    merge: bool,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::NotFound { .. } => 2,
        CatalogError::MissingConfig | CatalogError::ConfigRead(_) | CatalogError::ConfigParse(_) => 2,
        CatalogError::DataRead(_) | CatalogError::Filesystem(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.data_root = metacatalog::config::default_data_root(&store);
        config.store = store;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut store = Store::open(&config.store)?;

    match cli.command {
        Commands::Init => {
            store.populate_defaults()?;
            JsonOutput::print_json(&serde_json::json!({
                "store": config.store,
                "data_root": config.data_root,
                "schema_version": store.catalog().schema_version,
            }))
            .into_diagnostic()
        }
        Commands::Add(args) => run_add(args.command, &mut store),
        Commands::Find(args) => run_find(args.command, store, &config),
        Commands::Show { uuid } => {
            let app = App::with_files(store, &config.data_root);
            let result = app.show(&parse_uuid(&uuid)?)?;
            JsonOutput::print_show(&result).into_diagnostic()
        }
        Commands::Data(args) => {
            let filter = DataFilter {
                start: args.start.as_deref().map(parse_timestamp).transpose()?,
                end: args.end.as_deref().map(parse_timestamp).transpose()?,
            };
            let app = App::with_files(store, &config.data_root);
            let result = app.data(&parse_uuid(&args.uuid)?, args.merge, &filter)?;
            JsonOutput::print_data(&result).into_diagnostic()
        }
        Commands::Import { entry, file } => {
            let app = App::with_files(store, &config.data_root);
            let result = app.import(entry, &file)?;
            JsonOutput::print_import(&result).into_diagnostic()
        }
        Commands::Append { entry, file } => {
            let app = App::with_files(store, &config.data_root);
            let result = app.append(entry, &file)?;
            JsonOutput::print_import(&result).into_diagnostic()
        }
        Commands::Delete {
            entry,
            delete_source,
        } => {
            let mut app = App::with_files(store, &config.data_root);
            let result = app.delete(entry, delete_source)?;
            JsonOutput::print_delete(&result).into_diagnostic()
        }
    }
}

fn run_add(command: AddCommand, store: &mut Store) -> miette::Result<()> {
    let created = match command {
        AddCommand::Person {
            first_name,
            last_name,
            affiliation,
            organisation,
        } => to_json(&add_person(
            store,
            NewPerson {
                first_name,
                last_name,
                affiliation,
                is_organisation: organisation.is_some(),
                organisation_name: organisation,
            },
        )?),
        AddCommand::License {
            short_title,
            title,
            link,
        } => to_json(&add_license(
            store,
            NewLicense {
                short_title,
                title,
                link,
                ..NewLicense::default()
            },
        )?),
        AddCommand::Variable {
            name,
            symbol,
            unit,
            columns,
        } => to_json(&add_variable(store, &name, &symbol, &lookup(&unit), columns)?),
        AddCommand::Keyword { path } => to_json(&add_keyword(store, &path)?),
        AddCommand::Entry(args) => {
            let mut entry = NewEntry::new(args.title, lookup(&args.author), lookup(&args.variable));
            entry.license = args.license.as_deref().map(lookup);
            entry.abstract_text = args.abstract_text;
            entry.external_id = args.external_id;
            entry.location = args.lon.zip(args.lat).map(|(x, y)| Location { x, y });
            entry.embargo = args.embargo;
            entry.is_partial = args.partial;
            entry.comment = args.comment;
            entry.citation = args.citation;
            to_json(&add_entry(store, entry)?)
        }
        AddCommand::Coauthor {
            entry,
            persons,
            role,
        } => {
            let persons = persons.iter().map(|p| lookup(p)).collect::<Vec<_>>();
            to_json(&add_persons_to_entry(store, entry, &persons, &lookup(&role), None)?)
        }
        AddCommand::Tag {
            entry,
            keywords,
            alias,
        } => {
            let keywords = keywords.iter().map(|k| lookup(k)).collect::<Vec<_>>();
            to_json(&add_keywords_to_entry(store, entry, &keywords, alias, None)?)
        }
        AddCommand::Group {
            group_type,
            entries,
            title,
            description,
        } => to_json(&add_group(store, &lookup(&group_type), &entries, title, description)?),
        AddCommand::Datasource {
            entry,
            kind,
            path,
            index,
        } => {
            let mut args = Map::new();
            if let Some(index) = index {
                args.insert("index".to_string(), Value::String(index));
            }
            to_json(&create_datasource(store, entry, kind.parse::<DataSourceKind>()?, &path, args)?)
        }
        AddCommand::Detail {
            entry,
            key,
            value,
            description,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            to_json(&add_details_to_entry(
                store,
                entry,
                vec![Detail {
                    key,
                    value,
                    description,
                }],
            )?)
        }
    };
    JsonOutput::print_json(&created).into_diagnostic()
}

fn run_find(command: FindCommand, store: Store, config: &ResolvedConfig) -> miette::Result<()> {
    let app = App::with_files(store, &config.data_root);
    let result = match command {
        FindCommand::Entry {
            id,
            title,
            author,
            project,
            variable,
            keywords,
            all_versions,
            include_partial,
            as_result,
            limit,
        } => app.find_entries(&EntryQuery {
            id,
            title,
            author: author.as_deref().map(lookup),
            project: project.as_deref().map(lookup),
            variable: variable.as_deref().map(lookup),
            keywords: keywords.iter().map(|k| lookup(k)).collect(),
            version: if all_versions {
                VersionFilter::Any
            } else {
                VersionFilter::Latest
            },
            include_partial,
            as_result,
            limit,
            ..EntryQuery::default()
        })?,
        FindCommand::Group {
            title,
            group_type,
            as_result,
        } => app.find_groups(&GroupQuery {
            title,
            group_type: group_type.as_deref().map(lookup),
            as_result,
            ..GroupQuery::default()
        })?,
        FindCommand::Person {
            first_name,
            last_name,
            organisation,
        } => app.find_persons(&PersonQuery {
            first_name,
            last_name,
            organisation_name: organisation,
            ..PersonQuery::default()
        })?,
    };
    JsonOutput::print_find(&result).into_diagnostic()
}

fn lookup(value: &str) -> Lookup {
    value
        .parse()
        .unwrap_or_else(|_| Lookup::Name(value.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
