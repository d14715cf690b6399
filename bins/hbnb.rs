use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use models::{user, AnyEntity, EntityKind, CLASS_KEY};
use serde_json::{Map, Value};
use storage::Storage;
use tracing::{error, info, warn};

/// Attributes the console never lets a caller set directly.
const BASE_KEYS: [&str; 4] = ["id", "created_at", "updated_at", CLASS_KEY];

#[derive(Parser, Debug)]
#[command(name = "hbnb", version, about = "Inspect and edit the hbnb store")]
struct Cli {
    /// Emit logs as JSON lines instead of compact text
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Number of stored entities, optionally of one kind
    Count { kind: Option<EntityKind> },
    /// Print every stored entity, optionally of one kind
    All { kind: Option<EntityKind> },
    /// Print one entity
    Show { kind: EntityKind, id: String },
    /// Create and save an entity, printing its id
    Create {
        kind: EntityKind,
        #[arg(value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Change attributes of an existing entity and save it
    Update {
        kind: EntityKind,
        id: String,
        #[arg(value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Delete an entity and save
    Destroy { kind: EntityKind, id: String },
}

fn init_logging(json: bool) {
    dotenv().ok();
    if json {
        common::utils::logging::init_logging_json();
    } else {
        common::utils::logging::init_logging_default();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let pid = std::process::id();
    std::panic::set_hook(Box::new(move |info| {
        error!(service = "hbnb", event = "panic", pid, message = %info, "unhandled panic occurred");
    }));

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "hbnb", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "hbnb", event = "command_failed", error = %e, "command failed");
            eprintln!("** {e:#} **");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let cfg = configs::AppConfig::load_and_validate().context("loading configuration")?;
    let mut storage = Storage::open(&cfg.storage).await.context("opening storage")?;
    info!(service = "hbnb", event = "start", mode = ?storage.mode(), "storage opened");

    let outcome = execute(&mut storage, command).await;
    let closed = storage.close().await;
    outcome?;
    closed?;
    Ok(())
}

async fn execute(storage: &mut Storage, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Count { kind } => {
            println!("{}", storage.count(kind).await?);
        }
        Command::All { kind } => {
            let mut listed = Vec::new();
            for entity in storage.all(kind).await?.values() {
                listed.push(Value::Object(entity.to_mapping()?));
            }
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Command::Show { kind, id } => match storage.get(kind, &id).await? {
            Some(entity) => print_entity(&entity)?,
            None => println!("** no instance found **"),
        },
        Command::Create { kind, attrs } => {
            let (mut map, password) = parse_attrs(&attrs);
            for key in BASE_KEYS {
                map.remove(key);
            }
            let mut entity = AnyEntity::from_mapping_as(kind, map)?;
            apply_password(&mut entity, password)?;
            storage.new(entity.clone()).await?;
            storage.save().await?;
            info!(service = "hbnb", event = "created", key = %entity.key());
            println!("{}", entity.id());
        }
        Command::Update { kind, id, attrs } => {
            let Some(existing) = storage.get(kind, &id).await? else {
                println!("** no instance found **");
                return Ok(());
            };
            let mut document = existing.to_document()?;
            let (changes, password) = parse_attrs(&attrs);
            for (key, value) in changes {
                if BASE_KEYS.contains(&key.as_str()) {
                    warn!(key = %key, "ignoring read-only attribute");
                    continue;
                }
                document.insert(key, value);
            }
            let mut entity = AnyEntity::from_mapping_as(kind, document)?;
            apply_password(&mut entity, password)?;
            storage.new(entity).await?;
            storage.save().await?;
            if let Some(saved) = storage.get(kind, &id).await? {
                print_entity(&saved)?;
            }
        }
        Command::Destroy { kind, id } => {
            if storage.get(kind, &id).await?.is_none() {
                println!("** no instance found **");
                return Ok(());
            }
            storage.delete(models::ObjectKey::new(kind, id.as_str())).await?;
            storage.save().await?;
            info!(service = "hbnb", event = "destroyed", kind = %kind, id = %id);
        }
    }
    Ok(())
}

fn print_entity(entity: &AnyEntity) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&Value::Object(entity.to_mapping()?))?);
    Ok(())
}

/// Hash a supplied password into a User, and refuse users without one.
fn apply_password(entity: &mut AnyEntity, password: Option<String>) -> anyhow::Result<()> {
    let AnyEntity::User(u) = entity else {
        return Ok(());
    };
    user::validate_email(&u.email)?;
    match password {
        Some(plain) => u.set_password(&plain)?,
        None if u.password.is_empty() => return Err(anyhow!("a User needs password=...")),
        None => {}
    }
    Ok(())
}

/// Parse `key=value` words. A double-quoted value is a string in which `_`
/// stands for a space; otherwise integers, floats and JSON literals are
/// accepted. Unparseable pairs are skipped. `password` is split out so it
/// can be hashed instead of stored.
fn parse_attrs(words: &[String]) -> (Map<String, Value>, Option<String>) {
    let mut map = Map::new();
    let mut password = None;
    for word in words {
        let Some((key, raw)) = word.split_once('=') else {
            warn!(arg = %word, "expected key=value");
            continue;
        };
        let Some(value) = parse_value(raw) else {
            warn!(key = %key, "unparseable value skipped");
            continue;
        };
        if key == "password" {
            password = value.as_str().map(str::to_string).or_else(|| Some(raw.to_string()));
        } else {
            map.insert(key.to_string(), value);
        }
    }
    (map, password)
}

fn parse_value(raw: &str) -> Option<Value> {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Some(Value::String(inner.replace("\\\"", "\"").replace('_', " ")));
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Some(Value::from(f));
    }
    serde_json::from_str(raw).ok()
}
