//! target-admin: line-oriented JSON front end for the sales target engine.
//!
//! Usage:
//!   target-admin --db targets.db --actor 7 < commands.jsonl
//!   target-admin --config engine.json --gate allow
//!
//! Each stdin line is one command; each stdout line is its JSON result:
//!   {"type": "bulk_update", "year": 2026, "scope_kind": "department",
//!    "department": 1, "entries": [{"month": 1, "contract_amount": 100000}]}
//!   -> {"ok": {"operation_id": "...", "updated_month_count": 1, ...}}

use anyhow::Result;
use sales_targets_core::{
    bulk_update::BulkUpdateRequest,
    config::EngineConfig,
    directory::{Department, UserProfile},
    engine::TargetEngine,
    error::{TargetError, TargetResult},
    permission::{Actor, AllowAll, DirectoryGate, PermissionGate},
    store::TargetFilter,
    types::{DepartmentId, RecordId, UserId, Year},
    year_copy::ScopeFilter,
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AdminCommand {
    AddDepartment(Department),
    AddUser(UserProfile),
    SetManager {
        department: DepartmentId,
        manager: Option<UserId>,
    },
    BulkUpdate(BulkUpdateRequest),
    Delete {
        id: RecordId,
    },
    BulkDelete {
        ids: Vec<RecordId>,
    },
    CopyYear {
        from_year: Year,
        to_year: Year,
        #[serde(default)]
        filter: ScopeFilter,
    },
    List {
        #[serde(default)]
        filter: TargetFilter,
    },
    Events {
        #[serde(default = "default_event_limit")]
        limit: usize,
    },
    Quit,
}

fn default_event_limit() -> usize {
    20
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match flag_value(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = flag_value(&args, "--db") {
        config.db_path = db.to_string();
    }
    let actor = match flag_value(&args, "--actor") {
        Some(id) => Actor::User(id.parse()?),
        None => Actor::System,
    };
    let gate: Box<dyn PermissionGate> = match flag_value(&args, "--gate").unwrap_or("directory") {
        "allow" => Box::new(AllowAll),
        "directory" => Box::new(DirectoryGate),
        other => anyhow::bail!("unknown --gate '{other}' (expected 'allow' or 'directory')"),
    };

    log::info!("target-admin: db={} actor={actor}", config.db_path);
    let engine = TargetEngine::build(config, gate)?;
    run_command_loop(&engine, &actor)
}

fn run_command_loop(engine: &TargetEngine, actor: &Actor) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: AdminCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = json!({ "error": { "kind": "parse", "message": e.to_string() } });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, AdminCommand::Quit) {
            break;
        }

        let response = match handle_command(engine, actor, cmd) {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                if e.is_client_error() {
                    log::warn!("command rejected: {e}");
                } else {
                    log::error!("command failed: {e}");
                }
                error_json(&e)
            }
        };
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &TargetEngine, actor: &Actor, cmd: AdminCommand) -> TargetResult<Value> {
    let value = match cmd {
        AdminCommand::AddDepartment(department) => {
            engine.store.insert_department(&department)?;
            json!({ "department": department.id })
        }
        AdminCommand::AddUser(user) => {
            engine.store.insert_user(&user)?;
            json!({ "user": user.id })
        }
        AdminCommand::SetManager { department, manager } => {
            if !engine.store.set_department_manager(department, manager)? {
                return Err(TargetError::not_found("department", department));
            }
            json!({ "department": department, "manager": manager })
        }
        AdminCommand::BulkUpdate(req) => serde_json::to_value(engine.bulk_update_targets(actor, &req)?)?,
        AdminCommand::Delete { id } => serde_json::to_value(engine.delete(actor, id)?)?,
        AdminCommand::BulkDelete { ids } => serde_json::to_value(engine.bulk_delete(actor, &ids)?)?,
        AdminCommand::CopyYear { from_year, to_year, filter } => {
            serde_json::to_value(engine.copy_year(actor, from_year, to_year, &filter)?)?
        }
        AdminCommand::List { filter } => serde_json::to_value(engine.find_records(&filter)?)?,
        AdminCommand::Events { limit } => serde_json::to_value(engine.recent_events(limit)?)?,
        AdminCommand::Quit => Value::Null,
    };
    Ok(value)
}

fn error_json(e: &TargetError) -> Value {
    // Storage details stay in the log.
    let message = if e.is_client_error() {
        e.to_string()
    } else {
        "internal error".to_string()
    };
    json!({ "error": { "kind": e.kind(), "message": message } })
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
