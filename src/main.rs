use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use crewdesk::budget::{
    BudgetError, BudgetTable, Period, ReportOptions, SpendLog, build_report,
};
use crewdesk::config::{
    ConfigError, EffectiveConfig, default_repo_config_yaml, load_effective_config,
};
use crewdesk::identity::current_identity;
use crewdesk::ideas::{
    AccessError, Action, Idea, IdeaBook, IdeaDraft, PointLedger, RoleTable, WorkflowError,
};
use crewdesk::parts::{
    ParentLink, Part, PartEdit, PartsCatalog, PartsError, merge_import, normalize_part_number,
};
use crewdesk::report::{
    ReportError, ReportKind, export_file_name, parts_report, render_ideas_report,
};
use crewdesk::session::PartsSession;
use crewdesk::store::{Collection, JsonStore, StoreError, atomic_write};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CREWDESK_LOG";

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn io(code: &'static str, err: io::Error) -> Self {
        Self::new(code, err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::new("json_error", value.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        let code = match value {
            StoreError::StaleRevision { .. } => "stale_revision",
            StoreError::Write { .. } | StoreError::Encode { .. } => "store_error",
        };
        Self::new(code, value.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::new("config_error", value.to_string())
    }
}

impl From<PartsError> for CliError {
    fn from(value: PartsError) -> Self {
        let code = match value {
            PartsError::BlankPartNumber => "blank_part_number",
            PartsError::NotFound(_) => "part_not_found",
            PartsError::NoSelection => "no_selection",
        };
        Self::new(code, value.to_string())
    }
}

impl From<WorkflowError> for CliError {
    fn from(value: WorkflowError) -> Self {
        let code = match value {
            WorkflowError::BlankText => "blank_text",
            WorkflowError::BlankTag => "blank_tag",
            WorkflowError::IdeaNotFound(_) => "idea_not_found",
            WorkflowError::AlreadyReviewed { .. } => "already_reviewed",
        };
        Self::new(code, value.to_string())
    }
}

impl From<AccessError> for CliError {
    fn from(value: AccessError) -> Self {
        let code = match value {
            AccessError::UnknownRole { .. } => "unknown_role",
            AccessError::UnknownIdentity(_) | AccessError::Forbidden { .. } => "access_denied",
        };
        Self::new(code, value.to_string())
    }
}

impl From<BudgetError> for CliError {
    fn from(value: BudgetError) -> Self {
        let code = match value {
            BudgetError::OutOfRange { .. } => "date_out_of_range",
        };
        Self::new(code, value.to_string())
    }
}

impl From<ReportError> for CliError {
    fn from(value: ReportError) -> Self {
        let code = match value {
            ReportError::NoParts => "no_parts",
        };
        Self::new(code, value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "crewdesk")]
#[command(about = "Parts lookup, idea review and budget tracking over local JSON files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Init,
    Whoami,
    #[command(subcommand)]
    Parts(PartsCommand),
    #[command(subcommand)]
    Ideas(IdeasCommand),
    #[command(subcommand)]
    Budget(BudgetCommand),
}

#[derive(Subcommand, Debug)]
enum PartsCommand {
    Show(PartArg),
    Add(AddArgs),
    Edit(EditArgs),
    List,
    Import(ImportArgs),
    Select(SelectArgs),
    Parent,
    Export(ExportArgs),
}

#[derive(Subcommand, Debug)]
enum IdeasCommand {
    Submit(SubmitArgs),
    List(ListArgs),
    Pending,
    Review(ReviewArgs),
    Train(TrainArgs),
    Leaderboard,
    Export(ExportArgs),
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct PartArg {
    part: Option<String>,
}

#[derive(Args, Debug)]
struct AddArgs {
    part: String,
    #[arg(long)]
    if_revision: Option<String>,
}

#[derive(Args, Debug)]
struct EditArgs {
    part: Option<String>,
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    issues: Option<String>,
    #[arg(long)]
    usage: Option<String>,
    #[arg(long)]
    if_revision: Option<String>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    if_revision: Option<String>,
}

#[derive(Args, Debug)]
struct SelectArgs {
    part: Option<String>,
    #[arg(long, conflicts_with = "part")]
    clear: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long)]
    stdout: bool,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long)]
    text: String,
    #[arg(long, default_value = "")]
    link: String,
    #[arg(long)]
    tag: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("verdict").required(true).args(["accurate", "not_accurate"])))]
struct ReviewArgs {
    id: u64,
    #[arg(long)]
    accurate: bool,
    #[arg(long)]
    not_accurate: bool,
}

#[derive(Args, Debug)]
struct TrainArgs {
    id: u64,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[arg(long, default_value = "current")]
    period: Period,
    #[arg(long)]
    today: Option<NaiveDate>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    parts_threshold: Option<f64>,
}

#[derive(Debug, Clone)]
struct DeskPaths {
    repo_config: PathBuf,
    config: EffectiveConfig,
}

impl DeskPaths {
    fn data(&self) -> JsonStore {
        JsonStore::new(&self.config.data_dir)
    }

    fn cache(&self) -> JsonStore {
        JsonStore::new(&self.config.cache_dir)
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "code": err.code,
                    "message": err.message,
                }
            });
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().map_err(|err| CliError::io("cwd_error", err))?;
    let paths = desk_paths(&cwd)?;
    match cli.command {
        Command::Init => cmd_init(&paths),
        Command::Whoami => cmd_whoami(&paths),
        Command::Parts(command) => match command {
            PartsCommand::Show(args) => cmd_parts_show(&paths, args),
            PartsCommand::Add(args) => cmd_parts_add(&paths, args),
            PartsCommand::Edit(args) => cmd_parts_edit(&paths, args),
            PartsCommand::List => cmd_parts_list(&paths),
            PartsCommand::Import(args) => cmd_parts_import(&paths, args),
            PartsCommand::Select(args) => cmd_parts_select(&paths, args),
            PartsCommand::Parent => cmd_parts_parent(&paths),
            PartsCommand::Export(args) => cmd_parts_export(&paths, args),
        },
        Command::Ideas(command) => match command {
            IdeasCommand::Submit(args) => cmd_ideas_submit(&paths, args),
            IdeasCommand::List(args) => cmd_ideas_list(&paths, args),
            IdeasCommand::Pending => cmd_ideas_pending(&paths),
            IdeasCommand::Review(args) => cmd_ideas_review(&paths, args),
            IdeasCommand::Train(args) => cmd_ideas_train(&paths, args),
            IdeasCommand::Leaderboard => cmd_ideas_leaderboard(&paths),
            IdeasCommand::Export(args) => cmd_ideas_export(&paths, args),
        },
        Command::Budget(BudgetCommand::Summary(args)) => cmd_budget_summary(&paths, args),
    }
}

fn cmd_init(paths: &DeskPaths) -> Result<(), CliError> {
    for dir in [
        &paths.config.data_dir,
        &paths.config.export_dir,
        &paths.config.cache_dir,
    ] {
        fs::create_dir_all(dir).map_err(|err| CliError::io("mkdir_error", err))?;
    }
    write_default_config(&paths.repo_config)?;

    let data = paths.data();
    let roles_seeded = !data.path_for::<RoleTable>().exists();
    if roles_seeded {
        data.save(&RoleTable::starter())?;
    }
    let _ = data.load::<PartsCatalog>();
    let _ = data.load::<IdeaBook>();
    let _ = data.load::<PointLedger>();

    print_json(&json!({
        "status": "ok",
        "data_dir": paths.config.data_dir,
        "export_dir": paths.config.export_dir,
        "cache_dir": paths.config.cache_dir,
        "config": paths.repo_config,
        "roles_seeded": roles_seeded,
    }))
}

fn cmd_whoami(paths: &DeskPaths) -> Result<(), CliError> {
    let identity = require_identity()?;
    let data = paths.data();
    let roles = data.load::<RoleTable>();
    let ledger = data.load::<PointLedger>();
    let (role, access) = match roles.role_of(&identity) {
        Ok(role) => (Some(role.as_str()), None),
        Err(err) => (None, Some(err.to_string())),
    };

    print_json(&json!({
        "identity": identity,
        "role": role,
        "access": access,
        "points": ledger.points(&identity),
    }))
}

fn cmd_parts_show(paths: &DeskPaths, args: PartArg) -> Result<(), CliError> {
    let data = paths.data();
    let cache = paths.cache();
    let catalog = data.load::<PartsCatalog>();
    let mut session = cache.load::<PartsSession>();

    let query = match args.part {
        Some(raw) => normalize_part_number(&raw),
        None => session
            .selected_part
            .clone()
            .ok_or(PartsError::NoSelection)?,
    };
    if query.is_empty() {
        return Err(PartsError::BlankPartNumber.into());
    }

    let Some((key, part)) = catalog.lookup(&query) else {
        return print_json(&json!({
            "status": "not_found",
            "part_number": query,
            "message": format!("Part `{query}` not found. Add it with `crewdesk parts add {query}`."),
        }));
    };

    if session.selected_part.as_deref() != Some(key) {
        session.select(key);
        cache.save(&session)?;
    }

    print_json(&json!({
        "status": "found",
        "part": part_json(key, part),
        "parent_link": parent_link_json(&catalog.parent_link(key)?),
        "children": catalog.children(key),
        "edit_mode": session.edit_mode,
        "revision": data.revision::<PartsCatalog>(),
    }))
}

fn cmd_parts_add(paths: &DeskPaths, args: AddArgs) -> Result<(), CliError> {
    let data = paths.data();
    let cache = paths.cache();
    let mut catalog = data.load::<PartsCatalog>();
    let inserted = catalog.add(&args.part)?;
    let key = normalize_part_number(&args.part);
    let revision = if inserted {
        save_guarded(&data, &catalog, args.if_revision.as_deref())?
    } else {
        data.revision::<PartsCatalog>()
    };

    let mut session = cache.load::<PartsSession>();
    session.select(&key);
    cache.save(&session)?;

    print_json(&json!({
        "status": if inserted { "added" } else { "exists" },
        "part_number": key,
        "revision": revision,
    }))
}

/// Without field flags this toggles edit mode for the selected part and
/// prints the edit form. With any field flag it saves the edit; fields not
/// given keep their current values.
fn cmd_parts_edit(paths: &DeskPaths, args: EditArgs) -> Result<(), CliError> {
    let data = paths.data();
    let cache = paths.cache();
    let mut catalog = data.load::<PartsCatalog>();
    let mut session = cache.load::<PartsSession>();

    let key = match args.part.as_deref() {
        Some(raw) => resolve_part_key(&catalog, raw)?,
        None => session
            .selected_part
            .clone()
            .ok_or(PartsError::NoSelection)?,
    };
    let current = catalog
        .get(&key)
        .cloned()
        .ok_or_else(|| PartsError::NotFound(key.clone()))?;

    if args.parent.is_none() && args.issues.is_none() && args.usage.is_none() {
        if session.selected_part.as_deref() != Some(key.as_str()) {
            session.select(&key);
        }
        let edit_mode = session.toggle_edit();
        cache.save(&session)?;
        return print_json(&json!({
            "status": "ok",
            "edit_mode": edit_mode,
            "part": part_json(&key, &current),
            "parent_options": catalog.parent_options(),
            "revision": data.revision::<PartsCatalog>(),
        }));
    }

    let edit = PartEdit {
        parent: args.parent.unwrap_or(current.parent),
        issues: args.issues.unwrap_or(current.issues),
        usage: args.usage.unwrap_or(current.usage),
    };
    let part = catalog.edit(&key, edit)?.clone();
    let revision = save_guarded(&data, &catalog, args.if_revision.as_deref())?;

    session.select(&key);
    cache.save(&session)?;

    print_json(&json!({
        "status": "updated",
        "part": part_json(&key, &part),
        "revision": revision,
    }))
}

fn cmd_parts_list(paths: &DeskPaths) -> Result<(), CliError> {
    let data = paths.data();
    let catalog = data.load::<PartsCatalog>();
    let parts = catalog
        .iter()
        .map(|(key, part)| part_json(key, part))
        .collect::<Vec<_>>();

    print_json(&json!({
        "count": parts.len(),
        "parts": parts,
        "revision": data.revision::<PartsCatalog>(),
    }))
}

fn cmd_parts_import(paths: &DeskPaths, args: ImportArgs) -> Result<(), CliError> {
    let text = match &args.file {
        Some(path) => {
            fs::read_to_string(path).map_err(|err| CliError::io("read_error", err))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| CliError::io("stdin_error", err))?;
            buf
        }
    };

    let data = paths.data();
    let mut catalog = data.load::<PartsCatalog>();
    let summary = merge_import(&mut catalog, &text);
    let revision = save_guarded(&data, &catalog, args.if_revision.as_deref())?;

    print_json(&json!({
        "status": "ok",
        "added": summary.added,
        "updated": summary.updated,
        "issues_updated": summary.issues_updated,
        "message": summary.message(),
        "total_parts": catalog.len(),
        "revision": revision,
    }))
}

fn cmd_parts_select(paths: &DeskPaths, args: SelectArgs) -> Result<(), CliError> {
    let cache = paths.cache();
    let mut session = cache.load::<PartsSession>();
    if args.clear {
        session.clear();
    } else {
        let raw = args.part.ok_or(PartsError::BlankPartNumber)?;
        let catalog = paths.data().load::<PartsCatalog>();
        let key = resolve_part_key(&catalog, &raw)?;
        session.select(&key);
    }
    cache.save(&session)?;

    print_json(&json!({
        "status": "ok",
        "selected_part": session.selected_part,
        "edit_mode": session.edit_mode,
    }))
}

fn cmd_parts_parent(paths: &DeskPaths) -> Result<(), CliError> {
    let catalog = paths.data().load::<PartsCatalog>();
    let cache = paths.cache();
    let mut session = cache.load::<PartsSession>();
    let link = session.follow_parent(&catalog)?;
    cache.save(&session)?;

    let status = match &link {
        ParentLink::None => "root",
        ParentLink::Found(_) => "ok",
        ParentLink::Dangling(_) => "not_found",
    };
    print_json(&json!({
        "status": status,
        "parent_link": parent_link_json(&link),
        "selected_part": session.selected_part,
    }))
}

fn cmd_parts_export(paths: &DeskPaths, args: ExportArgs) -> Result<(), CliError> {
    let catalog = paths.data().load::<PartsCatalog>();
    let generated_at = Local::now().naive_local();
    let html = parts_report(&catalog, generated_at)?;
    if args.stdout {
        print!("{html}");
        return Ok(());
    }
    let path = write_export(
        &paths.config.export_dir,
        &export_file_name(ReportKind::Parts, generated_at),
        &html,
    )?;

    print_json(&json!({
        "status": "ok",
        "path": path,
        "parts": catalog.len(),
    }))
}

fn cmd_ideas_submit(paths: &DeskPaths, args: SubmitArgs) -> Result<(), CliError> {
    let data = paths.data();
    let identity = authorize(&data, Action::Submit)?;
    let mut book = data.load::<IdeaBook>();
    let draft = IdeaDraft {
        text: args.text,
        link: args.link,
        tag: args.tag,
    };
    let idea = book.submit(&draft, &identity, Utc::now())?.clone();
    data.save(&book)?;

    print_json(&json!({
        "status": "submitted",
        "idea": idea_json(&idea)?,
    }))
}

fn cmd_ideas_list(paths: &DeskPaths, args: ListArgs) -> Result<(), CliError> {
    let book = paths.data().load::<IdeaBook>();
    let ideas = book
        .search(args.search.as_deref().unwrap_or(""))
        .into_iter()
        .map(idea_json)
        .collect::<Result<Vec<_>, _>>()?;

    print_json(&json!({
        "count": ideas.len(),
        "total": book.len(),
        "ideas": ideas,
    }))
}

fn cmd_ideas_pending(paths: &DeskPaths) -> Result<(), CliError> {
    let book = paths.data().load::<IdeaBook>();
    let ideas = book
        .pending_training()
        .into_iter()
        .map(idea_json)
        .collect::<Result<Vec<_>, _>>()?;

    print_json(&json!({
        "count": ideas.len(),
        "ideas": ideas,
    }))
}

fn cmd_ideas_review(paths: &DeskPaths, args: ReviewArgs) -> Result<(), CliError> {
    let data = paths.data();
    let identity = authorize(&data, Action::Review)?;
    let mut book = data.load::<IdeaBook>();
    let mut ledger = data.load::<PointLedger>();
    let accurate = args.accurate && !args.not_accurate;
    let idea = book
        .review(args.id, &identity, accurate, &mut ledger, Utc::now())?
        .clone();
    data.save(&book)?;
    data.save(&ledger)?;

    print_json(&json!({
        "status": "reviewed",
        "idea": idea_json(&idea)?,
        "reviewer": identity,
        "points": ledger.points(&identity),
    }))
}

fn cmd_ideas_train(paths: &DeskPaths, args: TrainArgs) -> Result<(), CliError> {
    let data = paths.data();
    let identity = authorize(&data, Action::Train)?;
    let mut book = data.load::<IdeaBook>();
    let idea = book.mark_trained(args.id, &identity, Utc::now())?.clone();
    data.save(&book)?;

    print_json(&json!({
        "status": "trained",
        "idea": idea_json(&idea)?,
    }))
}

fn cmd_ideas_leaderboard(paths: &DeskPaths) -> Result<(), CliError> {
    let ledger = paths.data().load::<PointLedger>();
    print_json(&json!({
        "leaderboard": ledger.leaderboard(),
    }))
}

fn cmd_ideas_export(paths: &DeskPaths, args: ExportArgs) -> Result<(), CliError> {
    let book = paths.data().load::<IdeaBook>();
    let generated_at = Local::now().naive_local();
    let html = render_ideas_report(&book, generated_at);
    if args.stdout {
        print!("{html}");
        return Ok(());
    }
    let path = write_export(
        &paths.config.export_dir,
        &export_file_name(ReportKind::Ideas, generated_at),
        &html,
    )?;

    print_json(&json!({
        "status": "ok",
        "path": path,
        "ideas": book.len(),
    }))
}

fn cmd_budget_summary(paths: &DeskPaths, args: SummaryArgs) -> Result<(), CliError> {
    let log = paths.data().load::<SpendLog>();
    let budgets = BudgetTable::new(paths.config.budgets.clone());
    let options = ReportOptions {
        today: args.today.unwrap_or_else(|| Local::now().date_naive()),
        period: args.period,
        alert_threshold: args.threshold.unwrap_or(paths.config.alert_threshold),
        parts_threshold: args.parts_threshold,
    };
    let report = build_report(&log, &budgets, options)?;
    print_json(&serde_json::to_value(&report)?)
}

fn desk_paths(cwd: &Path) -> Result<DeskPaths, CliError> {
    let home = home_dir()?;
    let repo_config = cwd.join(".crewdesk").join("config.yml");
    let user_config = home.join(".crewdesk").join("config.yml");
    let config = load_effective_config(cwd, &home, Some(&repo_config), Some(&user_config))?;
    Ok(DeskPaths {
        repo_config,
        config,
    })
}

fn write_default_config(config_path: &Path) -> Result<(), CliError> {
    if config_path.exists() {
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|err| CliError::io("mkdir_error", err))?;
    }
    fs::write(config_path, default_repo_config_yaml())
        .map_err(|err| CliError::io("write_error", err))
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CliError::new("home_error", "HOME environment variable is not set"))
}

fn require_identity() -> Result<String, CliError> {
    current_identity().ok_or_else(|| {
        CliError::new(
            "no_identity",
            "could not determine the current user from LOGNAME, USER, LNAME or USERNAME",
        )
    })
}

fn authorize(data: &JsonStore, action: Action) -> Result<String, CliError> {
    let identity = require_identity()?;
    data.load::<RoleTable>().authorize(&identity, action)?;
    Ok(identity)
}

fn resolve_part_key(catalog: &PartsCatalog, raw: &str) -> Result<String, PartsError> {
    let query = normalize_part_number(raw);
    if query.is_empty() {
        return Err(PartsError::BlankPartNumber);
    }
    catalog
        .lookup(&query)
        .map(|(key, _)| key.to_string())
        .ok_or(PartsError::NotFound(query))
}

/// Plain save unless the caller pinned a revision.
fn save_guarded<C: Collection>(
    store: &JsonStore,
    collection: &C,
    if_revision: Option<&str>,
) -> Result<Option<String>, CliError> {
    match if_revision {
        Some(expected) => Ok(Some(store.save_if_revision(collection, expected)?)),
        None => {
            store.save(collection)?;
            Ok(store.revision::<C>())
        }
    }
}

fn write_export(dir: &Path, file_name: &str, html: &str) -> Result<PathBuf, CliError> {
    let path = dir.join(file_name);
    atomic_write(&path, html.as_bytes()).map_err(|err| CliError::io("write_error", err))?;
    Ok(path)
}

fn part_json(key: &str, part: &Part) -> Value {
    json!({
        "part_number": key,
        "parent": part.parent,
        "issues": part.issues,
        "usage": part.usage,
    })
}

fn parent_link_json(link: &ParentLink) -> Value {
    match link {
        ParentLink::None => json!({ "status": "none", "part_number": null }),
        ParentLink::Found(key) => json!({ "status": "found", "part_number": key }),
        ParentLink::Dangling(key) => json!({ "status": "dangling", "part_number": key }),
    }
}

fn idea_json(idea: &Idea) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(idea)?;
    if let Value::Object(map) = &mut value {
        map.insert("tally".to_string(), serde_json::to_value(idea.tally())?);
    }
    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
