mod modifiers;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::to_project_date;
use crate::filter::TaskQuery;
use crate::reminders::{Notification, ReminderNotifier};
use crate::render::Renderer;
use crate::stats::{Dashboard, TaskStats};
use crate::storage::KvStorage;
use crate::store::TaskStore;
use crate::task::{Status, Task, TaskDraft, TaskPatch};

use self::modifiers::{apply_to_draft, mods_to_patch, parse_title_and_mods};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "info",
        "modify",
        "start",
        "done",
        "reset",
        "cycle",
        "delete",
        "dashboard",
        "export",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: KvStorage>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = to_project_date(now);
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        %today,
        "dispatching command"
    );

    match command {
        "add" => cmd_add(store, renderer, &inv.command_args, now, today),
        "list" => cmd_list(store, cfg, renderer, &inv, today),
        "info" => cmd_info(store, renderer, &inv),
        "modify" => cmd_modify(store, renderer, &inv, now, today),
        "start" => cmd_set_status(store, renderer, &inv, Some(Status::InProgress), now),
        "done" => cmd_set_status(store, renderer, &inv, Some(Status::Done), now),
        "reset" => cmd_set_status(store, renderer, &inv, Some(Status::Todo), now),
        "cycle" => cmd_set_status(store, renderer, &inv, None, now),
        "delete" => cmd_delete(store, renderer, &inv),
        "dashboard" => cmd_dashboard(store, renderer, now, today),
        "export" => cmd_export(store),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, renderer, args, now, today))]
fn cmd_add<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let (title_words, mods) = parse_title_and_mods(args, today)?;
    if title_words.is_empty() {
        return Err(anyhow!("add: title is required"));
    }

    let mut draft = TaskDraft::new(title_words.join(" "));
    apply_to_draft(&mut draft, &mods);
    let task = store.add(draft, now)?;
    debug!(id = %task.id, "task added");
    println!("Created task {}.", short(&task.id));

    renderer.print_toast(&Notification::info("Task created", "Your new task is ready."))?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, inv, today))]
fn cmd_list<S: KvStorage>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: &Invocation,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    let terms: Vec<String> = inv
        .filter_terms
        .iter()
        .chain(&inv.command_args)
        .cloned()
        .collect();
    let query = TaskQuery::parse(&terms)?;

    let scheduled = if cfg.get_bool("reminders").unwrap_or(true) {
        let stagger = cfg.get_bool("reminders.stagger").unwrap_or(true);
        let mut notifier = ReminderNotifier::new(stagger);
        notifier.run(
            store.tasks(),
            store.is_loaded(),
            today,
            Arc::new(renderer.toaster()),
        )
    } else {
        debug!("reminders disabled by config");
        None
    };

    renderer.print_stats(&TaskStats::from_tasks(store.tasks()))?;

    let visible = query.apply(store.tasks());
    debug!(visible = visible.len(), total = store.tasks().len(), "filtered tasks");
    if visible.is_empty() {
        renderer.print_empty_state(query.has_filters())?;
    } else {
        renderer.print_task_cards(&visible, today)?;
    }

    if let Some(scheduled) = scheduled {
        let delivered = scheduled.wait();
        debug!(delivered, "reminders delivered");
    }
    Ok(())
}

#[instrument(skip(store, renderer, inv))]
fn cmd_info<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    inv: &Invocation,
) -> anyhow::Result<()> {
    info!("command info");

    let (selector, _) = take_selector(inv)?;
    let task = store.resolve(&selector)?;
    renderer.print_task_info(task)
}

#[instrument(skip(store, renderer, inv, now, today))]
fn cmd_modify<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    inv: &Invocation,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command modify");

    let (selector, rest) = take_selector(inv)?;
    let (title_words, mods) = parse_title_and_mods(&rest, today)?;
    let patch = mods_to_patch(&title_words, &mods);
    if patch.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    let id = store.resolve(&selector)?.id.clone();
    let lands_on_done = patch.status == Some(Status::Done);
    update_existing(store, &id, patch, now)?;

    println!("Modified task {}.", short(&id));
    renderer.print_toast(&Notification::info(
        "Task updated",
        "Your changes have been saved.",
    ))?;
    if lands_on_done {
        renderer.print_toast(&well_done())?;
    }
    Ok(())
}

/// `target` of `None` advances the status one step.
#[instrument(skip(store, renderer, inv, now))]
fn cmd_set_status<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    inv: &Invocation,
    target: Option<Status>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(command = %inv.command, "command status change");

    let (selector, rest) = take_selector(inv)?;
    if !rest.is_empty() {
        return Err(anyhow!(
            "{}: unexpected arguments: {}",
            inv.command,
            rest.join(" ")
        ));
    }

    let current = store.resolve(&selector)?;
    let id = current.id.clone();
    let status = target.unwrap_or_else(|| current.status.cycle_next());

    let task = update_existing(store, &id, TaskPatch::status(status), now)?;
    println!("Task {} is now {}.", short(&id), task.status.label());

    if status == Status::Done {
        renderer.print_toast(&well_done())?;
    }
    Ok(())
}

#[instrument(skip(store, renderer, inv))]
fn cmd_delete<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    inv: &Invocation,
) -> anyhow::Result<()> {
    info!("command delete");

    let (selector, _) = take_selector(inv)?;
    let task = store.resolve(&selector)?;
    let id = task.id.clone();
    let title = task.title.clone();

    if !store.remove(&id)? {
        return Err(anyhow!("task vanished before delete: {id}"));
    }
    println!("Deleted task {} '{}'.", short(&id), title);
    renderer.print_toast(&Notification::info(
        "Task deleted",
        "The task has been removed.",
    ))?;
    Ok(())
}

#[instrument(skip(store, renderer, now, today))]
fn cmd_dashboard<S: KvStorage>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command dashboard");

    let dash = Dashboard::compute(store.tasks(), now, today);
    renderer.print_dashboard(&dash)
}

#[instrument(skip(store))]
fn cmd_export<S: KvStorage>(store: &mut TaskStore<S>) -> anyhow::Result<()> {
    info!("command export");

    let out = serde_json::to_string_pretty(store.tasks())?;
    println!("{out}");
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for name in known_command_names() {
        println!("{name}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for path in &cfg.loaded_files {
        println!("# loaded {}", path.display());
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: add, list, info, modify, start, done, reset, cycle, delete, dashboard, export"
    );
    println!("Modifiers: status:<todo|in-progress|done> pri:<low|medium|high> due:<date> desc:<text>");
    println!("List filters: free words search title and description; status:<v|all> pri:<v|all>");
    Ok(())
}

fn update_existing<'s, S: KvStorage>(
    store: &'s mut TaskStore<S>,
    id: &str,
    patch: TaskPatch,
    now: DateTime<Utc>,
) -> anyhow::Result<&'s Task> {
    store
        .update(id, patch, now)?
        .ok_or_else(|| anyhow!("task not found: {id}"))
}

/// The selector comes before the command word (`taskdeck 2 done`) or as its
/// first argument (`taskdeck done 2`).
fn take_selector(inv: &Invocation) -> anyhow::Result<(String, Vec<String>)> {
    match inv.filter_terms.as_slice() {
        [one] => Ok((one.clone(), inv.command_args.clone())),
        [] => {
            let (first, rest) = inv
                .command_args
                .split_first()
                .ok_or_else(|| anyhow!("{}: which task? pass a number or id", inv.command))?;
            Ok((first.clone(), rest.to_vec()))
        }
        many => Err(anyhow!(
            "{}: expected a single task selector, got {}",
            inv.command,
            many.join(" ")
        )),
    }
}

fn well_done() -> Notification {
    Notification::info("Well done!", "Task marked as complete.")
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn invocation(filter: &[&str], command: &str, args: &[&str]) -> Invocation {
        Invocation {
            filter_terms: filter.iter().map(ToString::to_string).collect(),
            command: command.to_string(),
            command_args: args.iter().map(ToString::to_string).collect(),
        }
    }

    fn quiet_config() -> Config {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("reminders".to_string(), "off".to_string())]);
        cfg
    }

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("dash", &known), Some("dashboard"));
        assert_eq!(expand_command_abbrev("mod", &known), Some("modify"));
        assert_eq!(expand_command_abbrev("d", &known), None);
    }

    #[test]
    fn add_modify_cycle_and_delete_through_dispatch() {
        let cfg = quiet_config();
        let renderer = Renderer::plain();
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");

        dispatch(
            &mut store,
            &cfg,
            &renderer,
            invocation(&[], "add", &["Pay", "rent", "pri:high", "due:2026-11-01"]),
        )
        .expect("add");
        assert_eq!(store.tasks().len(), 1);
        let task = &store.tasks()[0];
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.priority, crate::task::Priority::High);

        dispatch(&mut store, &cfg, &renderer, invocation(&["1"], "modify", &["desc:online"]))
            .expect("modify");
        assert_eq!(store.tasks()[0].description.as_deref(), Some("online"));

        dispatch(&mut store, &cfg, &renderer, invocation(&[], "cycle", &["1"]))
            .expect("cycle");
        assert_eq!(store.tasks()[0].status, Status::InProgress);

        dispatch(&mut store, &cfg, &renderer, invocation(&["1"], "done", &[]))
            .expect("done");
        assert!(store.tasks()[0].completed_at.is_some());

        dispatch(&mut store, &cfg, &renderer, invocation(&["1"], "reset", &[]))
            .expect("reset");
        assert_eq!(store.tasks()[0].completed_at, None);

        dispatch(&mut store, &cfg, &renderer, invocation(&[], "list", &["rent"]))
            .expect("list");

        dispatch(&mut store, &cfg, &renderer, invocation(&["1"], "delete", &[]))
            .expect("delete");
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn selector_errors_are_reported() {
        let cfg = quiet_config();
        let renderer = Renderer::plain();
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");

        assert!(dispatch(&mut store, &cfg, &renderer, invocation(&[], "done", &[])).is_err());
        assert!(
            dispatch(&mut store, &cfg, &renderer, invocation(&["7"], "done", &[])).is_err()
        );
        assert!(
            dispatch(&mut store, &cfg, &renderer, invocation(&[], "add", &["pri:low"]))
                .is_err()
        );
    }
}
