mod commands;
mod edit;
mod status_line;

use std::sync::Arc;

use anyhow::{Context, Result};
use commands::{parse_command, Command, COMMAND_MENU};
use edit::{EditSession, EditStep, CANCEL_LINE, SAVE_LINE};
use parking_lot::Mutex;
use passcore_config::Settings;
use passcore_index::Entry;
use passcore_shell::{GpgCli, SystemClipboard, SystemLauncher};
use passd::passcard::mask_password;
use passd::{generate_password, PassService, QueryResults, ServiceError, StatusBus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let status = Arc::new(StatusBus::new());
    let printer = Mutex::new(status_line::StatusPrinter::default());
    status.subscribe(move |message| {
        if let Some(text) = printer.lock().render(message) {
            eprint!("{text}");
        }
    });

    let service = PassService::start_with_status(
        settings,
        Arc::new(GpgCli::new()),
        Arc::new(SystemClipboard::new()),
        status,
    )
    .context("failed to open password store")?;
    info!(
        root = %service.store().root().display(),
        watching = service.is_watching(),
        "xpass ready"
    );

    let result = run(&service).await;
    service.shutdown().await;
    result
}

enum Flow {
    Continue,
    Edit(EditSession),
    Quit,
}

async fn run(service: &PassService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut results = service.query_results();
    let mut shown: Vec<Entry> = service.query("");
    let mut editing: Option<EditSession> = None;
    let launcher = SystemLauncher::new();
    print_entries(&shown);

    loop {
        tokio::select! {
            changed = results.changed(), if editing.is_none() => {
                if changed.is_err() {
                    break;
                }
                let latest: QueryResults = results.borrow_and_update().clone();
                shown = latest.entries.as_ref().clone();
                print_entries(&shown);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if let Some(mut session) = editing.take() {
                    match session.feed(&line) {
                        EditStep::Continue => editing = Some(session),
                        EditStep::Save(content) => report(tokio::task::block_in_place(|| {
                            service.save(session.entry(), &content)
                        })),
                        EditStep::Cancel => service.store().status().publish("Edit cancelled"),
                    }
                    continue;
                }
                match handle_line(service, &launcher, &shown, &line) {
                    Flow::Continue => {}
                    Flow::Edit(session) => editing = Some(session),
                    Flow::Quit => break,
                }
            }
        }
    }

    Ok(())
}

fn handle_line(
    service: &PassService,
    launcher: &SystemLauncher,
    shown: &[Entry],
    line: &str,
) -> Flow {
    match parse_command(line) {
        Command::Search(term) => service.submit_query(term),
        Command::Show(n) => {
            if let Some(entry) = pick(shown, n) {
                // gpg may prompt for a passphrase; keep it off the async workers.
                match tokio::task::block_in_place(|| service.passcard(entry)) {
                    Ok(card) => {
                        println!("{}", entry.name);
                        println!("  password: {}", mask_password(card.password()));
                        for field in card.fields() {
                            println!("  {}: {}", field.key, field.value);
                        }
                        if !card.notes().is_empty() {
                            println!();
                            println!("{}", card.notes());
                        }
                    }
                    Err(err) => eprintln!("error: {err}"),
                }
            }
        }
        Command::Raw(n) => {
            if let Some(entry) = pick(shown, n) {
                println!("{}", entry.raw_base64());
            }
        }
        Command::Copy(n) => {
            if let Some(entry) = pick(shown, n) {
                report(tokio::task::block_in_place(|| service.copy_password(entry)));
            }
        }
        Command::Field { index, key } => {
            if let Some(entry) = pick(shown, index) {
                report(tokio::task::block_in_place(|| {
                    service.copy_field(entry, &[key.as_str()])
                }));
            }
        }
        Command::Login(n) => {
            if let Some(entry) = pick(shown, n) {
                report(tokio::task::block_in_place(|| service.copy_login(entry)));
            }
        }
        Command::Email(n) => {
            if let Some(entry) = pick(shown, n) {
                report(tokio::task::block_in_place(|| service.copy_email(entry)));
            }
        }
        Command::Open(n) => {
            if let Some(entry) = pick(shown, n) {
                report(
                    tokio::task::block_in_place(|| service.open_url(entry, launcher)).map(drop),
                );
            }
        }
        Command::Edit(n) => {
            if let Some(entry) = pick(shown, n) {
                match tokio::task::block_in_place(|| service.decrypt(entry)) {
                    Ok(current) => {
                        println!("editing {}", entry.name);
                        print!("{current}");
                        if !current.ends_with('\n') {
                            println!();
                        }
                        println!("-- type the new content, '{SAVE_LINE}' to save, {CANCEL_LINE} to abort");
                        return Flow::Edit(EditSession::new(entry.clone()));
                    }
                    Err(err) => eprintln!("error: {err}"),
                }
            }
        }
        Command::New(name) => {
            let content = format!("{}\n", generate_password());
            match tokio::task::block_in_place(|| service.create(&name, &content)) {
                Ok(entry) => println!("created {}", entry.name),
                Err(err) => eprintln!("error: {err}"),
            }
        }
        Command::Generate => {
            report(service.copy_text("generated password", &generate_password()));
        }
        Command::Reindex => service.rebuild(),
        Command::Help => {
            for item in &COMMAND_MENU {
                println!("  {:<14} {}", item.command, item.description);
            }
        }
        Command::Quit => return Flow::Quit,
        Command::Invalid(input) => eprintln!("unknown command: {input} (try /help)"),
    }

    Flow::Continue
}

fn pick(shown: &[Entry], n: usize) -> Option<&Entry> {
    let entry = n.checked_sub(1).and_then(|idx| shown.get(idx));
    if entry.is_none() {
        eprintln!("no result #{n}");
    }
    entry
}

fn report(result: Result<(), ServiceError>) {
    if let Err(err) = result {
        eprintln!("error: {err}");
    }
}

fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("(no matches)");
        return;
    }
    for (idx, entry) in entries.iter().enumerate() {
        println!("{:>4}  {}", idx + 1, entry.name);
    }
}
