use color_eyre::eyre::{eyre, Result};
use futures::StreamExt;
use mood_journal::{
    auth_changes, load_theme, save_theme, EditSession, EntryId, FileDraftStore, IdentityProvider,
    InMemoryIdentity, InMemoryStore, Journal, JournalConfig, JournalError, JournalSession,
    MarkupBuffer, Snapshot, SnapshotStream, SortKey, Theme, UserId,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

enum Action {
    Login(String),
    Logout,
    Write(String),
    Edit(String),
    Title(String),
    Text(String),
    Recover,
    SaveDraft,
    Publish(Vec<String>),
    Close,
    View,
    Search(String),
    Mood(Option<String>),
    Sort(SortKey),
    Stats,
    Delete(String),
    Theme(Option<String>),
    Resync,
    Help,
    Quit,
}

enum Event {
    Auth(Option<Option<UserId>>),
    Snapshot(Option<mood_journal::Result<Snapshot>>),
    Input(Option<String>),
}

fn parse_action(line: &str) -> Result<Option<Action>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim().to_string()),
        None => (line, String::new()),
    };

    let action = match command {
        "login" if !rest.is_empty() => Action::Login(rest),
        "logout" => Action::Logout,
        "write" => Action::Write(rest),
        "edit" if !rest.is_empty() => Action::Edit(rest),
        "title" => Action::Title(rest),
        "text" => Action::Text(rest),
        "recover" => Action::Recover,
        "draft" => Action::SaveDraft,
        "publish" => Action::Publish(
            rest.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect(),
        ),
        "close" => Action::Close,
        "list" => Action::View,
        "search" => Action::Search(rest),
        "mood" => Action::Mood(if rest.is_empty() || rest == "*" { None } else { Some(rest) }),
        "sort" => Action::Sort(rest.parse()?),
        "stats" => Action::Stats,
        "delete" if !rest.is_empty() => Action::Delete(rest),
        "theme" => Action::Theme(if rest.is_empty() { None } else { Some(rest) }),
        "resync" => Action::Resync,
        "help" => Action::Help,
        "quit" | "exit" => Action::Quit,
        _ => return Err(eyre!("Unknown command `{}`. Type `help` for the list.", line)),
    };
    Ok(Some(action))
}

fn print_help() {
    println!("Commands:");
    println!("  login <name> | logout");
    println!("  write [title] | edit <id> | title <text> | text <markup> | recover");
    println!("  draft | publish [mood,mood...] | close");
    println!("  list | search <text> | mood <tag|*> | sort <date-desc|date-asc|title>");
    println!("  stats | delete <id> | theme [dark|light] | resync | help | quit");
}

fn print_entries(session: &JournalSession) {
    let visible = session.visible_entries();
    if visible.is_empty() {
        println!("No entries found");
        return;
    }
    for entry in visible {
        let summary = entry.summary();
        let mut tags = summary.tags.join(", ");
        if summary.hidden_tags > 0 {
            tags.push_str(&format!(" +{} more", summary.hidden_tags));
        }
        println!(
            "{} {}{} [{}] {}",
            summary.id,
            summary.title,
            if summary.is_draft { " (draft)" } else { "" },
            summary.date.as_deref().unwrap_or("pending"),
            tags
        );
        if !summary.preview.is_empty() {
            println!("    {}...", summary.preview);
        }
    }
}

fn print_stats(session: &mut JournalSession) {
    let stats = session.stats();
    println!(
        "{} {} | {} words | {} unique moods | {} day streak",
        stats.total_entries,
        if stats.total_entries == 1 { "entry" } else { "entries" },
        stats.total_words,
        stats.unique_moods,
        stats.streak
    );
    if !stats.moods.is_empty() {
        println!("Moods: {}", stats.moods.join(", "));
    }
}

fn session_mut(journal: &mut Journal) -> Result<&mut JournalSession> {
    Ok(journal.session_mut().ok_or(JournalError::NoUserContext)?)
}

fn editor_mut(journal: &mut Journal) -> Result<&mut EditSession> {
    session_mut(journal)?
        .editor_mut()
        .ok_or_else(|| eyre!("No entry is open; use `write` or `edit` first."))
}

async fn next_snapshot(stream: &mut Option<SnapshotStream>) -> Option<mood_journal::Result<Snapshot>> {
    match stream {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

async fn run_action(
    action: Action,
    identity: &InMemoryIdentity,
    journal: &mut Journal,
    snapshots: &mut Option<SnapshotStream>,
) -> Result<()> {
    match action {
        Action::Login(name) => identity.sign_in(UserId::new(name)),
        Action::Logout => identity.sign_out().await?,
        Action::Write(title) => {
            let editor = session_mut(journal)?.begin_edit(None, Arc::new(MarkupBuffer::default()))?;
            editor.set_title(&title);
            if let Some(draft) = editor.recovered_draft()? {
                println!(
                    "A local draft \"{}\" from {} exists; type `recover` to restore it.",
                    draft.title,
                    draft.saved_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Action::Edit(id) => {
            let id = EntryId::new(id);
            let session = session_mut(journal)?;
            if session.entry(&id).is_none() {
                return Err(eyre!("No entry with id {}", id));
            }
            let editor = session.begin_edit(Some(&id), Arc::new(MarkupBuffer::default()))?;
            println!("Editing \"{}\"", editor.title());
        }
        Action::Title(title) => editor_mut(journal)?.set_title(&title),
        Action::Text(markup) => editor_mut(journal)?.body().set_content(&markup),
        Action::Recover => {
            if !editor_mut(journal)?.restore_draft()? {
                println!("No local draft to recover");
            }
        }
        Action::SaveDraft => {
            let id = editor_mut(journal)?.save_as_draft().await?;
            println!("Draft saved ({})", id);
        }
        Action::Publish(moods) => {
            let id = editor_mut(journal)?.publish(moods).await?;
            println!("Entry published ({})", id);
        }
        Action::Close => session_mut(journal)?.end_edit(),
        Action::View => print_entries(session_mut(journal)?),
        Action::Search(query) => {
            let session = session_mut(journal)?;
            session.set_search(query);
            print_entries(session);
        }
        Action::Mood(mood) => {
            let session = session_mut(journal)?;
            session.set_mood_filter(mood);
            print_entries(session);
        }
        Action::Sort(sort) => {
            let session = session_mut(journal)?;
            session.set_sort(sort);
            print_entries(session);
        }
        Action::Stats => print_stats(session_mut(journal)?),
        Action::Delete(id) => {
            journal.gateway().remove(&EntryId::new(id)).await?;
            println!("Entry deleted successfully");
        }
        Action::Theme(choice) => {
            let user = session_mut(journal)?.user().clone();
            let store = journal.store().clone();
            let theme = match choice.as_deref() {
                Some("dark") => Theme::Dark,
                Some("light") => Theme::Light,
                Some(other) => return Err(eyre!("Unknown theme `{}`", other)),
                None => load_theme(store.as_ref(), &user).await.toggled(),
            };
            save_theme(store.as_ref(), &user, theme).await;
            println!("Theme: {:?}", theme);
        }
        Action::Resync => {
            *snapshots = Some(session_mut(journal)?.resubscribe()?);
        }
        Action::Help => print_help(),
        Action::Quit => {}
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = JournalConfig::from_env();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.clone()),
    )
    .init();

    let store = Arc::new(InMemoryStore::new());
    let drafts = Arc::new(FileDraftStore::new(config.draft_path.clone()));
    let identity = InMemoryIdentity::new();
    let mut journal = Journal::new(store, drafts, config);

    let mut auth = auth_changes(&identity);
    let mut snapshots: Option<SnapshotStream> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Mood Journal");
    print_help();

    loop {
        let event = tokio::select! {
            change = auth.next() => Event::Auth(change),
            update = next_snapshot(&mut snapshots) => Event::Snapshot(update),
            line = lines.next_line() => Event::Input(line?),
        };

        match event {
            Event::Auth(None) | Event::Input(None) => break,
            Event::Auth(Some(user)) => match journal.handle_auth_change(user) {
                Ok(stream) => snapshots = stream,
                Err(e) => {
                    snapshots = None;
                    println!("Error: {}", e);
                }
            },
            Event::Snapshot(Some(Ok(snapshot))) => {
                if journal.apply_snapshot(snapshot) {
                    if let Some(session) = journal.session_mut() {
                        print_stats(session);
                    }
                }
            }
            Event::Snapshot(Some(Err(e))) => {
                snapshots = None;
                println!("Live updates stopped: {}. Type `resync` to reconnect.", e);
            }
            Event::Snapshot(None) => snapshots = None,
            Event::Input(Some(line)) => match parse_action(&line) {
                Ok(Some(Action::Quit)) => break,
                Ok(Some(action)) => {
                    if let Err(e) = run_action(action, &identity, &mut journal, &mut snapshots).await {
                        println!("Error: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            },
        }
    }

    journal.sign_out();
    Ok(())
}
