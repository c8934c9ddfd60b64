use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Mutex;

use crossterm::{
    cursor::{MoveTo, MoveToNextLine},
    event::{self, Event, KeyEventKind},
    execute, queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cardstack::app::{Intent, Mode, State};
use cardstack::config::Config;
use cardstack::editor::{process_key, InputAction};
use cardstack::graph;
use cardstack::persist::{choose_snapshot, FileStore, Persistence, Snapshot, SnapshotSource};
use cardstack::search::index::{get_index_path, load_index, save_index};
use cardstack::search::{IndexWorker, Normalizer, SearchIndex};
use cardstack::store::{Card, CardStore, IndexRef};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("cardstack {}", VERSION);
    println!("Linked markdown cards in the terminal");
    println!();
    println!("USAGE:");
    println!("    cardstack [OPTIONS]");
    println!("    cardstack search <QUERY>...");
    println!("    cardstack graph");
    println!();
    println!("COMMANDS:");
    println!("    search <QUERY>   Print the notes best matching QUERY");
    println!("    graph            Print every link between notes");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
    println!("    -c, --config     Print config file path");
    println!("    -d, --dir        Print data directory path");
    println!("    --reset          Reset config to defaults");
    println!("    --clean-cache    Clear the search index cache");
    println!();
    println!("KEYS:");
    println!("    j/k, arrows      Move focus        shift+arrows  Extend selection");
    println!("    l/h              Outgoing/incoming links");
    println!("    H/L, Esc         Back/forward      Enter, i      Edit note");
    println!("    Space, a         New note          d, Backspace  Remove");
    println!("    y/x/p            Copy/cut/paste    u, ctrl+r     Undo/redo");
    println!("    F                Related notes     /             Search");
    println!("    q                Quit");
}

fn reset_config() {
    let config_path = Config::config_path();

    println!("Resetting cardstack configuration...");
    println!();

    if config_path.exists() {
        match fs::remove_file(&config_path) {
            Ok(_) => println!("  Deleted: {}", config_path.display()),
            Err(e) => eprintln!("  Failed to remove config: {}", e),
        }
    } else {
        println!("  Config file not found (skipped)");
    }

    let _config = Config::load_or_create();
    println!("  Created: {}", config_path.display());
    println!();
    println!("Reset complete! Configuration restored to v{} defaults.", VERSION);
}

fn clean_cache(config: &Config) {
    let path = get_index_path(&config.data_path());

    println!("Cleaning cardstack search cache...");
    println!();

    if path.exists() {
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&path) {
            Ok(_) => println!("  Deleted: {} ({})", path.display(), format_size(size)),
            Err(e) => eprintln!("  Failed to remove cache: {}", e),
        }
    } else {
        println!("  Cache file not found (skipped)");
    }

    println!();
    println!("Cache cleared! Search index will be rebuilt on next launch.");
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Log to a file in the data directory so the terminal stays clean.
fn init_tracing(config: &Config, data_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("cardstack.log"))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(io::Error::other)
}

fn load_snapshot(store: &FileStore) -> Option<Snapshot> {
    match store.load_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(path = %store.path().display(), error = %e, "unreadable snapshot");
            None
        }
    }
}

/// Build the state from the newest snapshot, with a search index either
/// read from the cache or rebuilt in the background worker.
fn load_state(config: &Config) -> io::Result<State> {
    let data_dir = config.data_path();
    let local = load_snapshot(&FileStore::in_dir(&data_dir));
    let remote = config
        .sync_path()
        .and_then(|dir| load_snapshot(&FileStore::in_dir(&dir)));

    let Some((source, snapshot)) = choose_snapshot(local, remote) else {
        info!("starting with an empty store");
        return Ok(State::new(config));
    };
    info!(?source, "loaded snapshot");
    let mut state = State::from_snapshot(snapshot, config).map_err(io::Error::other)?;

    let cached = match source {
        SnapshotSource::Local => load_index(&get_index_path(&data_dir), state.normalizer()),
        SnapshotSource::Remote => {
            // Bring the local copy up to date on the next save
            state.mark_dirty();
            None
        }
    };
    let index = match cached {
        Some(index) => index,
        None => build_index(config, state.store())?,
    };
    state.set_search_index(index);
    Ok(state)
}

fn build_index(config: &Config, store: &CardStore) -> io::Result<SearchIndex> {
    let mut worker =
        IndexWorker::new(config.weight_scheme, config.max_document_bytes).map_err(io::Error::other)?;
    for (id, note) in store.notes() {
        worker.request(id, note.contents.clone());
    }
    let normalizer = Normalizer::new(config.weight_scheme, config.max_document_bytes);
    let mut index = SearchIndex::for_normalizer(&normalizer);
    let applied = worker.finish(&mut index);
    info!(applied, "built search index");
    Ok(index)
}

fn save_state(state: &mut State, config: &Config) -> io::Result<()> {
    if config.collect_garbage {
        state.collect_garbage();
    }
    let data_dir = config.data_path();
    if state.is_dirty() {
        let snapshot = state.snapshot();
        FileStore::in_dir(&data_dir)
            .save_snapshot(&snapshot)
            .map_err(io::Error::other)?;
        if let Some(dir) = config.sync_path() {
            if let Err(e) = FileStore::in_dir(&dir).save_snapshot(&snapshot) {
                warn!(path = %dir.display(), error = %e, "could not write synced snapshot");
            }
        }
        state.mark_saved();
    }
    save_index(state.search_index(), &get_index_path(&data_dir)).map_err(io::Error::other)
}

fn title(store: &CardStore, id: &str) -> String {
    match store.get(id) {
        Some(Card::Note(note)) => note
            .contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("(empty note)")
            .to_string(),
        Some(Card::Index(index)) => format!("[index, {} cards]", index.contents.len()),
        None => format!("(missing {})", id),
    }
}

fn crumb_label(state: &State, index: &IndexRef) -> String {
    match index {
        IndexRef::Index(id) if id == state.root() => "root".to_string(),
        IndexRef::Index(_) => "index".to_string(),
        IndexRef::Outgoing(note) => format!("-> {}", title(state.store(), note)),
        IndexRef::Incoming(note) => format!("<- {}", title(state.store(), note)),
    }
}

fn render(out: &mut impl Write, state: &State) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    let crumbs: Vec<String> = state
        .navigator()
        .frames()
        .iter()
        .map(|frame| crumb_label(state, &frame.index))
        .collect();
    queue!(out, Print(crumbs.join(" / ")), MoveToNextLine(2))?;

    let items = state
        .store()
        .contents(state.navigator().current_index())
        .unwrap_or(&[]);
    let selected = match state.mode() {
        Mode::Selecting => state.navigator().selection_range(),
        _ => None,
    };
    if items.is_empty() {
        queue!(out, Print("  (empty)"), MoveToNextLine(1))?;
    }
    for (position, id) in items.iter().enumerate() {
        let focus = if position as isize == state.focus() { '>' } else { ' ' };
        let mark = match selected {
            Some((lower, upper)) if (lower..=upper).contains(&position) => '*',
            _ => ' ',
        };
        queue!(
            out,
            Print(format!("{}{} {}", focus, mark, title(state.store(), id))),
            MoveToNextLine(1)
        )?;
    }

    let status = format!(
        "{:?} | {} cards | clipboard {} | {}",
        state.mode(),
        items.len(),
        state.clipboard().len(),
        if state.is_dirty() { "modified" } else { "saved" }
    );
    queue!(out, MoveToNextLine(1), Print(status), MoveToNextLine(1))?;
    out.flush()
}

/// Read lines from stdin in cooked mode until a line holding only `.`.
fn read_text(prompt: &str, current: &str) -> io::Result<Option<String>> {
    disable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
    println!("{}", prompt);
    if !current.is_empty() {
        println!("--- current ---");
        println!("{}", current);
        println!("---------------");
    }
    stdout.flush()?;

    let mut lines = Vec::new();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line == "." {
            break;
        }
        lines.push(line);
    }
    enable_raw_mode()?;

    if lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(lines.join("\n")))
}

fn edit_focused(state: &mut State) -> io::Result<()> {
    let Some(id) = state.focused_id() else {
        state.dispatch(Intent::StopEditing);
        return Ok(());
    };
    let current = match state.store().get(&id) {
        Some(Card::Note(note)) => note.contents.clone(),
        _ => String::new(),
    };
    if let Some(contents) = read_text("Type the note, end with a line holding only '.'", &current)? {
        state.dispatch(Intent::UpdateNote { id, contents });
    }
    state.dispatch(Intent::StopEditing);
    Ok(())
}

fn run_app(state: &mut State) -> io::Result<()> {
    let mut stdout = io::stdout();
    loop {
        if state.mode() == Mode::Editing {
            edit_focused(state)?;
            continue;
        }
        render(&mut stdout, state)?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match process_key(key) {
            InputAction::Intent(intent) => state.dispatch(intent),
            InputAction::StartSearch => {
                if let Some(query) = read_text("Search, end with '.'", "")? {
                    state.dispatch(Intent::Search(query));
                }
            }
            InputAction::Quit => return Ok(()),
            InputAction::None => {}
        }
    }
}

fn run_search(config: &Config, query: &str) -> io::Result<()> {
    let mut state = load_state(config)?;
    state.dispatch(Intent::Search(query.to_string()));
    let results = state
        .store()
        .contents(state.navigator().current_index())
        .map(|items| items.to_vec())
        .unwrap_or_default();
    if state.navigator().frames().len() == 1 || results.is_empty() {
        println!("No matches for '{}'", query);
        return Ok(());
    }
    for (rank, id) in results.iter().enumerate() {
        println!("{:>3}. {}  {}", rank + 1, title(state.store(), id), id);
    }
    Ok(())
}

fn print_graph(config: &Config) -> io::Result<()> {
    let state = load_state(config)?;
    for edge in graph::edges(state.store()) {
        let arrow = if edge.bidirectional { "<->" } else { "->" };
        println!(
            "{} {} {}",
            title(state.store(), &edge.from),
            arrow,
            title(state.store(), &edge.to)
        );
    }
    let violations = graph::check_links(state.store());
    if !violations.is_empty() {
        eprintln!("{} inconsistent links", violations.len());
    }
    Ok(())
}

fn main() -> io::Result<()> {
    // Handle CLI arguments
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "-v" | "--version" => {
                println!("cardstack {}", VERSION);
                return Ok(());
            }
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-c" | "--config" => {
                println!("{}", Config::config_path().display());
                return Ok(());
            }
            "-d" | "--dir" => {
                println!("{}", Config::load().data_path().display());
                return Ok(());
            }
            "--reset" => {
                reset_config();
                return Ok(());
            }
            "--clean-cache" => {
                clean_cache(&Config::load());
                return Ok(());
            }
            "search" => {
                let query = args[2..].join(" ");
                if query.trim().is_empty() {
                    eprintln!("Usage: cardstack search <QUERY>...");
                    return Ok(());
                }
                let config = Config::load();
                init_tracing(&config, &config.data_path())?;
                return run_search(&config, &query);
            }
            "graph" => {
                let config = Config::load();
                init_tracing(&config, &config.data_path())?;
                return print_graph(&config);
            }
            arg => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Run 'cardstack --help' for usage information");
                return Ok(());
            }
        }
    }

    let config = Config::load_or_create();
    init_tracing(&config, &config.data_path())?;
    info!(version = VERSION, "starting");

    let mut state = load_state(&config)?;

    enable_raw_mode()?;
    let result = run_app(&mut state);
    disable_raw_mode()?;
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;

    save_state(&mut state, &config)?;

    if let Err(err) = result {
        eprintln!("Error: {err:?}");
    }

    Ok(())
}
