mod browser;
mod commands;

use anyhow::{Context, Result, anyhow};
use commands::{Command, TreeSource};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use scoped_docs_config::{Config, expand_host_path};
use scoped_docs_engine::grant::{ActivityLauncher, GrantRequests, RESULT_OK, TreeRequest};
use scoped_docs_engine::provider::{HostProvider, MemoryProvider};
use scoped_docs_engine::{SharedProvider, VirtualFileHandle, resolve};
use std::io::{self, stdin, stdout};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::{env, process};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("scoped-docs-cli");
    let invocation = match commands::parse_args(args.get(1..).unwrap_or_default()) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{}", commands::usage(program));
            process::exit(1);
        }
    };

    if let Command::Grant(dir) = &invocation.command {
        return grant(dir);
    }

    let root = match open_root(&invocation.source) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!("{}", commands::usage(program));
            process::exit(1);
        }
    };

    match invocation.command {
        Command::Browse => browse(root),
        command => commands::run(command, &root, &mut stdout().lock(), &mut stdin().lock()),
    }
}

fn open_root(source: &TreeSource) -> Result<VirtualFileHandle> {
    match source {
        TreeSource::Memory => demo_tree(),
        TreeSource::Directory(dir) => {
            let path = expand_host_path(dir).unwrap_or_else(|| PathBuf::from(dir));
            let host = HostProvider::new(&path)
                .with_context(|| format!("Tree directory '{}' is invalid", path.display()))?;
            let root = host.root();
            Ok(VirtualFileHandle::bound(Arc::new(host), root))
        }
        TreeSource::Config => {
            let config_path = Config::config_path();
            let config = Config::load()?.ok_or_else(|| {
                anyhow!("No tree given and no config file at {}", config_path.display())
            })?;
            let root_uri = config.root_uri.ok_or_else(|| {
                anyhow!("No granted tree in {}; run `grant <dir>` first", config_path.display())
            })?;
            let path = HostProvider::path_for_uri(&root_uri)
                .ok_or_else(|| anyhow!("Granted tree {root_uri} is not a local directory"))?;
            let host = HostProvider::new(&path).with_context(|| {
                format!(
                    "Granted tree '{}' from config file '{}' is invalid",
                    path.display(),
                    config_path.display()
                )
            })?;
            Ok(resolve(Arc::new(host), &root_uri)?)
        }
    }
}

fn demo_tree() -> Result<VirtualFileHandle> {
    let memory = MemoryProvider::new("Demo");
    memory.add_file("readme.txt", "In-memory tree; changes are lost on exit.\n")?;
    memory.add_file("saves/slot1.dat", "level=3\nlives=2\n")?;
    memory.add_file("saves/slot2.dat", "level=7\nlives=1\n")?;
    memory.add_directory("screenshots")?;
    let root = memory.root();
    Ok(VirtualFileHandle::bound(Arc::new(memory), root))
}

/// Stands in for the system picker: the directory was chosen on the command line
struct CommandLinePicker;

impl ActivityLauncher for CommandLinePicker {
    fn launch_tree_picker(&self, request: &TreeRequest) -> io::Result<()> {
        log::debug!("Picking tree for request {}", request.request_code);
        Ok(())
    }

    fn take_persistable_permission(&self, uri: &str, _flags: i32) -> io::Result<()> {
        log::debug!("Host directories need no persisted permission: {uri}");
        Ok(())
    }
}

fn grant(dir: &str) -> Result<()> {
    let path = expand_host_path(dir).unwrap_or_else(|| PathBuf::from(dir));
    let host = HostProvider::new(&path)
        .with_context(|| format!("Cannot grant '{}'", path.display()))?;
    let picked = host.root();
    let provider: SharedProvider = Arc::new(host);

    let mut config = Config::load()?.unwrap_or_default();
    let mut requests = GrantRequests::new(CommandLinePicker, provider)
        .with_request_code_base(config.request_code_base);
    let (sender, granted) = mpsc::channel();
    let code = requests.request_document_tree(config.persist_grant, move |root| {
        let _ = sender.send(root);
    })?;
    requests.on_activity_result(code, RESULT_OK, Some(picked.as_str()));

    let root = granted
        .recv()?
        .ok_or_else(|| anyhow!("'{}' could not be opened as a tree", path.display()))?;
    config.root_uri = Some(root.path().to_string());
    config.save()?;
    println!(
        "Granted {} (saved to {})",
        path.display(),
        Config::config_path().display()
    );
    Ok(())
}

fn browse(root: VirtualFileHandle) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = browser::App::new(root);
    let res = browser::run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}
