use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use skill_compose::{
    AdapterStatusPoller, ApiClient, AuthState, ChatEngine, ChatMessage, ChatStore, ChatSurface,
    ClientConfig, ClientError, FileSessionStore, HttpStreamAdapter, MemorySessionStore, Role,
    SessionSlot, SessionStore, SubmitOutcome, Translator,
};

/// Terminal chat with a published Skill Compose agent
#[derive(Debug, Parser)]
#[command(name = "skill-compose-chat", version, about)]
struct Cli {
    /// Published agent id
    agent_id: String,

    /// Platform base URL
    #[arg(long, env = "SKILL_COMPOSE_BASE_URL")]
    base_url: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// File for session ids and login tokens
    #[arg(long, env = "SKILL_COMPOSE_STATE_PATH")]
    state: Option<PathBuf>,

    /// UI locale (en, zh-CN)
    #[arg(long, env = "SKILL_COMPOSE_LOCALE")]
    locale: Option<String>,

    /// Resume this session instead of the stored one
    #[arg(long)]
    session: Option<String>,

    /// Log in as this user (password from SKILL_COMPOSE_PASSWORD)
    #[arg(long)]
    username: Option<String>,

    /// Print channel adapter connectivity changes
    #[arg(long)]
    watch_adapters: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let translator = Arc::new(Translator::builtin(&config.locale));

    let store: Arc<dyn SessionStore> = match &config.state_path {
        Some(path) => Arc::new(FileSessionStore::new(path)),
        None => Arc::new(MemorySessionStore::default()),
    };

    let client = ApiClient::new(&config)?.with_auth(AuthState::with_store(store.clone())?);
    if let Some(username) = &cli.username {
        let password = std::env::var("SKILL_COMPOSE_PASSWORD").unwrap_or_default();
        client.login(username, &password).await?;
    }

    let adapter = HttpStreamAdapter::published(client.clone(), cli.agent_id.as_str());
    let adapter = match adapter.clone().discover_mode().await {
        Ok(adapter) => adapter,
        Err(e) if e.is_not_found() => anyhow::bail!("Agent '{}' is not published", cli.agent_id),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read agent settings, assuming streaming");
            adapter
        }
    };
    let adapter = Arc::new(adapter);

    let mut slot = SessionSlot::open(ChatSurface::PublishedAgent(cli.agent_id.clone()), store)?;
    if let Some(session) = &cli.session {
        slot.switch_to(session)?;
    }

    let messages = Arc::new(ChatStore::new());
    let engine = ChatEngine::new(messages.clone(), adapter.clone(), slot)
        .with_session_source(adapter);

    let restored = engine.mount().await;
    for message in engine.messages() {
        print_history(&message);
    }
    if restored == 0 {
        println!("{}", translator.t("chat.empty"));
    }

    let renderer = tokio::spawn(render(messages, translator.clone()));
    let _poller = cli.watch_adapters.then(|| {
        let poller =
            AdapterStatusPoller::spawn(Arc::new(client.clone()), config.adapter_poll_interval());
        tokio::spawn(watch_adapters(poller.subscribe(), translator.clone()));
        poller
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/stop" => {
                if engine.stop() {
                    println!("\n{}", translator.t("chat.stopped"));
                }
            }
            "/new" => {
                if engine.new_chat()? {
                    println!("{} ({})", translator.t("chat.newChat"), engine.session_id());
                } else {
                    println!("{}", translator.t("chat.busy"));
                }
            }
            "/switch" if arg.is_empty() => println!("usage: /switch <session-id>"),
            "/switch" => {
                if engine.switch_session(arg).await? {
                    println!(
                        "{}",
                        translator.t_with("chat.sessionSwitched", &[("id", arg)])
                    );
                    for message in engine.messages() {
                        print_history(&message);
                    }
                } else {
                    println!("{}", translator.t("chat.busy"));
                }
            }
            "/answer" => {
                let outcome = match engine.pending_prompt() {
                    Some(prompt_id) => engine.handle_respond(&prompt_id, arg).await,
                    None => engine.submit(Some(arg)).await,
                };
                report(outcome, &translator);
            }
            _ => report(engine.submit(Some(line)).await, &translator),
        }
    }

    engine.stop();
    renderer.abort();
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .with_env()?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(state) = &cli.state {
        config.state_path = Some(state.clone());
    }
    if let Some(locale) = &cli.locale {
        config.locale = locale.clone();
    }
    config.validate()?;
    Ok(config)
}

fn report(outcome: skill_compose::Result<SubmitOutcome>, translator: &Translator) {
    match outcome {
        Ok(SubmitOutcome::Started) => {}
        Ok(SubmitOutcome::Steered { .. }) => println!("{}", translator.t("chat.steered")),
        Err(ClientError::Busy(_)) => println!("{}", translator.t("chat.busy")),
        Err(e) => {
            let message = e.to_string();
            println!(
                "{}",
                translator.t_with("chat.error", &[("message", message.as_str())])
            );
        }
    }
}

fn print_history(message: &ChatMessage) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
    };
    println!("[{}] {}", who, message.content);
}

/// Print the newest assistant message as it grows
///
/// Steering lines land after it in the list, so it is looked up by role
/// rather than taken from the tail.
async fn render(store: Arc<ChatStore>, translator: Arc<Translator>) {
    let mut revisions = store.subscribe();
    let mut message_id = String::new();
    let mut printed = 0;
    let mut events = 0;
    let mut error_shown = false;

    while revisions.changed().await.is_ok() {
        let Some(message) = store.last_assistant() else {
            continue;
        };
        // Restored history is printed by the caller
        if message.id.starts_with("restored-") {
            continue;
        }
        if message.id != message_id {
            message_id = message.id.clone();
            printed = 0;
            events = 0;
            error_shown = false;
        }

        let mut out = std::io::stdout().lock();
        if let Some(delta) = message.content.get(printed..) {
            let _ = write!(out, "{}", delta);
            printed = message.content.len();
        }
        for record in message.stream_events.iter().skip(events) {
            let name = record.data["toolName"].as_str().unwrap_or_default();
            let line = match record.kind.as_str() {
                "tool_call" => translator.t_with("tool.call", &[("name", name)]),
                "tool_result" if record.data["success"] == false => {
                    translator.t_with("tool.failed", &[("name", name)])
                }
                "tool_result" => translator.t_with("tool.result", &[("name", name)]),
                "output_file" => translator.t_with(
                    "file.output",
                    &[("filename", record.data["filename"].as_str().unwrap_or_default())],
                ),
                "ask_user" => format!(
                    "{} {} {}",
                    translator.t("chat.askUser"),
                    record.data["question"].as_str().unwrap_or_default(),
                    record.data["options"]
                        .as_array()
                        .map(|o| format!("{:?}", o))
                        .unwrap_or_default()
                ),
                _ => continue,
            };
            let _ = writeln!(out, "\n· {}", line);
        }
        events = message.stream_events.len();

        if let (Some(error), false) = (&message.error, error_shown) {
            let _ = writeln!(
                out,
                "\n{}",
                translator.t_with("chat.error", &[("message", error.as_str())])
            );
            error_shown = true;
        }
        let _ = out.flush();
    }
}

async fn watch_adapters(
    mut status: tokio::sync::watch::Receiver<skill_compose::AdapterStatus>,
    translator: Arc<Translator>,
) {
    while status.changed().await.is_ok() {
        let snapshot = status.borrow_and_update().clone();
        let mut names: Vec<_> = snapshot.keys().collect();
        names.sort();
        for name in names {
            let key = if snapshot[name] {
                "channels.connected"
            } else {
                "channels.disconnected"
            };
            println!("[{}] {}", name, translator.t(key));
        }
    }
}
