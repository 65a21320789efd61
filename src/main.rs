//! ragdesk CLI entry point

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use ragdesk::{
    admin::{AdminPanel, NewSourceForm},
    api::{auth::RegisterRequest, ApiClient},
    chat::{ChatService, ChatSession, ChatStore},
    commands::{
        cmd_admin_create, cmd_admin_delete, cmd_admin_list, cmd_admin_set_active, cmd_admin_show,
        cmd_chat_ask, cmd_chat_delete, cmd_chat_history, cmd_chat_list, cmd_chat_new,
        cmd_chat_rename, cmd_chat_repl, cmd_disclaimer, cmd_files, cmd_init, cmd_login,
        cmd_logout, cmd_open_file, cmd_register, cmd_set_tracked, cmd_source_edit,
        cmd_source_show, cmd_sources_list, cmd_sync, cmd_tracked, cmd_unrag, cmd_whoami,
        print_admin_source, print_admin_sources, print_answer, print_consent_url,
        print_conversations, print_created, print_disclaimer, print_disclaimer_text,
        print_document_sources, print_entered, print_history, print_init, print_listing,
        print_login, print_register, print_source_details, print_sync, print_track_change,
        print_tracked, print_whoami, prompt, require_login, InitOptions, Location,
        SourceEditArgs,
    },
    config::Config,
    error::{Error, Result},
    events::EventBus,
    explorer::Explorer,
    models::Provider,
    navigation::Navigation,
    progress::{with_spinner, LogWriterFactory},
    token::TokenStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragdesk")]
#[command(version, about = "Chat with your documents through a RAG backend", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides api_url from the config file)
    #[arg(long, global = true, env = "RAGDESK_API_URL")]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: Option<String>,

        #[arg(long, env = "RAGDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Request a new account
    Register {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        division: Option<String>,
        #[arg(long, env = "RAGDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged in user
    Whoami,

    /// Show or answer the terms of use
    Disclaimer {
        /// Accept the terms
        #[arg(long)]
        accept: bool,

        /// Withdraw acceptance
        #[arg(long, conflicts_with = "accept")]
        decline: bool,
    },

    /// Conversations with the assistant
    Chat {
        #[command(subcommand)]
        action: ChatCommand,
    },

    /// Browse document sources and manage tracked files
    Sources {
        #[command(subcommand)]
        action: SourcesCommand,
    },

    /// Manage every user's document sources (administrators)
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ChatCommand {
    /// List conversations, newest first
    List,

    /// Start a new conversation
    New,

    /// Show the messages of a conversation
    History { conversation_id: i64 },

    /// Ask a single question
    Ask {
        conversation_id: i64,

        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Rename a conversation
    Rename { conversation_id: i64, title: String },

    /// Delete a conversation
    Delete { conversation_id: i64 },

    /// Interactive chat
    Repl,
}

/// Folder inside a source
#[derive(Args, Clone, Default)]
struct LocationArgs {
    /// Folder id; tracking inside a folder needs --path
    #[arg(long, conflicts_with = "path")]
    folder: Option<String>,

    /// Folder names from the root, e.g. Reports/2024
    #[arg(long)]
    path: Option<String>,
}

impl From<LocationArgs> for Location {
    fn from(args: LocationArgs) -> Self {
        Location {
            folder_id: args.folder,
            path: args.path,
        }
    }
}

#[derive(Subcommand)]
enum SourcesCommand {
    /// List your document sources
    List,

    /// List a folder of a source
    Files {
        source_id: i64,
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Add a file or folder to the RAG index
    Track {
        source_id: i64,
        file_id: String,
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Remove a file or folder from the RAG index
    Untrack {
        source_id: i64,
        file_id: String,
        #[command(flatten)]
        location: LocationArgs,
    },

    /// List tracked files and their indexing state
    Tracked { source_id: i64 },

    /// Drop the indexed content of a tracked file
    Unrag { source_id: i64, file_id: String },

    /// Index every tracked file now (administrators)
    Sync {
        /// Show the refreshed tracking state of this source afterwards
        #[arg(long)]
        watch: Option<i64>,
    },

    /// Start a conversation about a file
    Open {
        source_id: i64,
        file_id: String,
        #[command(flatten)]
        location: LocationArgs,

        /// Print the summary and exit instead of staying in the chat
        #[arg(long)]
        no_repl: bool,
    },

    /// Show a source with its credentials
    Show {
        source_id: i64,

        /// Print tokens unmasked
        #[arg(long)]
        reveal: bool,
    },

    /// Change a source's name, tokens or root folder
    Edit {
        source_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Root folder id; pass an empty value to use the provider root
        #[arg(long)]
        folder_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// List every document source
    List,

    /// Show a source with its credentials
    Show {
        source_id: i64,
        #[arg(long)]
        reveal: bool,
    },

    /// Connect a new document source
    Create {
        name: String,

        /// google_drive, dropbox or onedrive
        #[arg(short, long, default_value = "google_drive")]
        provider: String,

        /// Paste tokens instead of authorizing in the browser
        #[arg(long)]
        manual: bool,

        #[arg(long)]
        client_id: Option<String>,
        #[arg(long, env = "RAGDESK_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        root_folder: Option<String>,
    },

    /// Enable a source
    Activate { source_id: i64 },

    /// Disable a source
    Deactivate { source_id: i64 },

    /// Delete a source and its tracked files
    Delete {
        source_id: i64,

        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

/// Everything the commands talk through
struct App {
    config: Config,
    api: ApiClient,
    events: EventBus,
    cancel: CancellationToken,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let tokens = Arc::new(TokenStore::file(&config.paths.session_file));
        let api = ApiClient::new(&config.resolved_api_url()?, tokens, config.request_timeout())?;
        debug!("Using backend {}", api.base_url());
        Ok(Self {
            config,
            api,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
        })
    }

    fn session(&self) -> ChatSession {
        let service = ChatService::new(self.api.clone(), ChatStore::default(), self.cancel.clone());
        ChatSession::new(service, self.config.chat.clone())
    }

    fn explorer(&self) -> Explorer {
        Explorer::new(self.api.clone(), self.events.clone())
    }

    fn admin(&self) -> AdminPanel {
        AdminPanel::new(self.api.clone(), self.config.oauth.clone())
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(Error::Cancelled) => std::process::exit(130),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "ragdesk", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api_url = Some(url);
        config.validate()?;
    }
    let app = App::new(config)?;

    let cancel = app.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted");
            cancel.cancel();
        }
    });

    tokio::select! {
        _ = app.cancel.cancelled() => Err(Error::Cancelled),
        result = dispatch(&app, cli.command, cli.json) => result,
    }
}

async fn dispatch(app: &App, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Login { email, password } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Email")?,
            };
            let password = match password {
                Some(password) => password,
                None => prompt("Password")?,
            };
            let outcome = with_spinner("Logging in", cmd_login(&app.api, &email, &password)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_login(&outcome);
            }
        }

        Commands::Register {
            email,
            name,
            last_name,
            division,
            password,
        } => {
            let ask = |value: Option<String>, label: &str| match value {
                Some(value) => Ok(value),
                None => prompt(label),
            };
            let request = RegisterRequest {
                email: ask(email, "Email")?,
                name: ask(name, "Name")?,
                last_name: ask(last_name, "Last name")?,
                division: ask(division, "Division")?,
                password: ask(password, "Password")?,
            };
            let message = cmd_register(&app.api, request).await?;
            if json {
                println!("{}", serde_json::json!({ "message": message }));
            } else {
                print_register(message.as_deref());
            }
        }

        Commands::Logout => {
            let name = cmd_logout(&app.api);
            if json {
                println!("{}", serde_json::json!({ "loggedOut": name }));
            } else {
                match name {
                    Some(name) => println!("✓ Logged out {}", name),
                    None => println!("No session stored"),
                }
            }
        }

        Commands::Whoami => {
            let profile = cmd_whoami(&app.api).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                print_whoami(&profile);
            }
        }

        Commands::Disclaimer { accept, decline } => {
            if !accept && !decline {
                print_disclaimer_text();
                println!("\nRun 'ragdesk disclaimer --accept' to accept.");
                return Ok(());
            }
            let checked = cmd_disclaimer(&app.api, accept).await?;
            if json {
                println!("{}", serde_json::json!({ "disclaimerChecked": checked }));
            } else {
                print_disclaimer(checked);
            }
        }

        Commands::Chat { action } => {
            require_login(&app.api)?;
            handle_chat(app, action, json).await?;
        }

        Commands::Sources { action } => {
            require_login(&app.api)?;
            handle_sources(app, action, json).await?;
        }

        Commands::Admin { action } => {
            handle_admin(app, action, json).await?;
        }
    }

    Ok(())
}

async fn handle_chat(app: &App, action: ChatCommand, json: bool) -> Result<()> {
    let session = app.session();

    match action {
        ChatCommand::List => {
            let conversations = cmd_chat_list(&session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&conversations)?);
            } else {
                print_conversations(&conversations, None);
            }
        }
        ChatCommand::New => {
            let conversation = cmd_chat_new(&session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&conversation)?);
            } else {
                println!("✓ Started \"{}\" (#{})", conversation.title, conversation.id);
            }
        }
        ChatCommand::History { conversation_id } => {
            let messages = cmd_chat_history(&session, conversation_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                print_history(&messages);
            }
        }
        ChatCommand::Ask {
            conversation_id,
            question,
        } => {
            let question = question.join(" ");
            let answer =
                with_spinner("Thinking", cmd_chat_ask(&session, conversation_id, &question))
                    .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        ChatCommand::Rename {
            conversation_id,
            title,
        } => {
            cmd_chat_rename(&session, conversation_id, &title).await?;
            if !json {
                println!("✓ Renamed conversation #{}", conversation_id);
            }
        }
        ChatCommand::Delete { conversation_id } => {
            let remaining = cmd_chat_delete(&session, conversation_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&remaining)?);
            } else {
                println!("✓ Deleted conversation #{}", conversation_id);
            }
        }
        ChatCommand::Repl => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            cmd_chat_repl(&session, &mut Navigation::new(), stdin).await?;
        }
    }

    Ok(())
}

async fn handle_sources(app: &App, action: SourcesCommand, json: bool) -> Result<()> {
    let explorer = app.explorer();

    match action {
        SourcesCommand::List => {
            let sources = cmd_sources_list(&app.api).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_document_sources(&sources);
            }
        }
        SourcesCommand::Files {
            source_id,
            location,
        } => {
            let state = with_spinner(
                "Listing files",
                cmd_files(&explorer, source_id, &location.into()),
            )
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_listing(&state);
            }
        }
        SourcesCommand::Track {
            source_id,
            file_id,
            location,
        } => {
            let change =
                cmd_set_tracked(&explorer, source_id, &location.into(), &file_id, true).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&change)?);
            } else {
                print_track_change(&change);
            }
        }
        SourcesCommand::Untrack {
            source_id,
            file_id,
            location,
        } => {
            let change =
                cmd_set_tracked(&explorer, source_id, &location.into(), &file_id, false).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&change)?);
            } else {
                print_track_change(&change);
            }
        }
        SourcesCommand::Tracked { source_id } => {
            let files = cmd_tracked(&explorer, source_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_tracked(&files);
            }
        }
        SourcesCommand::Unrag { source_id, file_id } => {
            cmd_unrag(&explorer, source_id, &file_id).await?;
            if !json {
                println!("✓ Indexed content of {} removed", file_id);
            }
        }
        SourcesCommand::Sync { watch } => {
            let outcome = with_spinner(
                "Syncing tracked files",
                cmd_sync(&app.api, &explorer, &app.events, watch),
            )
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_sync(&outcome);
            }
        }
        SourcesCommand::Open {
            source_id,
            file_id,
            location,
            no_repl,
        } => {
            let mut navigation =
                cmd_open_file(&explorer, source_id, &location.into(), &file_id).await?;
            let session = app.session();
            if no_repl || json {
                let entered =
                    with_spinner("Reading the file", session.enter(&mut navigation)).await?;
                if json {
                    let state = session.service().store().snapshot();
                    println!("{}", serde_json::to_string_pretty(&state)?);
                } else {
                    print_entered(&session, &entered);
                }
            } else {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                cmd_chat_repl(&session, &mut navigation, stdin).await?;
            }
        }
        SourcesCommand::Show { source_id, reveal } => {
            let source = cmd_source_show(&explorer, source_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&source)?);
            } else {
                print_source_details(&source, reveal);
            }
        }
        SourcesCommand::Edit {
            source_id,
            name,
            access_token,
            refresh_token,
            folder_id,
        } => {
            let args = SourceEditArgs {
                name,
                access_token,
                refresh_token,
                folder_id,
            };
            let source = cmd_source_edit(&explorer, source_id, args).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&source)?);
            } else {
                println!("✓ Source \"{}\" (#{}) updated", source.name, source.id);
            }
        }
    }

    Ok(())
}

async fn handle_admin(app: &App, action: AdminCommand, json: bool) -> Result<()> {
    let panel = app.admin();

    match action {
        AdminCommand::List => {
            let sources = cmd_admin_list(&app.api, &panel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_admin_sources(&sources);
            }
        }
        AdminCommand::Show { source_id, reveal } => {
            let source = cmd_admin_show(&app.api, &panel, source_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&source)?);
            } else {
                print_admin_source(&source, reveal);
            }
        }
        AdminCommand::Create {
            name,
            provider,
            manual,
            client_id,
            client_secret,
            access_token,
            refresh_token,
            root_folder,
        } => {
            let form = NewSourceForm {
                name,
                provider: provider.parse::<Provider>()?,
                use_oauth: !manual,
                client_id: client_id.unwrap_or_default(),
                client_secret: client_secret.unwrap_or_default(),
                access_token: access_token.unwrap_or_default(),
                refresh_token: refresh_token.unwrap_or_default(),
                root_folder_id: root_folder.unwrap_or_default(),
            };
            let created = cmd_admin_create(&app.api, &panel, form, print_consent_url).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&created)?);
            } else {
                print_created(&created);
            }
        }
        AdminCommand::Activate { source_id } => {
            cmd_admin_set_active(&app.api, &panel, source_id, true).await?;
            if !json {
                println!("✓ Source #{} activated", source_id);
            }
        }
        AdminCommand::Deactivate { source_id } => {
            cmd_admin_set_active(&app.api, &panel, source_id, false).await?;
            if !json {
                println!("✓ Source #{} deactivated", source_id);
            }
        }
        AdminCommand::Delete { source_id, yes } => {
            if !yes {
                eprintln!("⚠️  This deletes the source and all of its tracked files!");
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }
            cmd_admin_delete(&app.api, &panel, source_id).await?;
            if !json {
                println!("✓ Source #{} deleted", source_id);
            }
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // A .toml path is the file itself; anything else is a directory to put it in
    let (base_dir, config_path) = if let Some(path) = cli.config {
        if path.extension().is_some_and(|e| e == "toml") {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        } else {
            (path.clone(), path.join("config.toml"))
        }
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    let config = cmd_init(InitOptions {
        base_dir,
        config_path,
        api_url: cli.api_url,
        force,
    })
    .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print_init(&config);
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_from(None),
    }
}
