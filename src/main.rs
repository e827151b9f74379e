use std::sync::Arc;

use futures::StreamExt;

use intake_flow::config::IntakeConfig;
use intake_flow::console::{self, ConsoleCommand};
use intake_flow::intake::{
    BroadcastNotifier, IntakeRouteState, IntakeWizard, NoticeLevel, QuestionCatalog, StepDeps,
    WizardStatus, intake_routes,
};
use intake_flow::store::{Database, LibSqlBackend, SettingsStore, StoreSessionAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env()?;
    let catalog_path = config.require_catalog()?.clone();
    let catalog = Arc::new(QuestionCatalog::from_path(&catalog_path)?);

    eprintln!("📝 Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Catalog: {} ({} steps)", catalog_path.display(), catalog.len());
    eprintln!("   Workspace: {}", config.workspace_id);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Wizard ───────────────────────────────────────────────────────────
    let sessions = StoreSessionAdapter::new(Arc::clone(&db), Arc::clone(&catalog));
    let settings = SettingsStore::new(Arc::clone(&db));
    let notifier = BroadcastNotifier::new();
    let deps = StepDeps {
        sessions: sessions.clone(),
        drafts: settings.clone(),
        snapshots: settings,
        notifier: notifier.clone(),
    };

    let session_id = match config.session_id {
        Some(id) => Some(id),
        None => sessions
            .latest_open(&config.workspace_id)
            .await?
            .map(|s| s.id),
    };

    let wizard = IntakeWizard::new(Arc::clone(&catalog), &config.workspace_id, deps);
    let status = wizard.start(session_id).await?;
    if let Some(id) = status.session_id {
        eprintln!("   Session: {}", id);
    }

    // ── REST ─────────────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = intake_routes(IntakeRouteState {
            wizard: Arc::clone(&wizard),
        });
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        eprintln!("   Intake API: http://0.0.0.0:{}/api/intake/status", port);
        tokio::spawn(async move {
            tracing::info!(port, "Intake REST server started");
            axum::serve(listener, app).await.ok();
        });
    }

    // Print notices as they arrive
    let mut notices = notifier.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Error => eprintln!("  ✗ {}", notice.message),
                NoticeLevel::Success => eprintln!("  ✓ {}", notice.message),
                NoticeLevel::Info => eprintln!("  · {}", notice.message),
            }
        }
    });

    eprintln!("   Commands: /retry /add /back <field> /refresh /status /quit\n");
    prompt(&status);

    let mut lines = Box::pin(console::stdin_lines());
    while let Some(line) = lines.next().await {
        let result = match console::parse_line(&line) {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Status => Ok(wizard.status().await),
            ConsoleCommand::Refresh => wizard.refresh().await,
            ConsoleCommand::Retry => wizard.retry().await,
            ConsoleCommand::AddEntry => wizard.add_entry().await,
            ConsoleCommand::Revisit(address) => wizard.revisit(address).await,
            ConsoleCommand::Answer(text) => {
                let status = wizard.status().await;
                match status.step.and_then(|s| s.active).map(|a| a.address) {
                    Some(address) => wizard.submit(address, &text).await,
                    None => Ok(wizard.status().await),
                }
            }
            ConsoleCommand::Unknown(cmd) => {
                eprintln!("Unknown command: {cmd}");
                Ok(wizard.status().await)
            }
        };

        match result {
            Ok(status) => {
                prompt(&status);
                if status.completed {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                prompt(&wizard.status().await);
            }
        }
    }

    wizard.close().await;
    Ok(())
}

fn prompt(status: &WizardStatus) {
    println!("\n{}", console::render(status));
    if !status.completed {
        eprint!("> ");
    }
}
